//! Person node rows (persons)

use family_graph_types::{Gender, LinkStatus, Person, PersonSource, UpdatePersonRequest};
use rusqlite::{params, Connection, OptionalExtension, Result as SqliteResult};

use crate::db::{enum_column, now_rfc3339};

const PERSON_COLUMNS: &str = "id, tree_id, first_name, last_name, maiden_name, gender,
    birth_date, death_date, is_alive, linked_user_id, link_status, source,
    created_by, created_at, updated_at";

/// Fields for a person row about to be inserted
#[derive(Debug, Clone)]
pub struct NewPerson {
    pub tree_id: String,
    pub first_name: String,
    pub last_name: String,
    pub maiden_name: Option<String>,
    pub gender: Gender,
    pub birth_date: Option<String>,
    pub death_date: Option<String>,
    pub is_alive: bool,
    pub linked_user_id: Option<String>,
    pub link_status: LinkStatus,
    pub source: PersonSource,
    pub created_by: String,
}

pub fn insert_person(conn: &Connection, new: &NewPerson) -> SqliteResult<Person> {
    let now = now_rfc3339();
    conn.execute(
        "INSERT INTO persons (tree_id, first_name, last_name, maiden_name, gender,
                              birth_date, death_date, is_alive, linked_user_id, link_status,
                              source, created_by, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?13)",
        params![
            new.tree_id,
            new.first_name,
            new.last_name,
            new.maiden_name,
            new.gender.as_str(),
            new.birth_date,
            new.death_date,
            new.is_alive,
            new.linked_user_id,
            new.link_status.as_str(),
            new.source.as_str(),
            new.created_by,
            now,
        ],
    )?;
    let id = conn.last_insert_rowid();
    Ok(Person {
        id,
        tree_id: new.tree_id.clone(),
        first_name: new.first_name.clone(),
        last_name: new.last_name.clone(),
        maiden_name: new.maiden_name.clone(),
        gender: new.gender,
        birth_date: new.birth_date.clone(),
        death_date: new.death_date.clone(),
        is_alive: new.is_alive,
        linked_user_id: new.linked_user_id.clone(),
        link_status: new.link_status,
        source: new.source,
        created_by: new.created_by.clone(),
        created_at: now.clone(),
        updated_at: now,
    })
}

pub fn get_person(conn: &Connection, id: i64) -> SqliteResult<Option<Person>> {
    conn.query_row(
        &format!("SELECT {} FROM persons WHERE id = ?1", PERSON_COLUMNS),
        [id],
        row_to_person,
    )
    .optional()
}

/// The node in `tree_id` claiming to be `user_id`, if any
pub fn find_by_linked_user(
    conn: &Connection,
    tree_id: &str,
    user_id: &str,
) -> SqliteResult<Option<Person>> {
    conn.query_row(
        &format!(
            "SELECT {} FROM persons WHERE tree_id = ?1 AND linked_user_id = ?2",
            PERSON_COLUMNS
        ),
        params![tree_id, user_id],
        row_to_person,
    )
    .optional()
}

pub fn list_persons(conn: &Connection, tree_id: &str) -> SqliteResult<Vec<Person>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM persons WHERE tree_id = ?1 ORDER BY last_name, first_name, id",
        PERSON_COLUMNS
    ))?;
    let persons = stmt
        .query_map([tree_id], row_to_person)?
        .collect::<SqliteResult<Vec<_>>>()?;
    Ok(persons)
}

/// Persons in `tree_id` whose first, last or maiden name contains `needle`
/// (case-insensitive). Ranking happens in the graph layer.
pub fn search_in_tree(conn: &Connection, tree_id: &str, needle: &str) -> SqliteResult<Vec<Person>> {
    let pattern = format!("%{}%", escape_like(&needle.to_lowercase()));
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM persons
         WHERE tree_id = ?1
           AND (LOWER(first_name) LIKE ?2 ESCAPE '\\'
             OR LOWER(last_name) LIKE ?2 ESCAPE '\\'
             OR LOWER(COALESCE(maiden_name, '')) LIKE ?2 ESCAPE '\\'
             OR LOWER(first_name || ' ' || last_name) LIKE ?2 ESCAPE '\\')",
        PERSON_COLUMNS
    ))?;
    let persons = stmt
        .query_map(params![tree_id, pattern], row_to_person)?
        .collect::<SqliteResult<Vec<_>>>()?;
    Ok(persons)
}

fn escape_like(s: &str) -> String {
    s.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_")
}

pub fn update_person(conn: &Connection, id: i64, patch: &UpdatePersonRequest) -> SqliteResult<bool> {
    let now = now_rfc3339();
    let rows = conn.execute(
        "UPDATE persons
         SET first_name = COALESCE(?1, first_name),
             last_name = COALESCE(?2, last_name),
             maiden_name = COALESCE(?3, maiden_name),
             gender = COALESCE(?4, gender),
             birth_date = COALESCE(?5, birth_date),
             death_date = COALESCE(?6, death_date),
             is_alive = COALESCE(?7, is_alive),
             updated_at = ?8
         WHERE id = ?9",
        params![
            patch.first_name,
            patch.last_name,
            patch.maiden_name,
            patch.gender.map(|g| g.as_str()),
            patch.birth_date,
            patch.death_date,
            patch.is_alive,
            now,
            id,
        ],
    )?;
    Ok(rows > 0)
}

pub fn set_link_state(
    conn: &Connection,
    id: i64,
    linked_user_id: Option<&str>,
    status: LinkStatus,
) -> SqliteResult<()> {
    conn.execute(
        "UPDATE persons SET linked_user_id = ?1, link_status = ?2, updated_at = ?3 WHERE id = ?4",
        params![linked_user_id, status.as_str(), now_rfc3339(), id],
    )?;
    Ok(())
}

/// Confirm nodes in `tree_id` whose link was approved but never marked confirmed.
pub fn confirm_approved_links(conn: &Connection, tree_id: &str) -> SqliteResult<usize> {
    conn.execute(
        "UPDATE persons
         SET link_status = 'confirmed', updated_at = ?2
         WHERE tree_id = ?1
           AND link_status = 'pending'
           AND EXISTS (SELECT 1 FROM pending_links pl
                       WHERE pl.person_id = persons.id AND pl.status = 'approved')",
        params![tree_id, now_rfc3339()],
    )
}

/// Node written by an approval mirror for `linked_user_id` that was never confirmed.
/// Invites a user added by hand always carry their own link row, mirrors never do.
pub fn find_unconfirmed_mirror(
    conn: &Connection,
    tree_id: &str,
    linked_user_id: &str,
) -> SqliteResult<Option<i64>> {
    conn.query_row(
        "SELECT id FROM persons
         WHERE tree_id = ?1 AND linked_user_id = ?2
           AND link_status = 'pending' AND source = 'platform_user'
           AND NOT EXISTS (SELECT 1 FROM pending_links pl WHERE pl.person_id = persons.id)",
        params![tree_id, linked_user_id],
        |r| r.get(0),
    )
    .optional()
}

pub fn delete_person(conn: &Connection, id: i64) -> SqliteResult<bool> {
    let rows = conn.execute("DELETE FROM persons WHERE id = ?1", [id])?;
    Ok(rows > 0)
}

pub fn count_persons(conn: &Connection) -> SqliteResult<i64> {
    conn.query_row("SELECT COUNT(*) FROM persons", [], |r| r.get(0))
}

fn row_to_person(row: &rusqlite::Row) -> rusqlite::Result<Person> {
    Ok(Person {
        id: row.get(0)?,
        tree_id: row.get(1)?,
        first_name: row.get(2)?,
        last_name: row.get(3)?,
        maiden_name: row.get(4)?,
        gender: enum_column(row, 5, Gender::from_str)?,
        birth_date: row.get(6)?,
        death_date: row.get(7)?,
        is_alive: row.get(8)?,
        linked_user_id: row.get(9)?,
        link_status: enum_column(row, 10, LinkStatus::from_str)?,
        source: enum_column(row, 11, PersonSource::from_str)?,
        created_by: row.get(12)?,
        created_at: row.get(13)?,
        updated_at: row.get(14)?,
    })
}
