//! Cross-account link requests (pending_links)

use family_graph_types::{PendingLink, PendingLinkStatus};
use rusqlite::{params, Connection, OptionalExtension, Result as SqliteResult};

use crate::db::{enum_column, now_rfc3339};

const LINK_COLUMNS: &str = "id, tree_id, person_id, target_user_id, target_email, token, status,
    created_by, created_at, expires_at, resolved_at";

#[derive(Debug, Clone)]
pub struct NewPendingLink {
    pub tree_id: String,
    pub person_id: i64,
    pub target_user_id: Option<String>,
    pub target_email: Option<String>,
    pub created_by: String,
    pub expires_at: String,
}

pub fn insert_link(conn: &Connection, new: &NewPendingLink) -> SqliteResult<PendingLink> {
    let now = now_rfc3339();
    let token = uuid::Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO pending_links (tree_id, person_id, target_user_id, target_email, token,
                                    status, created_by, created_at, expires_at)
         VALUES (?1, ?2, ?3, ?4, ?5, 'pending', ?6, ?7, ?8)",
        params![
            new.tree_id,
            new.person_id,
            new.target_user_id,
            new.target_email,
            token,
            new.created_by,
            now,
            new.expires_at,
        ],
    )?;
    Ok(PendingLink {
        id: conn.last_insert_rowid(),
        tree_id: new.tree_id.clone(),
        person_id: new.person_id,
        target_user_id: new.target_user_id.clone(),
        target_email: new.target_email.clone(),
        token,
        status: PendingLinkStatus::Pending,
        created_by: new.created_by.clone(),
        created_at: now,
        expires_at: new.expires_at.clone(),
        resolved_at: None,
    })
}

/// The most recent link opened for `person_id`, whatever its state
pub fn latest_for_person(conn: &Connection, person_id: i64) -> SqliteResult<Option<PendingLink>> {
    conn.query_row(
        &format!(
            "SELECT {} FROM pending_links WHERE person_id = ?1 ORDER BY id DESC LIMIT 1",
            LINK_COLUMNS
        ),
        [person_id],
        row_to_link,
    )
    .optional()
}

pub fn get_by_token(conn: &Connection, token: &str) -> SqliteResult<Option<PendingLink>> {
    conn.query_row(
        &format!("SELECT {} FROM pending_links WHERE token = ?1", LINK_COLUMNS),
        [token],
        row_to_link,
    )
    .optional()
}

/// Open links addressed to a user id or (case-insensitively) an email
pub fn list_open_for_target(
    conn: &Connection,
    user_id: &str,
    email: Option<&str>,
) -> SqliteResult<Vec<PendingLink>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM pending_links
         WHERE status = 'pending'
           AND (target_user_id = ?1 OR (?2 IS NOT NULL AND LOWER(target_email) = LOWER(?2)))
         ORDER BY created_at, id",
        LINK_COLUMNS
    ))?;
    let links = stmt
        .query_map(params![user_id, email], row_to_link)?
        .collect::<SqliteResult<Vec<_>>>()?;
    Ok(links)
}

/// Move a link out of `pending`. Returns false if it was no longer pending.
pub fn resolve(conn: &Connection, id: i64, status: PendingLinkStatus) -> SqliteResult<bool> {
    let rows = conn.execute(
        "UPDATE pending_links SET status = ?1, resolved_at = ?2
         WHERE id = ?3 AND status = 'pending'",
        params![status.as_str(), now_rfc3339(), id],
    )?;
    Ok(rows > 0)
}

/// Record which account answered an email-addressed link
pub fn set_target_user(conn: &Connection, id: i64, user_id: &str) -> SqliteResult<()> {
    conn.execute(
        "UPDATE pending_links SET target_user_id = ?1 WHERE id = ?2",
        params![user_id, id],
    )?;
    Ok(())
}

pub fn count_open(conn: &Connection) -> SqliteResult<i64> {
    conn.query_row(
        "SELECT COUNT(*) FROM pending_links WHERE status = 'pending'",
        [],
        |r| r.get(0),
    )
}

fn row_to_link(row: &rusqlite::Row) -> rusqlite::Result<PendingLink> {
    Ok(PendingLink {
        id: row.get(0)?,
        tree_id: row.get(1)?,
        person_id: row.get(2)?,
        target_user_id: row.get(3)?,
        target_email: row.get(4)?,
        token: row.get(5)?,
        status: enum_column(row, 6, PendingLinkStatus::from_str)?,
        created_by: row.get(7)?,
        created_at: row.get(8)?,
        expires_at: row.get(9)?,
        resolved_at: row.get(10)?,
    })
}
