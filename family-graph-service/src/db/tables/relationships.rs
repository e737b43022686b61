//! Relationship edge rows (relationships)

use family_graph_types::{Relationship, RelationshipType};
use rusqlite::{params, Connection, OptionalExtension, Result as SqliteResult};

use crate::db::{enum_column, now_rfc3339};

const RELATIONSHIP_COLUMNS: &str =
    "id, tree_id, person1_id, person2_id, relationship_type, is_biological, created_by, created_at";

#[derive(Debug, Clone)]
pub struct NewRelationship {
    pub tree_id: String,
    pub person1_id: i64,
    pub person2_id: i64,
    pub relationship_type: RelationshipType,
    pub is_biological: bool,
    pub created_by: String,
}

pub fn insert_relationship(conn: &Connection, new: &NewRelationship) -> SqliteResult<Relationship> {
    let now = now_rfc3339();
    conn.execute(
        "INSERT INTO relationships (tree_id, person1_id, person2_id, relationship_type,
                                    is_biological, created_by, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            new.tree_id,
            new.person1_id,
            new.person2_id,
            new.relationship_type.as_str(),
            new.is_biological,
            new.created_by,
            now,
        ],
    )?;
    Ok(Relationship {
        id: conn.last_insert_rowid(),
        tree_id: new.tree_id.clone(),
        person1_id: new.person1_id,
        person2_id: new.person2_id,
        relationship_type: new.relationship_type,
        is_biological: new.is_biological,
        created_by: new.created_by.clone(),
        created_at: now,
    })
}

pub fn get_relationship(conn: &Connection, id: i64) -> SqliteResult<Option<Relationship>> {
    conn.query_row(
        &format!("SELECT {} FROM relationships WHERE id = ?1", RELATIONSHIP_COLUMNS),
        [id],
        row_to_relationship,
    )
    .optional()
}

/// Exact (person1, person2, type) lookup
pub fn find_edge(
    conn: &Connection,
    person1_id: i64,
    person2_id: i64,
    relationship_type: RelationshipType,
) -> SqliteResult<Option<Relationship>> {
    conn.query_row(
        &format!(
            "SELECT {} FROM relationships
             WHERE person1_id = ?1 AND person2_id = ?2 AND relationship_type = ?3",
            RELATIONSHIP_COLUMNS
        ),
        params![person1_id, person2_id, relationship_type.as_str()],
        row_to_relationship,
    )
    .optional()
}

/// Every edge touching `person_id` in either position
pub fn find_by_person(conn: &Connection, person_id: i64) -> SqliteResult<Vec<Relationship>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM relationships
         WHERE person1_id = ?1 OR person2_id = ?1
         ORDER BY id",
        RELATIONSHIP_COLUMNS
    ))?;
    let edges = stmt
        .query_map([person_id], row_to_relationship)?
        .collect::<SqliteResult<Vec<_>>>()?;
    Ok(edges)
}

/// Edges joining two persons, in either orientation
pub fn find_between(conn: &Connection, a: i64, b: i64) -> SqliteResult<Vec<Relationship>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM relationships
         WHERE (person1_id = ?1 AND person2_id = ?2) OR (person1_id = ?2 AND person2_id = ?1)
         ORDER BY id",
        RELATIONSHIP_COLUMNS
    ))?;
    let edges = stmt
        .query_map(params![a, b], row_to_relationship)?
        .collect::<SqliteResult<Vec<_>>>()?;
    Ok(edges)
}

/// Ids of the logical parents of `person_id`.
///
/// "X is a parent of Y" is stored either as `(X, Y, parent)` or `(Y, X, child)`.
pub fn parent_ids(conn: &Connection, person_id: i64) -> SqliteResult<Vec<i64>> {
    directed_neighbours(conn, person_id, RelationshipType::Parent)
}

/// Ids of the logical children of `person_id`
pub fn child_ids(conn: &Connection, person_id: i64) -> SqliteResult<Vec<i64>> {
    directed_neighbours(conn, person_id, RelationshipType::Child)
}

/// Ids of every `x` such that "x is the `kind` of `person_id`", whichever way it was stored.
fn directed_neighbours(
    conn: &Connection,
    person_id: i64,
    kind: RelationshipType,
) -> SqliteResult<Vec<i64>> {
    let mut stmt = conn.prepare(
        "SELECT person1_id FROM relationships WHERE person2_id = ?1 AND relationship_type = ?2
         UNION
         SELECT person2_id FROM relationships WHERE person1_id = ?1 AND relationship_type = ?3
         ORDER BY 1",
    )?;
    let ids = stmt
        .query_map(
            params![person_id, kind.as_str(), kind.inverse().as_str()],
            |r| r.get(0),
        )?
        .collect::<SqliteResult<Vec<i64>>>()?;
    Ok(ids)
}

/// Ids of spouses of `person_id`, stored in either position
pub fn spouse_ids(conn: &Connection, person_id: i64) -> SqliteResult<Vec<i64>> {
    let mut stmt = conn.prepare(
        "SELECT person1_id FROM relationships WHERE person2_id = ?1 AND relationship_type = 'spouse'
         UNION
         SELECT person2_id FROM relationships WHERE person1_id = ?1 AND relationship_type = 'spouse'
         ORDER BY 1",
    )?;
    let ids = stmt
        .query_map([person_id], |r| r.get(0))?
        .collect::<SqliteResult<Vec<i64>>>()?;
    Ok(ids)
}

pub fn delete_relationship(conn: &Connection, id: i64) -> SqliteResult<bool> {
    let rows = conn.execute("DELETE FROM relationships WHERE id = ?1", [id])?;
    Ok(rows > 0)
}

pub fn delete_edges_of_person(conn: &Connection, person_id: i64) -> SqliteResult<usize> {
    conn.execute(
        "DELETE FROM relationships WHERE person1_id = ?1 OR person2_id = ?1",
        [person_id],
    )
}

pub fn count_relationships(conn: &Connection) -> SqliteResult<i64> {
    conn.query_row("SELECT COUNT(*) FROM relationships", [], |r| r.get(0))
}

fn row_to_relationship(row: &rusqlite::Row) -> rusqlite::Result<Relationship> {
    Ok(Relationship {
        id: row.get(0)?,
        tree_id: row.get(1)?,
        person1_id: row.get(2)?,
        person2_id: row.get(3)?,
        relationship_type: enum_column(row, 4, RelationshipType::from_str)?,
        is_biological: row.get(5)?,
        created_by: row.get(6)?,
        created_at: row.get(7)?,
    })
}
