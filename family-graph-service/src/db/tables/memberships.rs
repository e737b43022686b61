//! Tree access rows (tree_memberships)

use family_graph_types::{TreeMembership, TreeRole};
use rusqlite::{params, Connection, OptionalExtension, Result as SqliteResult};

use crate::db::{enum_column, now_rfc3339};

pub fn get_role(conn: &Connection, tree_id: &str, user_id: &str) -> SqliteResult<Option<TreeRole>> {
    conn.query_row(
        "SELECT role FROM tree_memberships WHERE tree_id = ?1 AND user_id = ?2",
        params![tree_id, user_id],
        |row| enum_column(row, 0, TreeRole::from_str),
    )
    .optional()
}

/// Insert or replace the membership row
pub fn upsert_membership(
    conn: &Connection,
    tree_id: &str,
    user_id: &str,
    role: TreeRole,
) -> SqliteResult<()> {
    conn.execute(
        "INSERT INTO tree_memberships (tree_id, user_id, role, joined_at)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(tree_id, user_id) DO UPDATE SET role = excluded.role",
        params![tree_id, user_id, role.as_str(), now_rfc3339()],
    )?;
    Ok(())
}

/// Grant `role` unless the user already holds an equal or higher one.
pub fn grant_at_least(
    conn: &Connection,
    tree_id: &str,
    user_id: &str,
    role: TreeRole,
) -> SqliteResult<()> {
    match get_role(conn, tree_id, user_id)? {
        Some(existing) if existing >= role => Ok(()),
        _ => upsert_membership(conn, tree_id, user_id, role),
    }
}

pub fn delete_membership(conn: &Connection, tree_id: &str, user_id: &str) -> SqliteResult<bool> {
    let rows = conn.execute(
        "DELETE FROM tree_memberships WHERE tree_id = ?1 AND user_id = ?2",
        params![tree_id, user_id],
    )?;
    Ok(rows > 0)
}

pub fn list_members(conn: &Connection, tree_id: &str) -> SqliteResult<Vec<TreeMembership>> {
    let mut stmt = conn.prepare(
        "SELECT tree_id, user_id, role, joined_at FROM tree_memberships
         WHERE tree_id = ?1 ORDER BY joined_at, user_id",
    )?;
    let rows = stmt
        .query_map([tree_id], row_to_membership)?
        .collect::<SqliteResult<Vec<_>>>()?;
    Ok(rows)
}

/// Trees (other than their own) the user holds a membership on
pub fn trees_for_user(conn: &Connection, user_id: &str) -> SqliteResult<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT tree_id FROM tree_memberships WHERE user_id = ?1 AND tree_id != ?1 ORDER BY tree_id",
    )?;
    let rows = stmt
        .query_map([user_id], |r| r.get(0))?
        .collect::<SqliteResult<Vec<String>>>()?;
    Ok(rows)
}

fn row_to_membership(row: &rusqlite::Row) -> rusqlite::Result<TreeMembership> {
    Ok(TreeMembership {
        tree_id: row.get(0)?,
        user_id: row.get(1)?,
        role: enum_column(row, 2, TreeRole::from_str)?,
        joined_at: row.get(3)?,
    })
}
