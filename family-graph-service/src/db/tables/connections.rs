//! Dual-row social links (connections)

use family_graph_types::{Connection as SocialConnection, ConnectionKind};
use rusqlite::{params, Connection, OptionalExtension, Result as SqliteResult};

use crate::db::{enum_column, now_rfc3339};

pub fn get_connection(
    conn: &Connection,
    user_id: &str,
    peer_user_id: &str,
) -> SqliteResult<Option<SocialConnection>> {
    conn.query_row(
        "SELECT id, user_id, peer_user_id, kind, created_at FROM connections
         WHERE user_id = ?1 AND peer_user_id = ?2",
        params![user_id, peer_user_id],
        row_to_connection,
    )
    .optional()
}

/// Insert the row unless it exists. Returns true when a row was written.
pub fn insert_if_missing(
    conn: &Connection,
    user_id: &str,
    peer_user_id: &str,
    kind: ConnectionKind,
) -> SqliteResult<bool> {
    let rows = conn.execute(
        "INSERT OR IGNORE INTO connections (user_id, peer_user_id, kind, created_at)
         VALUES (?1, ?2, ?3, ?4)",
        params![user_id, peer_user_id, kind.as_str(), now_rfc3339()],
    )?;
    Ok(rows > 0)
}

pub fn list_for_user(conn: &Connection, user_id: &str) -> SqliteResult<Vec<SocialConnection>> {
    let mut stmt = conn.prepare(
        "SELECT id, user_id, peer_user_id, kind, created_at FROM connections
         WHERE user_id = ?1 ORDER BY created_at, id",
    )?;
    let rows = stmt
        .query_map([user_id], row_to_connection)?
        .collect::<SqliteResult<Vec<_>>>()?;
    Ok(rows)
}

/// Remove both directions of a connection. Returns the number of rows removed.
pub fn delete_pair(conn: &Connection, user_id: &str, peer_user_id: &str) -> SqliteResult<usize> {
    conn.execute(
        "DELETE FROM connections
         WHERE (user_id = ?1 AND peer_user_id = ?2) OR (user_id = ?2 AND peer_user_id = ?1)",
        params![user_id, peer_user_id],
    )
}

fn row_to_connection(row: &rusqlite::Row) -> rusqlite::Result<SocialConnection> {
    Ok(SocialConnection {
        id: row.get(0)?,
        user_id: row.get(1)?,
        peer_user_id: row.get(2)?,
        kind: enum_column(row, 3, ConnectionKind::from_str)?,
        created_at: row.get(4)?,
    })
}
