//! Local projection of the user directory (user_profiles)

use family_graph_types::UserProfile;
use rusqlite::{params, Connection, OptionalExtension, Result as SqliteResult};

use crate::db::now_rfc3339;

pub fn upsert_profile(
    conn: &Connection,
    user_id: &str,
    display_name: &str,
    email: Option<&str>,
    avatar_url: Option<&str>,
) -> SqliteResult<UserProfile> {
    let now = now_rfc3339();
    conn.execute(
        "INSERT INTO user_profiles (user_id, display_name, email, avatar_url, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT(user_id) DO UPDATE SET
             display_name = excluded.display_name,
             email = excluded.email,
             avatar_url = excluded.avatar_url,
             updated_at = excluded.updated_at",
        params![user_id, display_name, email, avatar_url, now],
    )?;
    Ok(UserProfile {
        user_id: user_id.to_string(),
        display_name: display_name.to_string(),
        email: email.map(str::to_string),
        avatar_url: avatar_url.map(str::to_string),
        updated_at: now,
    })
}

pub fn get_profile(conn: &Connection, user_id: &str) -> SqliteResult<Option<UserProfile>> {
    conn.query_row(
        "SELECT user_id, display_name, email, avatar_url, updated_at
         FROM user_profiles WHERE user_id = ?1",
        [user_id],
        |row| {
            Ok(UserProfile {
                user_id: row.get(0)?,
                display_name: row.get(1)?,
                email: row.get(2)?,
                avatar_url: row.get(3)?,
                updated_at: row.get(4)?,
            })
        },
    )
    .optional()
}
