//! SQLite persistence for the family graph.
//!
//! Table operations are free functions over `&rusqlite::Connection` so the
//! graph layer can compose several of them inside one local transaction.

pub mod tables;

use rusqlite::Result as SqliteResult;
use std::sync::{Mutex, MutexGuard};

pub struct Db {
    conn: Mutex<rusqlite::Connection>,
}

impl Db {
    pub fn open(path: &str) -> SqliteResult<Self> {
        let conn = if path == ":memory:" {
            rusqlite::Connection::open_in_memory()?
        } else {
            rusqlite::Connection::open(path)?
        };
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
        let db = Self {
            conn: Mutex::new(conn),
        };
        db.create_tables()?;
        Ok(db)
    }

    /// Lock the connection. A poisoned lock still guards a usable connection.
    pub fn conn(&self) -> MutexGuard<'_, rusqlite::Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn create_tables(&self) -> SqliteResult<()> {
        let conn = self.conn();
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS persons (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                tree_id TEXT NOT NULL,
                first_name TEXT NOT NULL,
                last_name TEXT NOT NULL,
                maiden_name TEXT,
                gender TEXT NOT NULL DEFAULT 'unknown',
                birth_date TEXT,
                death_date TEXT,
                is_alive INTEGER NOT NULL DEFAULT 1,
                linked_user_id TEXT,
                link_status TEXT NOT NULL DEFAULT 'none',
                source TEXT NOT NULL DEFAULT 'manual',
                created_by TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_persons_tree ON persons(tree_id);
            CREATE UNIQUE INDEX IF NOT EXISTS idx_persons_tree_linked_user
                ON persons(tree_id, linked_user_id);

            CREATE TABLE IF NOT EXISTS relationships (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                tree_id TEXT NOT NULL,
                person1_id INTEGER NOT NULL REFERENCES persons(id),
                person2_id INTEGER NOT NULL REFERENCES persons(id),
                relationship_type TEXT NOT NULL,
                is_biological INTEGER NOT NULL DEFAULT 1,
                created_by TEXT NOT NULL,
                created_at TEXT NOT NULL,
                UNIQUE(person1_id, person2_id, relationship_type)
            );
            CREATE INDEX IF NOT EXISTS idx_relationships_person2 ON relationships(person2_id);
            CREATE INDEX IF NOT EXISTS idx_relationships_tree ON relationships(tree_id);

            CREATE TABLE IF NOT EXISTS tree_memberships (
                tree_id TEXT NOT NULL,
                user_id TEXT NOT NULL,
                role TEXT NOT NULL,
                joined_at TEXT NOT NULL,
                PRIMARY KEY (tree_id, user_id)
            );
            CREATE INDEX IF NOT EXISTS idx_memberships_user ON tree_memberships(user_id);

            CREATE TABLE IF NOT EXISTS pending_links (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                tree_id TEXT NOT NULL,
                person_id INTEGER NOT NULL REFERENCES persons(id) ON DELETE CASCADE,
                target_user_id TEXT,
                target_email TEXT,
                token TEXT NOT NULL UNIQUE,
                status TEXT NOT NULL DEFAULT 'pending',
                created_by TEXT NOT NULL,
                created_at TEXT NOT NULL,
                expires_at TEXT NOT NULL,
                resolved_at TEXT
            );
            CREATE UNIQUE INDEX IF NOT EXISTS idx_pending_links_open
                ON pending_links(person_id) WHERE status = 'pending';
            CREATE INDEX IF NOT EXISTS idx_pending_links_target ON pending_links(target_user_id);

            CREATE TABLE IF NOT EXISTS connections (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id TEXT NOT NULL,
                peer_user_id TEXT NOT NULL,
                kind TEXT NOT NULL,
                created_at TEXT NOT NULL,
                UNIQUE(user_id, peer_user_id)
            );

            CREATE TABLE IF NOT EXISTS user_profiles (
                user_id TEXT PRIMARY KEY,
                display_name TEXT NOT NULL,
                email TEXT,
                avatar_url TEXT,
                updated_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_user_profiles_email ON user_profiles(LOWER(email));",
        )?;
        Ok(())
    }
}

pub(crate) fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// Read a text column into one of the shared string-backed enums.
pub(crate) fn enum_column<T>(
    row: &rusqlite::Row,
    idx: usize,
    parse: fn(&str) -> Option<T>,
) -> rusqlite::Result<T> {
    let raw: String = row.get(idx)?;
    parse(&raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            rusqlite::types::Type::Text,
            format!("unexpected enum value '{}'", raw).into(),
        )
    })
}
