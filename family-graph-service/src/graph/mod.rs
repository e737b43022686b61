//! The family relationship graph.
//!
//! `GraphService` owns the store handle and the two collaborators (user
//! directory, notifier). Every public operation takes the caller's verified
//! user id and gates through [`access::ensure_access`] before touching a tree.
//!
//! The SQLite mutex is never held across a directory lookup or a
//! notification: `DbDirectory` locks the same connection.

pub mod access;
pub mod connections;
pub mod cycle_guard;
pub mod links;
pub mod mirror;
pub mod persons;
pub mod profiles;
pub mod relationships;
pub mod traversal;

use std::sync::Arc;

use crate::config::{Config, CyclePolicy};
use crate::db::Db;
use crate::directory::UserDirectory;
use crate::error::{GraphError, GraphResult};
use crate::notify::Notifier;

/// Graph tunables taken from [`Config`]
#[derive(Debug, Clone)]
pub struct GraphSettings {
    pub link_ttl: chrono::Duration,
    pub default_depth: u32,
    pub max_depth: u32,
    pub cycle_policy: CyclePolicy,
}

impl From<&Config> for GraphSettings {
    fn from(config: &Config) -> Self {
        Self {
            link_ttl: config.link_ttl,
            default_depth: config.default_depth,
            max_depth: config.max_depth,
            cycle_policy: config.cycle_policy,
        }
    }
}

impl Default for GraphSettings {
    fn default() -> Self {
        GraphSettings::from(&Config::default())
    }
}

pub struct GraphService {
    db: Arc<Db>,
    directory: Arc<dyn UserDirectory>,
    notifier: Arc<dyn Notifier>,
    settings: GraphSettings,
}

impl GraphService {
    pub fn new(
        db: Arc<Db>,
        directory: Arc<dyn UserDirectory>,
        notifier: Arc<dyn Notifier>,
        settings: GraphSettings,
    ) -> Self {
        Self {
            db,
            directory,
            notifier,
            settings,
        }
    }

    pub fn db(&self) -> &Arc<Db> {
        &self.db
    }

    pub fn settings(&self) -> &GraphSettings {
        &self.settings
    }

    pub fn directory(&self) -> &Arc<dyn UserDirectory> {
        &self.directory
    }

    /// Display name for an account, falling back to the raw id.
    fn display_name_of(&self, user_id: &str) -> String {
        match self.directory.profile(user_id) {
            Ok(Some(profile)) => profile.display_name,
            Ok(None) => user_id.to_string(),
            Err(e) => {
                log::warn!("[GRAPH] Directory lookup for {} failed: {}", user_id, e);
                user_id.to_string()
            }
        }
    }
}

/// Parse an opaque wire id into a row id.
pub fn parse_id(raw: &str, what: &str) -> GraphResult<i64> {
    raw.trim()
        .parse::<i64>()
        .ok()
        .filter(|id| *id > 0)
        .ok_or_else(|| GraphError::Validation(format!("Malformed {} id '{}'", what, raw)))
}

/// Tree and user ids are opaque but must be non-blank and reasonably short.
pub fn validate_account_id(raw: &str, what: &str) -> GraphResult<()> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.len() > 128 || trimmed != raw {
        return Err(GraphError::Validation(format!("Malformed {} '{}'", what, raw)));
    }
    Ok(())
}

/// Split a display name into (first, last) for nodes created on an account's behalf.
fn split_display_name(name: &str) -> (String, String) {
    let name = name.trim();
    match name.rsplit_once(' ') {
        Some((first, last)) if !first.trim().is_empty() => {
            (first.trim().to_string(), last.to_string())
        }
        _ => (name.to_string(), String::new()),
    }
}
