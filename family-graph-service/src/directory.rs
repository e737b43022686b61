//! User directory collaborator.
//!
//! Resolves display name, email and avatar for a platform account. Lookups go
//! through an injected moka cache with a TTL and a capacity bound, owned by
//! the service state rather than any global.

use family_graph_types::UserProfile;
use moka::sync::Cache;
use std::sync::Arc;
use std::time::Duration;

use crate::db::tables::user_profiles;
use crate::db::Db;
use crate::error::GraphResult;

pub trait UserDirectory: Send + Sync {
    fn profile(&self, user_id: &str) -> GraphResult<Option<UserProfile>>;

    /// Drop any cached view of `user_id` after it changed.
    fn invalidate(&self, _user_id: &str) {}
}

/// Directory backed by the local `user_profiles` table
pub struct DbDirectory {
    db: Arc<Db>,
}

impl DbDirectory {
    pub fn new(db: Arc<Db>) -> Self {
        Self { db }
    }
}

impl UserDirectory for DbDirectory {
    fn profile(&self, user_id: &str) -> GraphResult<Option<UserProfile>> {
        let conn = self.db.conn();
        Ok(user_profiles::get_profile(&conn, user_id)?)
    }
}

pub struct CachedDirectory<D: UserDirectory> {
    inner: D,
    /// key = user_id → profile, including negative results
    profiles: Cache<String, Option<UserProfile>>,
}

impl<D: UserDirectory> CachedDirectory<D> {
    pub fn new(inner: D, ttl: Duration, capacity: u64) -> Self {
        Self {
            inner,
            profiles: Cache::builder()
                .time_to_live(ttl)
                .max_capacity(capacity)
                .build(),
        }
    }
}

impl<D: UserDirectory> UserDirectory for CachedDirectory<D> {
    fn profile(&self, user_id: &str) -> GraphResult<Option<UserProfile>> {
        if let Some(hit) = self.profiles.get(user_id) {
            return Ok(hit);
        }
        let profile = self.inner.profile(user_id)?;
        self.profiles.insert(user_id.to_string(), profile.clone());
        Ok(profile)
    }

    fn invalidate(&self, user_id: &str) {
        self.profiles.invalidate(user_id);
    }
}
