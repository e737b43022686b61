//! Local projection of the user directory.

use family_graph_types::{UpsertProfileRequest, UserProfile};

use super::persons::validate_email;
use super::GraphService;
use crate::db::tables::user_profiles;
use crate::error::{GraphError, GraphResult};

impl GraphService {
    /// Record the caller's own display name, email and avatar.
    pub fn upsert_profile(&self, caller: &str, req: &UpsertProfileRequest) -> GraphResult<UserProfile> {
        let display_name = req.display_name.trim();
        if display_name.is_empty() {
            return Err(GraphError::Validation("display_name is required".to_string()));
        }
        let email = req.email.as_deref().map(validate_email).transpose()?;

        let profile = {
            let conn = self.db.conn();
            user_profiles::upsert_profile(
                &conn,
                caller,
                display_name,
                email.as_deref(),
                req.avatar_url.as_deref(),
            )?
        };
        self.directory.invalidate(caller);
        log::info!("[DIRECTORY] Updated profile for {}", caller);
        Ok(profile)
    }

    pub fn get_profile(&self, user_id: &str) -> GraphResult<UserProfile> {
        self.directory
            .profile(user_id)?
            .ok_or_else(|| GraphError::NotFound(format!("user {}", user_id)))
    }
}
