//! Tree access guard and membership administration.
//!
//! A user always owns the tree whose id equals their own user id. Any other
//! tree needs an explicit membership row at or above the required role.

use family_graph_types::{TreeMembership, TreeRole};
use rusqlite::Connection;

use super::{validate_account_id, GraphService};
use crate::db::tables::memberships;
use crate::error::{GraphError, GraphResult};

/// Role `user_id` holds on `tree_id`, if any
pub fn effective_role(conn: &Connection, tree_id: &str, user_id: &str) -> GraphResult<Option<TreeRole>> {
    if tree_id == user_id {
        return Ok(Some(TreeRole::Owner));
    }
    Ok(memberships::get_role(conn, tree_id, user_id)?)
}

pub fn ensure_access(
    conn: &Connection,
    tree_id: &str,
    user_id: &str,
    required: TreeRole,
) -> GraphResult<TreeRole> {
    match effective_role(conn, tree_id, user_id)? {
        Some(role) if role >= required => Ok(role),
        Some(role) => Err(GraphError::Permission(format!(
            "{} role on tree '{}' is required, caller has {}",
            required.as_str(),
            tree_id,
            role.as_str()
        ))),
        None => Err(GraphError::Permission(format!(
            "no access to tree '{}'",
            tree_id
        ))),
    }
}

impl GraphService {
    pub fn ensure_access(&self, tree_id: &str, user_id: &str, required: TreeRole) -> GraphResult<TreeRole> {
        let conn = self.db.conn();
        ensure_access(&conn, tree_id, user_id, required)
    }

    /// Grant a member or viewer role on a tree the caller owns.
    pub fn grant_membership(
        &self,
        caller: &str,
        tree_id: &str,
        user_id: &str,
        role: TreeRole,
    ) -> GraphResult<TreeMembership> {
        validate_account_id(user_id, "user id")?;
        if role == TreeRole::Owner {
            return Err(GraphError::Validation(
                "owner role cannot be granted".to_string(),
            ));
        }
        if user_id == tree_id {
            return Err(GraphError::Validation(
                "tree owner already has full access".to_string(),
            ));
        }

        let conn = self.db.conn();
        ensure_access(&conn, tree_id, caller, TreeRole::Owner)?;
        memberships::upsert_membership(&conn, tree_id, user_id, role)?;
        log::info!("[ACCESS] {} granted {} on tree {}", user_id, role.as_str(), tree_id);

        memberships::list_members(&conn, tree_id)?
            .into_iter()
            .find(|m| m.user_id == user_id)
            .ok_or_else(|| GraphError::Internal("membership vanished after upsert".to_string()))
    }

    pub fn revoke_membership(&self, caller: &str, tree_id: &str, user_id: &str) -> GraphResult<()> {
        if user_id == tree_id {
            return Err(GraphError::Validation(
                "tree owner cannot be removed".to_string(),
            ));
        }
        let conn = self.db.conn();
        ensure_access(&conn, tree_id, caller, TreeRole::Owner)?;
        if !memberships::delete_membership(&conn, tree_id, user_id)? {
            return Err(GraphError::NotFound(format!(
                "{} is not a member of tree '{}'",
                user_id, tree_id
            )));
        }
        log::info!("[ACCESS] {} removed from tree {}", user_id, tree_id);
        Ok(())
    }

    pub fn list_members(&self, caller: &str, tree_id: &str) -> GraphResult<Vec<TreeMembership>> {
        let conn = self.db.conn();
        ensure_access(&conn, tree_id, caller, TreeRole::Viewer)?;
        Ok(memberships::list_members(&conn, tree_id)?)
    }
}
