//! Family/friend social links between two accounts.
//!
//! A connection is two rows, `(user → peer)` and `(peer → user)`, written
//! through the same mirrored-write primitive as link approval.

use family_graph_types::{Connection as SocialConnection, ConnectRequest};
use rusqlite::Connection;

use super::mirror::{run_mirrored, MirroredWrite};
use super::{validate_account_id, GraphService};
use crate::db::tables::connections;
use crate::error::{GraphError, GraphResult};

struct ConnectionMirror<'a> {
    user: &'a str,
    request: &'a ConnectRequest,
}

impl MirroredWrite for ConnectionMirror<'_> {
    type Anchor = SocialConnection;

    fn upsert_anchor(&self, conn: &Connection) -> GraphResult<(SocialConnection, bool)> {
        let created = connections::insert_if_missing(
            conn,
            self.user,
            &self.request.peer_user_id,
            self.request.kind,
        )?;
        let row = connections::get_connection(conn, self.user, &self.request.peer_user_id)?
            .ok_or_else(|| GraphError::Internal("connection row missing after insert".to_string()))?;
        Ok((row, created))
    }

    fn ensure_mirror(&self, conn: &Connection, anchor: &SocialConnection) -> GraphResult<usize> {
        let written =
            connections::insert_if_missing(conn, &anchor.peer_user_id, &anchor.user_id, anchor.kind)?;
        Ok(written as usize)
    }
}

impl GraphService {
    /// Connect the caller with a peer. Repeated calls converge on the same pair.
    pub fn connect(&self, caller: &str, req: &ConnectRequest) -> GraphResult<SocialConnection> {
        validate_account_id(&req.peer_user_id, "peer user id")?;
        if req.peer_user_id == caller {
            return Err(GraphError::Validation("cannot connect to yourself".to_string()));
        }

        let mut conn = self.db.conn();
        let report = run_mirrored(
            &mut conn,
            &ConnectionMirror {
                user: caller,
                request: req,
            },
        )?;
        if report.anchor_created || report.mirrored_rows > 0 {
            log::info!(
                "[CONNECTIONS] {} connected with {} as {}",
                caller,
                req.peer_user_id,
                report.anchor.kind.as_str()
            );
        }
        Ok(report.anchor)
    }

    pub fn list_connections(&self, caller: &str) -> GraphResult<Vec<SocialConnection>> {
        let conn = self.db.conn();
        Ok(connections::list_for_user(&conn, caller)?)
    }

    /// Remove both rows of a connection
    pub fn disconnect(&self, caller: &str, peer_user_id: &str) -> GraphResult<()> {
        let conn = self.db.conn();
        if connections::delete_pair(&conn, caller, peer_user_id)? == 0 {
            return Err(GraphError::NotFound(format!(
                "{} is not connected to {}",
                caller, peer_user_id
            )));
        }
        log::info!("[CONNECTIONS] {} disconnected from {}", caller, peer_user_id);
        Ok(())
    }
}
