//! Error taxonomy for the family graph.
//!
//! Each variant maps to one HTTP status. Internal failures keep their detail
//! for the log and return a generic message to the caller.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use family_graph_types::RpcResponse;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GraphError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("permission denied: {0}")]
    Permission(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("missing caller identity")]
    Unauthenticated,

    #[error("internal error: {0}")]
    Internal(String),
}

pub type GraphResult<T> = Result<T, GraphError>;

impl GraphError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            GraphError::Validation(_) => StatusCode::BAD_REQUEST,
            GraphError::NotFound(_) => StatusCode::NOT_FOUND,
            GraphError::Permission(_) => StatusCode::FORBIDDEN,
            GraphError::Conflict(_) => StatusCode::CONFLICT,
            GraphError::Unauthenticated => StatusCode::UNAUTHORIZED,
            GraphError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to return to a client.
    pub fn public_message(&self) -> String {
        match self {
            GraphError::Internal(_) => "Internal server error".to_string(),
            other => other.to_string(),
        }
    }
}

impl From<rusqlite::Error> for GraphError {
    fn from(e: rusqlite::Error) -> Self {
        match e {
            rusqlite::Error::SqliteFailure(ref err, _)
                if err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                    || err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY =>
            {
                log::debug!("[GRAPH] Unique constraint: {}", e);
                GraphError::Conflict("record already exists".to_string())
            }
            other => GraphError::Internal(format!("Database error: {}", other)),
        }
    }
}

impl IntoResponse for GraphError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            log::error!("[GRAPH] {}", self);
        } else {
            log::debug!("[GRAPH] {} -> {}", status, self);
        }
        (status, Json(RpcResponse::<()>::err(self.public_message()))).into_response()
    }
}
