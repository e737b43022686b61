//! Caller identity.
//!
//! Sessions are issued and verified by the auth layer in front of this
//! service, which forwards the verified account id in `X-User-Id`.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use crate::error::GraphError;

pub const USER_ID_HEADER: &str = "x-user-id";

/// Verified user id of the account making the request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller(pub String);

impl Caller {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for Caller
where
    S: Send + Sync,
{
    type Rejection = GraphError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(|id| Caller(id.to_string()))
            .ok_or(GraphError::Unauthenticated)
    }
}
