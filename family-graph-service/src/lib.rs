//! Family Graph Service: per-account genealogy trees joined by approved
//! cross-account links.

pub mod auth;
pub mod config;
pub mod db;
pub mod directory;
pub mod error;
pub mod graph;
pub mod notify;
pub mod routes;

#[cfg(test)]
mod test_support;
