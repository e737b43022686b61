pub mod connections;
pub mod memberships;
pub mod pending_links;
pub mod persons;
pub mod relationships;
pub mod user_profiles;
