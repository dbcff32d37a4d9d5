//! Persistence layer modules.

pub mod action_repo;
pub mod db;
pub mod registry;
pub mod schema;

/// Re-export the database pool type for convenience.
pub use sqlx::SqlitePool;
