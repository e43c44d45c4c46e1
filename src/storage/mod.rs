//! Persistence: connection pool, schema, and the repository the core
//! consumes.

pub mod db;
pub mod repository;

pub use db::{create_pool, get_connection, DbConnection, DbPool};
pub use repository::{Repository, SqliteRepository, VideoTransition};
