//! SQLite connection pool and schema management.
//!
//! Schema versioning uses `PRAGMA user_version`: each migration step bumps
//! the version, so upgrades replay only the missing steps.

use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::Connection;

use crate::core::error::RepoError;

pub type DbPool = Pool<SqliteConnectionManager>;
pub type DbConnection = PooledConnection<SqliteConnectionManager>;

/// Create a new database connection pool.
///
/// Initializes a pool with up to 10 connections and brings the schema up to
/// date before returning.
///
/// # Arguments
///
/// * `database_path` - Path to the SQLite database file
pub fn create_pool(database_path: &str) -> Result<DbPool, RepoError> {
    let manager = SqliteConnectionManager::file(database_path).with_init(|conn| {
        conn.execute_batch("PRAGMA busy_timeout = 5000; PRAGMA foreign_keys = ON;")
    });
    let pool = Pool::builder()
        .max_size(10) // Maximum 10 connections in the pool
        .build(manager)?;

    let conn = pool.get()?;
    migrate_schema(&conn)?;

    Ok(pool)
}

/// Get a connection from the pool.
///
/// The connection returns to the pool when dropped.
pub fn get_connection(pool: &DbPool) -> Result<DbConnection, RepoError> {
    Ok(pool.get()?)
}

/// Bring the schema up to the current version.
pub fn migrate_schema(conn: &Connection) -> Result<(), RepoError> {
    let version: i64 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;

    if version < 1 {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS artists (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL UNIQUE,
                monitored INTEGER NOT NULL DEFAULT 1,
                discovery_interval_mins INTEGER DEFAULT NULL,
                last_discovery_at TEXT DEFAULT NULL,
                last_discovery_error TEXT DEFAULT NULL,
                consecutive_discovery_errors INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS videos (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                artist_id INTEGER NOT NULL REFERENCES artists(id),
                title TEXT NOT NULL,
                external_ids TEXT NOT NULL DEFAULT '{}',
                status TEXT NOT NULL DEFAULT 'wanted',
                file_path TEXT DEFAULT NULL,
                duration_secs INTEGER DEFAULT NULL,
                published_at TEXT DEFAULT NULL,
                retry_count INTEGER NOT NULL DEFAULT 0,
                last_error TEXT DEFAULT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_videos_artist ON videos(artist_id);
            CREATE INDEX IF NOT EXISTS idx_videos_status_created ON videos(status, created_at);

            PRAGMA user_version = 1;",
        )?;
        log::info!("Schema migrated to version 1");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_db_path() -> String {
        std::env::temp_dir()
            .join(format!("vidra_test_{}.sqlite", uuid::Uuid::new_v4()))
            .to_string_lossy()
            .into_owned()
    }

    #[test]
    fn create_pool_builds_schema() {
        let pool = create_pool(&temp_db_path()).unwrap();
        let conn = get_connection(&pool).unwrap();

        let version: i64 = conn.query_row("PRAGMA user_version", [], |row| row.get(0)).unwrap();
        assert_eq!(version, 1);

        // Both tables queryable.
        let artists: i64 = conn.query_row("SELECT COUNT(*) FROM artists", [], |r| r.get(0)).unwrap();
        let videos: i64 = conn.query_row("SELECT COUNT(*) FROM videos", [], |r| r.get(0)).unwrap();
        assert_eq!((artists, videos), (0, 0));
    }

    #[test]
    fn migrate_is_idempotent() {
        let path = temp_db_path();
        let pool = create_pool(&path).unwrap();
        let conn = get_connection(&pool).unwrap();
        migrate_schema(&conn).unwrap();
        migrate_schema(&conn).unwrap();
    }
}
