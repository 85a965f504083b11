// src/db/connection.rs
//
// Database connection management
//
// PRINCIPLES:
// - Explicit connection pooling
// - No hidden connection creation
// - Every connection gets the same pragmas and SQL functions
// - Acquisition timeout is the only deadline in the query layer

use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use regex::Regex;
use rusqlite::functions::FunctionFlags;
use rusqlite::types::ValueRef;
use rusqlite::Connection;
use std::path::Path;
use std::sync::Arc;

use crate::config::DatabaseConfig;
use crate::error::{AppError, AppResult};

/// Type alias for connection pool
pub type ConnectionPool = Pool<SqliteConnectionManager>;

/// Type alias for a pooled connection
pub type PooledConn = PooledConnection<SqliteConnectionManager>;

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Create a connection pool for the database file at `db_path`
///
/// Pool configuration:
/// - Size and acquisition timeout from config
/// - SQLite in WAL mode for better concurrency
/// - Foreign keys enabled
/// - Busy timeout set to avoid immediate lock errors
/// - REGEXP available to filters
pub fn create_connection_pool(db_path: &Path, config: &DatabaseConfig) -> AppResult<ConnectionPool> {
    let busy_timeout = config.busy_timeout_ms;
    let manager = SqliteConnectionManager::file(db_path).with_init(move |conn| {
        conn.execute_batch(&format!(
            "PRAGMA foreign_keys = ON;
             PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA busy_timeout = {};",
            busy_timeout
        ))?;
        register_functions(conn)
    });

    let pool = Pool::builder()
        .max_size(config.max_connections)
        .connection_timeout(config.acquire_timeout())
        .build(manager)
        .map_err(|e| AppError::Pool(format!("Failed to create connection pool: {}", e)))?;

    Ok(pool)
}

/// Get a connection from the pool
pub fn get_connection(pool: &ConnectionPool) -> AppResult<PooledConn> {
    pool.get()
        .map_err(|e| AppError::Pool(format!("Failed to get database connection: {}", e)))
}

/// Register the SQL functions the query layer relies on
///
/// `X REGEXP Y` is rewritten by SQLite to `regexp(Y, X)`, so the pattern
/// comes first. Compiled patterns are cached per statement.
pub fn register_functions(conn: &Connection) -> rusqlite::Result<()> {
    conn.create_scalar_function(
        "regexp",
        2,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| {
            let regex: Arc<Regex> = ctx.get_or_create_aux(0, |vr| -> Result<_, BoxError> {
                Ok(Regex::new(vr.as_str()?)?)
            })?;

            match ctx.get_raw(1) {
                ValueRef::Null => Ok(None),
                ValueRef::Text(bytes) => {
                    let text = std::str::from_utf8(bytes)
                        .map_err(|e| rusqlite::Error::UserFunctionError(e.into()))?;
                    Ok(Some(regex.is_match(text)))
                }
                ValueRef::Integer(i) => Ok(Some(regex.is_match(&i.to_string()))),
                ValueRef::Real(f) => Ok(Some(regex.is_match(&f.to_string()))),
                ValueRef::Blob(_) => Ok(Some(false)),
            }
        },
    )
}

/// Create a standalone in-memory connection (for testing)
pub fn create_test_connection() -> AppResult<Connection> {
    let conn = Connection::open_in_memory()?;

    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    register_functions(&conn)?;

    Ok(conn)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_test_connection() {
        let conn = create_test_connection().unwrap();

        let result: i32 = conn
            .query_row("SELECT 1 + 1", [], |row| row.get(0))
            .unwrap();
        assert_eq!(result, 2);

        let fk_enabled: i32 = conn
            .query_row("PRAGMA foreign_keys", [], |row| row.get(0))
            .unwrap();
        assert_eq!(fk_enabled, 1);
    }

    #[test]
    fn test_regexp_function() {
        let conn = create_test_connection().unwrap();

        let matched: bool = conn
            .query_row("SELECT 'Episode 01.mkv' REGEXP '^Episode \\d+'", [], |row| row.get(0))
            .unwrap();
        assert!(matched);

        let negated: bool = conn
            .query_row("SELECT 'trailer.mp4' NOT REGEXP 'Episode'", [], |row| row.get(0))
            .unwrap();
        assert!(negated);

        let null: Option<bool> = conn
            .query_row("SELECT NULL REGEXP 'x'", [], |row| row.get(0))
            .unwrap();
        assert_eq!(null, None);
    }

    #[test]
    fn test_invalid_regexp_is_an_error() {
        let conn = create_test_connection().unwrap();
        let result: rusqlite::Result<bool> =
            conn.query_row("SELECT 'abc' REGEXP '('", [], |row| row.get(0));
        assert!(result.is_err());
    }

    #[test]
    fn test_connection_pool_creation() {
        let dir = tempfile::tempdir().unwrap();
        let pool = create_connection_pool(&dir.path().join("test.db"), &DatabaseConfig::default())
            .unwrap();
        let conn = get_connection(&pool).unwrap();

        let fk_enabled: i32 = conn
            .query_row("PRAGMA foreign_keys", [], |row| row.get(0))
            .unwrap();
        assert_eq!(fk_enabled, 1);

        let matched: bool = conn
            .query_row("SELECT 'abc' REGEXP 'b'", [], |row| row.get(0))
            .unwrap();
        assert!(matched);
    }
}
