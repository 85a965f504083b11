// src/db/transaction.rs
//
// Scoped transactions
//
// RULES:
// - Exactly one commit or one rollback per scope
// - A failed rollback is logged; the caller sees the original error
// - Read scopes reuse a transaction already open on the connection
// - The handle passed to the closure is borrowed, never stored

use rusqlite::{Connection, Transaction, TransactionBehavior};

use crate::db::connection::{get_connection, ConnectionPool};
use crate::error::AppResult;

/// Run `f` inside a write transaction on a freshly checked-out connection
///
/// Commits if `f` succeeds, rolls back and returns the error otherwise.
pub fn with_txn<T, F>(pool: &ConnectionPool, f: F) -> AppResult<T>
where
    F: FnOnce(&Connection) -> AppResult<T>,
{
    let mut conn = get_connection(pool)?;
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    finish(tx, f)
}

/// Run `f` inside a read transaction on a freshly checked-out connection
pub fn with_read_txn<T, F>(pool: &ConnectionPool, f: F) -> AppResult<T>
where
    F: FnOnce(&Connection) -> AppResult<T>,
{
    let conn = get_connection(pool)?;
    read_txn(&conn, f)
}

/// Run `f` on `conn` within a transaction
///
/// If a transaction is already open on `conn`, `f` joins it and the owner
/// of that transaction decides its outcome. Otherwise a short-lived one is
/// opened around `f`.
pub fn read_txn<T, F>(conn: &Connection, f: F) -> AppResult<T>
where
    F: FnOnce(&Connection) -> AppResult<T>,
{
    if !conn.is_autocommit() {
        return f(conn);
    }

    let tx = conn.unchecked_transaction()?;
    finish(tx, f)
}

fn finish<T, F>(tx: Transaction<'_>, f: F) -> AppResult<T>
where
    F: FnOnce(&Connection) -> AppResult<T>,
{
    match f(&*tx) {
        Ok(value) => {
            tx.commit()?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = tx.rollback() {
                log::error!("Rollback failed after {}: {}", err, rollback_err);
            }
            Err(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DatabaseConfig;
    use crate::db::connection::create_connection_pool;
    use crate::error::AppError;

    fn pool_with_table() -> (tempfile::TempDir, ConnectionPool) {
        let dir = tempfile::tempdir().unwrap();
        let pool = create_connection_pool(&dir.path().join("txn.db"), &DatabaseConfig::default())
            .unwrap();
        get_connection(&pool)
            .unwrap()
            .execute_batch("CREATE TABLE items (id INTEGER PRIMARY KEY, name TEXT NOT NULL)")
            .unwrap();
        (dir, pool)
    }

    fn count(pool: &ConnectionPool) -> i64 {
        get_connection(pool)
            .unwrap()
            .query_row("SELECT COUNT(*) FROM items", [], |row| row.get(0))
            .unwrap()
    }

    #[test]
    fn test_commit_on_success() {
        let (_dir, pool) = pool_with_table();

        let id = with_txn(&pool, |conn| {
            conn.execute("INSERT INTO items (name) VALUES ('a')", [])?;
            Ok(conn.last_insert_rowid())
        })
        .unwrap();

        assert_eq!(id, 1);
        assert_eq!(count(&pool), 1);
    }

    #[test]
    fn test_rollback_on_error() {
        let (_dir, pool) = pool_with_table();

        let result: AppResult<()> = with_txn(&pool, |conn| {
            conn.execute("INSERT INTO items (name) VALUES ('a')", [])?;
            Err(AppError::Other("abort".to_string()))
        });

        assert!(matches!(result, Err(AppError::Other(ref m)) if m == "abort"));
        assert_eq!(count(&pool), 0);
    }

    #[test]
    fn test_read_txn_joins_open_transaction() {
        let (_dir, pool) = pool_with_table();

        let result: AppResult<()> = with_txn(&pool, |conn| {
            conn.execute("INSERT INTO items (name) VALUES ('a')", [])?;

            // The nested read sees the uncommitted row and does not commit it
            let seen: i64 = read_txn(conn, |inner| {
                Ok(inner.query_row("SELECT COUNT(*) FROM items", [], |row| row.get(0))?)
            })?;
            assert_eq!(seen, 1);
            assert!(!conn.is_autocommit());

            Err(AppError::Other("abort".to_string()))
        });

        assert!(result.is_err());
        assert_eq!(count(&pool), 0);
    }

    #[test]
    fn test_read_txn_opens_short_lived_transaction() {
        let (_dir, pool) = pool_with_table();
        let conn = get_connection(&pool).unwrap();

        let inside = read_txn(&conn, |inner| Ok(inner.is_autocommit())).unwrap();

        assert!(!inside);
        assert!(conn.is_autocommit());
    }

    #[test]
    fn test_with_read_txn() {
        let (_dir, pool) = pool_with_table();
        let n: i64 = with_read_txn(&pool, |conn| {
            Ok(conn.query_row("SELECT COUNT(*) FROM items", [], |row| row.get(0))?)
        })
        .unwrap();
        assert_eq!(n, 0);
    }
}
