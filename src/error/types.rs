// src/error/types.rs
use crate::domain::DomainError;
use rusqlite::ErrorCode;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    /// A referenced primary key does not exist
    #[error("{column} {id} does not exist in {table}")]
    NotFound {
        table: &'static str,
        column: &'static str,
        id: i64,
    },

    /// Unique or foreign-key failure reported by the store
    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    /// Malformed criterion. Filter handlers log and drop these instead of raising.
    #[error("Invalid filter: {0}")]
    InvalidFilter(String),

    #[error("Database error: {0}")]
    Database(rusqlite::Error),

    #[error("Pool error: {0}")]
    Pool(String),

    #[error("Domain error: {0}")]
    Domain(#[from] DomainError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(String),
}

impl AppError {
    pub fn not_found(table: &'static str, column: &'static str, id: i64) -> Self {
        AppError::NotFound { table, column, id }
    }

    /// Connection or IO failures, as opposed to logical errors
    pub fn is_transport(&self) -> bool {
        matches!(self, AppError::Database(_) | AppError::Pool(_) | AppError::Io(_))
    }
}

impl From<rusqlite::Error> for AppError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(failure, message)
                if failure.code == ErrorCode::ConstraintViolation =>
            {
                AppError::ConstraintViolation(
                    message.clone().unwrap_or_else(|| failure.to_string()),
                )
            }
            _ => AppError::Database(err),
        }
    }
}

impl Serialize for AppError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl From<chrono::ParseError> for AppError {
    fn from(err: chrono::ParseError) -> Self {
        AppError::Other(format!("Date parse error: {}", err))
    }
}

impl From<r2d2::Error> for AppError {
    fn from(err: r2d2::Error) -> Self {
        AppError::Pool(err.to_string())
    }
}

impl From<walkdir::Error> for AppError {
    fn from(err: walkdir::Error) -> Self {
        AppError::Other(format!("Directory walk error: {}", err))
    }
}

pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    #[test]
    fn test_unique_violation_maps_to_constraint_error() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE t (name TEXT UNIQUE); INSERT INTO t VALUES ('a');")
            .unwrap();

        let err: AppError = conn
            .execute("INSERT INTO t VALUES ('a')", [])
            .unwrap_err()
            .into();

        assert!(matches!(err, AppError::ConstraintViolation(_)), "got {:?}", err);
        assert!(!err.is_transport());
    }

    #[test]
    fn test_other_store_errors_stay_transport() {
        let conn = Connection::open_in_memory().unwrap();
        let err: AppError = conn.execute("SELECT * FROM missing", []).unwrap_err().into();

        assert!(matches!(err, AppError::Database(_)));
        assert!(err.is_transport());
    }

    #[test]
    fn test_serializes_as_display_string() {
        let err = AppError::not_found("scenes", "id", 7);
        let json = serde_json::to_string(&err).unwrap();
        assert_eq!(json, "\"id 7 does not exist in scenes\"");
    }
}
