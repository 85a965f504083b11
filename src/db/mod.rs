// src/db/mod.rs
//
// Database module
//
// Provides:
// - Connection pooling and the regexp SQL function
// - Schema initialization
// - Transactions
// - Generic table, association, image and external-id repositories

pub mod blob_repository;
pub mod connection;
pub mod fields;
pub mod join_repository;
pub mod migrations;
pub mod repository;
pub mod stash_id_repository;
pub mod transaction;

pub use connection::{create_connection_pool, get_connection, ConnectionPool, PooledConn};

pub use migrations::{
    get_database_stats, initialize_database, verify_database_integrity, DatabaseStats,
};

pub use fields::{Entity, Field, PartialEntity, ToValue};
pub use repository::Repository;
pub use transaction::{read_txn, with_read_txn, with_txn};
