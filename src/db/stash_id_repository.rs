// src/db/stash_id_repository.rs
//
// External identities: (endpoint, remote id) pairs attached to an entity

use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};

use crate::db::transaction::read_txn;
use crate::error::AppResult;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StashId {
    pub endpoint: String,
    pub stash_id: String,
}

#[derive(Debug, Clone, Copy)]
pub struct StashIdTable {
    pub table: &'static str,
    pub id_column: &'static str,
}

pub const SCENE_STASH_IDS: StashIdTable = StashIdTable {
    table: "scene_stash_ids",
    id_column: "scene_id",
};
pub const PERFORMER_STASH_IDS: StashIdTable = StashIdTable {
    table: "performer_stash_ids",
    id_column: "performer_id",
};
pub const STUDIO_STASH_IDS: StashIdTable = StashIdTable {
    table: "studio_stash_ids",
    id_column: "studio_id",
};

impl StashIdTable {
    pub fn as_join(&self) -> crate::db::join_repository::JoinTable {
        crate::db::join_repository::JoinTable::new(self.table, self.id_column, "stash_id")
    }
}

pub struct StashIdRepository<'a> {
    conn: &'a Connection,
    table: StashIdTable,
}

impl<'a> StashIdRepository<'a> {
    pub fn new(conn: &'a Connection, table: StashIdTable) -> Self {
        Self { conn, table }
    }

    pub fn get(&self, id: i64) -> AppResult<Vec<StashId>> {
        let query = format!(
            "SELECT endpoint, stash_id FROM {} WHERE {} = ?1",
            self.table.table, self.table.id_column
        );
        read_txn(self.conn, |conn| {
            let mut stmt = conn.prepare(&query)?;
            let ids = stmt
                .query_map(params![id], |row| {
                    Ok(StashId {
                        endpoint: row.get(0)?,
                        stash_id: row.get(1)?,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(ids)
        })
    }

    /// Make `ids` the exact set of external identities for `id`
    pub fn replace(&self, id: i64, ids: &[StashId]) -> AppResult<()> {
        self.destroy(id)?;

        let insert = format!(
            "INSERT INTO {} ({}, endpoint, stash_id) VALUES (?1, ?2, ?3)",
            self.table.table, self.table.id_column
        );
        for stash_id in ids {
            self.conn
                .execute(&insert, params![id, stash_id.endpoint, stash_id.stash_id])?;
        }
        Ok(())
    }

    pub fn destroy(&self, id: i64) -> AppResult<()> {
        let stmt = format!(
            "DELETE FROM {} WHERE {} = ?1",
            self.table.table, self.table.id_column
        );
        self.conn.execute(&stmt, params![id])?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::connection::create_test_connection;

    #[test]
    fn test_replace_and_get() {
        let conn = create_test_connection().unwrap();
        conn.execute_batch(
            "CREATE TABLE scene_stash_ids (scene_id INTEGER, endpoint TEXT, stash_id TEXT);",
        )
        .unwrap();
        let repo = StashIdRepository::new(&conn, SCENE_STASH_IDS);

        let first = StashId {
            endpoint: "https://a.example/graphql".to_string(),
            stash_id: "abc".to_string(),
        };
        let second = StashId {
            endpoint: "https://b.example/graphql".to_string(),
            stash_id: "def".to_string(),
        };

        repo.replace(1, &[first.clone(), second.clone()]).unwrap();
        assert_eq!(repo.get(1).unwrap().len(), 2);

        repo.replace(1, &[second.clone()]).unwrap();
        assert_eq!(repo.get(1).unwrap(), vec![second]);
        assert!(repo.get(2).unwrap().is_empty());
    }
}
