// src/db/blob_repository.rs
//
// One-image-per-owner tables (scene covers, performer/studio/tag images,
// movie front and back images)

use rusqlite::types::Value;
use rusqlite::{params, Connection, OptionalExtension};

use crate::db::transaction::read_txn;
use crate::error::AppResult;

#[derive(Debug, Clone, Copy)]
pub struct BlobTable {
    pub table: &'static str,
    pub id_column: &'static str,
    pub blob_column: &'static str,
    /// Other blob columns live in the same row
    pub shared_row: bool,
}

pub const SCENES_COVER: BlobTable = BlobTable {
    table: "scenes_cover",
    id_column: "scene_id",
    blob_column: "cover",
    shared_row: false,
};
pub const PERFORMERS_IMAGE: BlobTable = BlobTable {
    table: "performers_image",
    id_column: "performer_id",
    blob_column: "image",
    shared_row: false,
};
pub const STUDIOS_IMAGE: BlobTable = BlobTable {
    table: "studios_image",
    id_column: "studio_id",
    blob_column: "image",
    shared_row: false,
};
pub const TAGS_IMAGE: BlobTable = BlobTable {
    table: "tags_image",
    id_column: "tag_id",
    blob_column: "image",
    shared_row: false,
};
pub const MOVIES_FRONT_IMAGE: BlobTable = BlobTable {
    table: "movies_images",
    id_column: "movie_id",
    blob_column: "front_image",
    shared_row: true,
};
pub const MOVIES_BACK_IMAGE: BlobTable = BlobTable {
    table: "movies_images",
    id_column: "movie_id",
    blob_column: "back_image",
    shared_row: true,
};

impl BlobTable {
    /// `EXISTS` expression testing whether the owner in `owner_expr` has an image
    pub fn exists_expr(&self, owner_expr: &str) -> String {
        format!(
            "EXISTS (SELECT 1 FROM {table} WHERE {table}.{id_col} = {owner} AND {table}.{blob} IS NOT NULL)",
            table = self.table,
            id_col = self.id_column,
            owner = owner_expr,
            blob = self.blob_column
        )
    }
}

pub struct BlobRepository<'a> {
    conn: &'a Connection,
    table: BlobTable,
}

impl<'a> BlobRepository<'a> {
    pub fn new(conn: &'a Connection, table: BlobTable) -> Self {
        Self { conn, table }
    }

    /// The stored image, `None` if the owner has none
    pub fn get(&self, id: i64) -> AppResult<Option<Vec<u8>>> {
        let query = format!(
            "SELECT {} FROM {} WHERE {} = ?1 LIMIT 1",
            self.table.blob_column, self.table.table, self.table.id_column
        );
        read_txn(self.conn, |conn| {
            let blob: Option<Option<Vec<u8>>> = conn
                .query_row(&query, params![id], |row| row.get(0))
                .optional()?;
            Ok(blob.flatten())
        })
    }

    /// Store `data` as the owner's image, keeping other columns of the row
    pub fn replace(&self, id: i64, data: &[u8]) -> AppResult<()> {
        let stmt = format!(
            "INSERT INTO {table} ({id_col}, {blob}) VALUES (?1, ?2)
             ON CONFLICT({id_col}) DO UPDATE SET {blob} = excluded.{blob}",
            table = self.table.table,
            id_col = self.table.id_column,
            blob = self.table.blob_column
        );
        self.conn
            .execute(&stmt, params![id, Value::Blob(data.to_vec())])?;
        Ok(())
    }

    /// Remove the owner's row from the image table
    pub fn destroy(&self, id: i64) -> AppResult<()> {
        let stmt = if self.table.shared_row {
            format!(
                "UPDATE {} SET {} = NULL WHERE {} = ?1",
                self.table.table, self.table.blob_column, self.table.id_column
            )
        } else {
            format!(
                "DELETE FROM {} WHERE {} = ?1",
                self.table.table, self.table.id_column
            )
        };
        self.conn.execute(&stmt, params![id])?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::connection::create_test_connection;

    fn setup() -> Connection {
        let conn = create_test_connection().unwrap();
        conn.execute_batch(
            "CREATE TABLE movies_images (
                movie_id INTEGER PRIMARY KEY,
                front_image BLOB,
                back_image BLOB
             );",
        )
        .unwrap();
        conn
    }

    #[test]
    fn test_replace_and_get() {
        let conn = setup();
        let front = BlobRepository::new(&conn, MOVIES_FRONT_IMAGE);

        assert_eq!(front.get(1).unwrap(), None);
        front.replace(1, b"one").unwrap();
        front.replace(1, b"two").unwrap();
        assert_eq!(front.get(1).unwrap(), Some(b"two".to_vec()));
    }

    #[test]
    fn test_shared_row_columns_are_independent() {
        let conn = setup();
        let front = BlobRepository::new(&conn, MOVIES_FRONT_IMAGE);
        let back = BlobRepository::new(&conn, MOVIES_BACK_IMAGE);

        front.replace(1, b"front").unwrap();
        back.replace(1, b"back").unwrap();

        assert_eq!(front.get(1).unwrap(), Some(b"front".to_vec()));
        assert_eq!(back.get(1).unwrap(), Some(b"back".to_vec()));
        assert_eq!(BlobRepository::new(&conn, MOVIES_BACK_IMAGE).get(2).unwrap(), None);
    }

    #[test]
    fn test_destroy_shared_row_keeps_sibling() {
        let conn = setup();
        let front = BlobRepository::new(&conn, MOVIES_FRONT_IMAGE);
        let back = BlobRepository::new(&conn, MOVIES_BACK_IMAGE);
        front.replace(1, b"front").unwrap();
        back.replace(1, b"back").unwrap();

        front.destroy(1).unwrap();

        assert_eq!(front.get(1).unwrap(), None);
        assert_eq!(back.get(1).unwrap(), Some(b"back".to_vec()));
    }

    #[test]
    fn test_destroy() {
        let conn = setup();
        let front = BlobRepository::new(&conn, MOVIES_FRONT_IMAGE);
        front.replace(3, b"x").unwrap();
        front.destroy(3).unwrap();
        assert_eq!(front.get(3).unwrap(), None);
    }
}
