// src/db/join_repository.rs
//
// Many-to-many association tables
//
// A join table is keyed by an owning id column and a foreign id column.
// Replace is delete-all-then-insert-all for one owner; callers keep both
// halves inside one transaction.

use rusqlite::types::Value;
use rusqlite::{params, Connection};

use crate::db::fields::Field;
use crate::db::repository::Repository;
use crate::error::AppResult;
use crate::query::filter::FilterBuilder;

/// Static description of an association table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JoinTable {
    pub table: &'static str,
    /// Column holding the owning entity's id
    pub id_column: &'static str,
    /// Column holding the associated entity's id
    pub fk_column: &'static str,
}

impl JoinTable {
    pub const fn new(table: &'static str, id_column: &'static str, fk_column: &'static str) -> Self {
        Self {
            table,
            id_column,
            fk_column,
        }
    }

    /// The same table seen from the associated entity's side
    pub const fn reversed(self) -> Self {
        Self {
            table: self.table,
            id_column: self.fk_column,
            fk_column: self.id_column,
        }
    }

    /// Register a LEFT JOIN of this table under `alias`, matched on `owner_expr`
    pub fn join(&self, f: &mut FilterBuilder, alias: &str, owner_expr: &str) {
        f.add_join(
            self.table,
            alias,
            &format!("{}.{} = {}", alias, self.id_column, owner_expr),
        );
    }

    /// `(SELECT COUNT(*) ...)` of associations for the owner in `owner_expr`
    pub fn count_expr(&self, owner_expr: &str) -> String {
        format!(
            "(SELECT COUNT(*) FROM {table} WHERE {table}.{id_col} = {owner})",
            table = self.table,
            id_col = self.id_column,
            owner = owner_expr
        )
    }
}

pub const PERFORMERS_SCENES: JoinTable = JoinTable::new("performers_scenes", "scene_id", "performer_id");
pub const SCENES_TAGS: JoinTable = JoinTable::new("scenes_tags", "scene_id", "tag_id");
pub const SCENES_GALLERIES: JoinTable = JoinTable::new("scenes_galleries", "scene_id", "gallery_id");
pub const MOVIES_SCENES: JoinTable = JoinTable::new("movies_scenes", "scene_id", "movie_id");
pub const PERFORMERS_IMAGES: JoinTable = JoinTable::new("performers_images", "image_id", "performer_id");
pub const IMAGES_TAGS: JoinTable = JoinTable::new("images_tags", "image_id", "tag_id");
pub const GALLERIES_IMAGES: JoinTable = JoinTable::new("galleries_images", "image_id", "gallery_id");
pub const PERFORMERS_GALLERIES: JoinTable =
    JoinTable::new("performers_galleries", "gallery_id", "performer_id");
pub const GALLERIES_TAGS: JoinTable = JoinTable::new("galleries_tags", "gallery_id", "tag_id");

pub struct JoinRepository<'a> {
    repository: Repository<'a>,
    fk_column: &'static str,
}

impl<'a> JoinRepository<'a> {
    pub fn new(conn: &'a Connection, table: JoinTable) -> Self {
        Self {
            repository: Repository::new(conn, table.table, table.id_column),
            fk_column: table.fk_column,
        }
    }

    /// Associated ids in store order
    pub fn get_ids(&self, id: i64) -> AppResult<Vec<i64>> {
        let query = format!(
            "SELECT {fk} AS id FROM {table} WHERE {id_col} = ?",
            fk = self.fk_column,
            table = self.repository.table(),
            id_col = self.repository.id_column()
        );
        self.repository.run_ids(&query, &[Value::Integer(id)])
    }

    /// Make `fk_ids` the exact association set of `id`; duplicates are kept
    pub fn replace(&self, id: i64, fk_ids: &[i64]) -> AppResult<()> {
        self.repository.destroy(&[id])?;

        for fk in fk_ids {
            self.insert(id, *fk)?;
        }

        Ok(())
    }

    pub fn insert(&self, id: i64, fk_id: i64) -> AppResult<()> {
        self.repository.insert(&[
            Field::set(self.repository.id_column(), &id),
            Field::set(self.fk_column, &fk_id),
        ])?;
        Ok(())
    }

    /// Remove one association, if present
    pub fn remove(&self, id: i64, fk_id: i64) -> AppResult<()> {
        let stmt = format!(
            "DELETE FROM {} WHERE {} = ?1 AND {} = ?2",
            self.repository.table(),
            self.repository.id_column(),
            self.fk_column
        );
        self.repository.conn().execute(&stmt, params![id, fk_id])?;
        Ok(())
    }

    /// Remove every association of `id`
    pub fn destroy(&self, id: i64) -> AppResult<()> {
        self.repository.destroy(&[id])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::connection::create_test_connection;

    fn setup() -> Connection {
        let conn = create_test_connection().unwrap();
        conn.execute_batch("CREATE TABLE scenes_tags (scene_id INTEGER NOT NULL, tag_id INTEGER NOT NULL);")
            .unwrap();
        conn
    }

    #[test]
    fn test_replace_with_empty_clears() {
        let conn = setup();
        let repo = JoinRepository::new(&conn, SCENES_TAGS);

        repo.replace(1, &[2, 3]).unwrap();
        repo.replace(1, &[]).unwrap();

        assert!(repo.get_ids(1).unwrap().is_empty());
    }

    #[test]
    fn test_replace_keeps_duplicates() {
        let conn = setup();
        let repo = JoinRepository::new(&conn, SCENES_TAGS);

        repo.replace(1, &[5, 7, 5]).unwrap();

        let mut ids = repo.get_ids(1).unwrap();
        ids.sort();
        assert_eq!(ids, vec![5, 5, 7]);
    }

    #[test]
    fn test_replace_is_not_additive_and_scoped_to_owner() {
        let conn = setup();
        let repo = JoinRepository::new(&conn, SCENES_TAGS);

        repo.replace(1, &[1, 2]).unwrap();
        repo.replace(2, &[9]).unwrap();
        repo.replace(1, &[3]).unwrap();

        assert_eq!(repo.get_ids(1).unwrap(), vec![3]);
        assert_eq!(repo.get_ids(2).unwrap(), vec![9]);
    }

    #[test]
    fn test_reversed_reads_the_other_side() {
        let conn = setup();
        JoinRepository::new(&conn, SCENES_TAGS).replace(1, &[4]).unwrap();
        JoinRepository::new(&conn, SCENES_TAGS).replace(2, &[4]).unwrap();

        let mut scenes = JoinRepository::new(&conn, SCENES_TAGS.reversed())
            .get_ids(4)
            .unwrap();
        scenes.sort();
        assert_eq!(scenes, vec![1, 2]);
    }

    #[test]
    fn test_remove() {
        let conn = setup();
        let repo = JoinRepository::new(&conn, SCENES_TAGS);
        repo.replace(1, &[1, 2]).unwrap();
        repo.remove(1, 1).unwrap();
        assert_eq!(repo.get_ids(1).unwrap(), vec![2]);
    }

    #[test]
    fn test_join_registers_aliased_left_join() {
        let mut f = FilterBuilder::new();
        SCENES_TAGS.join(&mut f, "tags_join", "scenes.id");
        SCENES_TAGS.join(&mut f, "tags_join", "scenes.id");

        assert_eq!(
            f.joins_sql(),
            " LEFT JOIN scenes_tags AS tags_join ON tags_join.scene_id = scenes.id"
        );
    }

    #[test]
    fn test_count_expr() {
        assert_eq!(
            SCENES_TAGS.reversed().count_expr("tags.id"),
            "(SELECT COUNT(*) FROM scenes_tags WHERE scenes_tags.tag_id = tags.id)"
        );
    }
}
