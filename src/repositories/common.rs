// src/repositories/common.rs
//
// Operations every entity query builder shares
//
// RULES:
// - Writers stamp created_at/updated_at, readers never do
// - Records are validated before they reach the store
// - Hydration preserves the order of the requested ids

use chrono::Utc;
use rusqlite::params;
use rusqlite::types::Value;

use crate::db::fields::{Entity, Field, PartialEntity, ToValue};
use crate::db::join_repository::JoinTable;
use crate::db::repository::{build_count_query, select_all, Repository};
use crate::db::transaction::read_txn;
use crate::error::{AppError, AppResult};

pub const CREATED_AT: &str = "created_at";
pub const UPDATED_AT: &str = "updated_at";

/// Overwrite (or add) timestamp columns with the current time
fn stamp(fields: &mut Vec<Field>, columns: &[&'static str]) {
    let now = Utc::now().to_value();
    for column in columns {
        match fields.iter_mut().find(|f| f.column == *column) {
            Some(field) => field.value = Some(now.clone()),
            None => fields.push(Field {
                column: *column,
                value: Some(now.clone()),
            }),
        }
    }
}

pub trait EntityQueryBuilder<'a> {
    type Record: Entity;
    type Partial: PartialEntity;

    fn repository(&self) -> Repository<'a>;

    fn validate(&self, _record: &Self::Record) -> AppResult<()> {
        Ok(())
    }

    fn validate_partial(&self, _partial: &Self::Partial) -> AppResult<()> {
        Ok(())
    }

    /// Insert and return the record as stored
    fn create(&self, record: &Self::Record) -> AppResult<Self::Record> {
        self.validate(record)?;

        let repository = self.repository();
        let mut fields = record.fields();
        stamp(&mut fields, &[CREATED_AT, UPDATED_AT]);

        let id = repository.insert(&fields)?;
        self.get(id)
    }

    /// Write only the fields present in `partial`
    fn update(&self, partial: &Self::Partial) -> AppResult<Self::Record> {
        self.validate_partial(partial)?;

        let mut fields = partial.fields();
        stamp(&mut fields, &[UPDATED_AT]);

        self.repository().update(partial.id(), &fields, true)?;
        self.get(partial.id())
    }

    /// Write every persisted field of `record`
    fn update_full(&self, record: &Self::Record) -> AppResult<Self::Record> {
        self.validate(record)?;

        let mut fields = record.fields();
        stamp(&mut fields, &[UPDATED_AT]);

        self.repository().update(record.id(), &fields, false)?;
        self.get(record.id())
    }

    fn destroy(&self, id: i64) -> AppResult<()> {
        self.repository().destroy_existing(&[id])
    }

    fn find(&self, id: i64) -> AppResult<Option<Self::Record>> {
        self.repository().get(id)
    }

    /// Like `find`, but a missing row is NotFound
    fn get(&self, id: i64) -> AppResult<Self::Record> {
        let repository = self.repository();
        repository
            .get(id)?
            .ok_or_else(|| AppError::not_found(repository.table(), repository.id_column(), id))
    }

    /// Records in the order of `ids`
    fn find_many(&self, ids: &[i64]) -> AppResult<Vec<Self::Record>> {
        ids.iter().map(|id| self.get(*id)).collect()
    }

    fn all(&self) -> AppResult<Vec<Self::Record>> {
        let repository = self.repository();
        let query = format!(
            "{}ORDER BY {}.id ASC",
            select_all(repository.table()),
            repository.table()
        );
        repository.query(&query, &[])
    }

    fn count(&self) -> AppResult<i64> {
        let repository = self.repository();
        let query = format!("SELECT {}.id FROM {}", repository.table(), repository.table());
        repository.run_count(&build_count_query(&query), &[])
    }
}

// ============================================================================
// SHARED SQL
// ============================================================================

/// Rows of `table` associated with one foreign id through `join`
///
/// `join.id_column` must reference `table`.
pub(crate) fn select_by_relation(table: &str, join: JoinTable) -> String {
    format!(
        "SELECT {table}.* FROM {table} \
         LEFT JOIN {jt} AS relation ON relation.{id_col} = {table}.id \
         WHERE relation.{fk} = ? GROUP BY {table}.id ORDER BY {table}.id ASC",
        table = table,
        jt = join.table,
        id_col = join.id_column,
        fk = join.fk_column
    )
}

/// Number of distinct owners associated with `fk_id`
pub(crate) fn count_by_relation(repository: Repository<'_>, join: JoinTable, fk_id: i64) -> AppResult<i64> {
    let query = format!(
        "SELECT DISTINCT {id_col} FROM {table} WHERE {fk} = ?",
        id_col = join.id_column,
        table = join.table,
        fk = join.fk_column
    );
    repository.run_count(&build_count_query(&query), &[Value::Integer(fk_id)])
}

/// Null, empty or whitespace-only text
pub(crate) fn blank_text(column: &str) -> String {
    format!("({0} IS NULL OR TRIM({0}) = '')", column)
}

/// Null, empty or zero date
pub(crate) fn blank_date(column: &str) -> String {
    format!("({0} IS NULL OR {0} = '' OR {0} = '0001-01-01')", column)
}

pub(crate) fn unknown_missing_key(table: &str, key: &str) {
    log::warn!("Ignoring unknown is_missing value '{}' for {}", key, table);
}

/// Set counter `column` of row `id` to `expr` and return the new value
pub(crate) fn adjust_counter(
    repository: Repository<'_>,
    id: i64,
    column: &str,
    expr: &str,
) -> AppResult<i64> {
    if !repository.exists(id)? {
        return Err(AppError::not_found(repository.table(), repository.id_column(), id));
    }

    let update = format!(
        "UPDATE {table} SET {col} = {expr} WHERE id = ?1",
        table = repository.table(),
        col = column,
        expr = expr
    );
    repository.conn().execute(&update, params![id])?;

    let select = format!("SELECT {} FROM {} WHERE id = ?1", column, repository.table());
    read_txn(repository.conn(), |conn| {
        Ok(conn.query_row(&select, params![id], |row| row.get(0))?)
    })
}

/// Everything a store round trip of one entity type needs in tests
#[cfg(test)]
pub(crate) mod fixtures {
    use rusqlite::Connection;

    use crate::db::connection::create_test_connection;
    use crate::db::migrations::initialize_database;

    pub fn test_db() -> Connection {
        let conn = create_test_connection().unwrap();
        initialize_database(&conn).unwrap();
        conn
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stamp_overwrites_and_appends() {
        let mut fields = vec![
            Field::set("name", "x"),
            Field::set(CREATED_AT, "old"),
        ];
        stamp(&mut fields, &[CREATED_AT, UPDATED_AT]);

        assert_eq!(fields.len(), 3);
        assert_ne!(fields[1].value, Some("old".to_value()));
        assert_eq!(fields[2].column, UPDATED_AT);
    }

    #[test]
    fn test_select_by_relation() {
        use crate::db::join_repository::SCENES_GALLERIES;

        assert_eq!(
            select_by_relation("galleries", SCENES_GALLERIES.reversed()),
            "SELECT galleries.* FROM galleries \
             LEFT JOIN scenes_galleries AS relation ON relation.gallery_id = galleries.id \
             WHERE relation.scene_id = ? GROUP BY galleries.id ORDER BY galleries.id ASC"
        );
    }
}
