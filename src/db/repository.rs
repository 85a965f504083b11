// src/db/repository.rs
//
// Generic single-table repository
//
// RULES:
// - One table, one id column
// - Borrows the connection (usually a transaction) from its caller
// - Explicit, parameterized SQL only; table and column names are static
// - Store errors propagate unchanged, except "no rows" on a single-row get

use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection};

use crate::db::fields::{Entity, Field};
use crate::db::transaction::read_txn;
use crate::error::{AppError, AppResult};

pub const ID_COLUMN: &str = "id";

#[derive(Clone, Copy)]
pub struct Repository<'a> {
    conn: &'a Connection,
    table: &'static str,
    id_column: &'static str,
}

impl<'a> Repository<'a> {
    pub fn new(conn: &'a Connection, table: &'static str, id_column: &'static str) -> Self {
        Self {
            conn,
            table,
            id_column,
        }
    }

    pub fn conn(&self) -> &'a Connection {
        self.conn
    }

    pub fn table(&self) -> &'static str {
        self.table
    }

    pub fn id_column(&self) -> &'static str {
        self.id_column
    }

    /// Fetch one row by id; `None` if there is no such row
    pub fn get<T: Entity>(&self, id: i64) -> AppResult<Option<T>> {
        let stmt = format!(
            "SELECT * FROM {} WHERE {} = ?1 LIMIT 1",
            self.table, self.id_column
        );

        read_txn(self.conn, |conn| {
            match conn.query_row(&stmt, params![id], T::from_row) {
                Ok(record) => Ok(Some(record)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e.into()),
            }
        })
    }

    /// Insert the present fields and return the generated id
    pub fn insert(&self, fields: &[Field]) -> AppResult<i64> {
        let present: Vec<&Field> = fields.iter().filter(|f| f.is_present()).collect();

        let stmt = if present.is_empty() {
            format!("INSERT INTO {} DEFAULT VALUES", self.table)
        } else {
            let columns: Vec<&str> = present.iter().map(|f| f.column).collect();
            let placeholders: Vec<String> =
                (1..=present.len()).map(|i| format!("?{}", i)).collect();
            format!(
                "INSERT INTO {} ({}) VALUES ({})",
                self.table,
                columns.join(", "),
                placeholders.join(", ")
            )
        };

        let args = present.iter().filter_map(|f| f.value.as_ref());
        self.conn.execute(&stmt, params_from_iter(args))?;

        Ok(self.conn.last_insert_rowid())
    }

    /// Insert a record and read it back as stored
    pub fn insert_and_fetch<T: Entity>(&self, record: &T) -> AppResult<T> {
        let id = self.insert(&record.fields())?;
        self.get(id)?
            .ok_or_else(|| AppError::not_found(self.table, self.id_column, id))
    }

    /// Update the row with `id`
    ///
    /// In partial mode only present fields are written. Otherwise every
    /// field is written, absent ones as NULL.
    pub fn update(&self, id: i64, fields: &[Field], partial: bool) -> AppResult<()> {
        self.ensure_exists(id)?;

        let assignments: Vec<(&'static str, Value)> = fields
            .iter()
            .filter(|f| !partial || f.is_present())
            .map(|f| (f.column, f.value.clone().unwrap_or(Value::Null)))
            .collect();

        self.execute_update(id, &assignments)
    }

    /// Update arbitrary columns of the row with `id`
    pub fn update_raw(&self, id: i64, values: &[(&'static str, Value)]) -> AppResult<()> {
        self.ensure_exists(id)?;
        self.execute_update(id, values)
    }

    fn execute_update(&self, id: i64, values: &[(&'static str, Value)]) -> AppResult<()> {
        if values.is_empty() {
            return Ok(());
        }

        let set: Vec<String> = values
            .iter()
            .enumerate()
            .map(|(i, (column, _))| format!("{} = ?{}", column, i + 1))
            .collect();
        let stmt = format!(
            "UPDATE {table} SET {set} WHERE {table}.{id_col} = ?{n}",
            table = self.table,
            set = set.join(", "),
            id_col = self.id_column,
            n = values.len() + 1
        );

        let args: Vec<Value> = values
            .iter()
            .map(|(_, v)| v.clone())
            .chain(std::iter::once(Value::Integer(id)))
            .collect();
        self.conn.execute(&stmt, params_from_iter(args))?;

        Ok(())
    }

    /// Delete every row whose id column matches one of `ids`
    pub fn destroy(&self, ids: &[i64]) -> AppResult<()> {
        let stmt = format!("DELETE FROM {} WHERE {} = ?1", self.table, self.id_column);
        for id in ids {
            self.conn.execute(&stmt, params![id])?;
        }
        Ok(())
    }

    /// Delete `ids`, failing before any delete if one of them is missing
    pub fn destroy_existing(&self, ids: &[i64]) -> AppResult<()> {
        for id in ids {
            self.ensure_exists(*id)?;
        }
        self.destroy(ids)
    }

    pub fn exists(&self, id: i64) -> AppResult<bool> {
        let stmt = format!(
            "SELECT {id_col} FROM {table} WHERE {id_col} = ? LIMIT 1",
            id_col = self.id_column,
            table = self.table
        );
        let count = self.run_count(&build_count_query(&stmt), &[Value::Integer(id)])?;
        Ok(count == 1)
    }

    fn ensure_exists(&self, id: i64) -> AppResult<()> {
        if !self.exists(id)? {
            return Err(AppError::not_found(self.table, self.id_column, id));
        }
        Ok(())
    }

    pub fn run_count(&self, query: &str, args: &[Value]) -> AppResult<i64> {
        read_txn(self.conn, |conn| {
            match conn.query_row(query, params_from_iter(args), |row| row.get(0)) {
                Ok(count) => Ok(count),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(0),
                Err(e) => Err(e.into()),
            }
        })
    }

    pub fn run_sum(&self, query: &str, args: &[Value]) -> AppResult<f64> {
        read_txn(self.conn, |conn| {
            let sum: Option<f64> =
                conn.query_row(query, params_from_iter(args), |row| row.get(0))?;
            Ok(sum.unwrap_or(0.0))
        })
    }

    /// Run a query whose first column is an id
    pub fn run_ids(&self, query: &str, args: &[Value]) -> AppResult<Vec<i64>> {
        read_txn(self.conn, |conn| {
            let mut stmt = conn.prepare(query)?;
            let ids = stmt
                .query_map(params_from_iter(args), |row| row.get(0))?
                .collect::<Result<Vec<i64>, _>>()?;
            Ok(ids)
        })
    }

    /// Run a query returning whole rows of this table
    pub fn query<T: Entity>(&self, query: &str, args: &[Value]) -> AppResult<Vec<T>> {
        read_txn(self.conn, |conn| {
            let mut stmt = conn.prepare(query)?;
            let records = stmt
                .query_map(params_from_iter(args), T::from_row)?
                .collect::<Result<Vec<T>, _>>()?;
            Ok(records)
        })
    }

    /// Run a query expected to return at most one row
    pub fn query_one<T: Entity>(&self, query: &str, args: &[Value]) -> AppResult<Option<T>> {
        Ok(self.query(query, args)?.into_iter().next())
    }
}

/// Wrap `query` so that it returns its row count
pub fn build_count_query(query: &str) -> String {
    format!("SELECT COUNT(*) AS count FROM ({}) AS temp", query)
}

/// `SELECT * FROM table ` prefix
pub fn select_all(table: &str) -> String {
    format!("SELECT * FROM {} ", table)
}

/// `SELECT DISTINCT table.id FROM table` prefix
pub fn select_distinct_ids(table: &str) -> String {
    format!("SELECT DISTINCT {table}.id FROM {table}", table = table)
}

/// `(?, ?, ?)` for `n` values
pub fn in_binding(n: usize) -> String {
    format!("({})", vec!["?"; n].join(", "))
}
