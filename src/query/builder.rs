// src/query/builder.rs
//
// Query builder: one SELECT, composed from accumulated fragments
//
// PRINCIPLES:
// - Accumulate, compose, execute; a builder lives for one query
// - WHERE arguments bind before HAVING arguments
// - Independent fragments are always AND-ed

use rusqlite::types::Value;

use crate::db::repository::{build_count_query, Repository};
use crate::error::AppResult;
use crate::query::filter::{Join, Joins, SqlClause};

pub struct QueryBuilder<'a> {
    repository: Repository<'a>,
    body: String,
    joins: Joins,
    where_clauses: Vec<SqlClause>,
    having_clauses: Vec<SqlClause>,
    sort_and_pagination: String,
}

impl<'a> QueryBuilder<'a> {
    pub fn new(repository: Repository<'a>, body: impl Into<String>) -> Self {
        Self {
            repository,
            body: body.into(),
            joins: Joins::default(),
            where_clauses: Vec::new(),
            having_clauses: Vec::new(),
            sort_and_pagination: String::new(),
        }
    }

    pub fn join(&mut self, table: &str, alias: &str, on_clause: &str) {
        self.joins.add(Join {
            table: table.to_string(),
            alias: alias.to_string(),
            on_clause: on_clause.to_string(),
        });
    }

    pub fn add_joins(&mut self, joins: Joins) {
        self.joins.extend(joins);
    }

    pub fn add_where(&mut self, clause: SqlClause) {
        if !clause.sql.is_empty() {
            self.where_clauses.push(clause);
        }
    }

    pub fn add_having(&mut self, clause: SqlClause) {
        if !clause.sql.is_empty() {
            self.having_clauses.push(clause);
        }
    }

    pub fn set_sort_and_pagination(&mut self, sort_and_pagination: impl Into<String>) {
        self.sort_and_pagination = sort_and_pagination.into();
    }

    /// Bound arguments in placeholder order
    pub fn args(&self) -> Vec<Value> {
        self.where_clauses
            .iter()
            .chain(self.having_clauses.iter())
            .flat_map(|c| c.args.iter().cloned())
            .collect()
    }

    /// The filtered query without sorting or pagination
    pub fn compose(&self) -> String {
        let mut sql = format!("{}{}", self.body, self.joins.to_sql());

        if !self.where_clauses.is_empty() {
            let clauses: Vec<&str> = self.where_clauses.iter().map(|c| c.sql.as_str()).collect();
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }

        sql.push_str(&format!(
            " GROUP BY {}.{} ",
            self.repository.table(),
            self.repository.id_column()
        ));

        if !self.having_clauses.is_empty() {
            let clauses: Vec<&str> = self.having_clauses.iter().map(|c| c.sql.as_str()).collect();
            sql.push_str("HAVING ");
            sql.push_str(&clauses.join(" AND "));
        }

        sql
    }

    /// Page of ids plus the total number of matches
    pub fn execute_find(&self) -> AppResult<(Vec<i64>, i64)> {
        let body = self.compose();
        let args = self.args();

        let count_query = build_count_query(&body);
        let ids_query = format!("{}{}", body, self.sort_and_pagination);

        log::debug!("find count: {} {:?}", count_query, args);
        let count = self.repository.run_count(&count_query, &args)?;

        log::debug!("find ids: {} {:?}", ids_query, args);
        let ids = self.repository.run_ids(&ids_query, &args)?;

        Ok((ids, count))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::connection::create_test_connection;
    use crate::db::repository::{select_distinct_ids, ID_COLUMN};
    use crate::query::filter::FilterBuilder;
    use rusqlite::Connection;

    fn setup() -> Connection {
        let conn = create_test_connection().unwrap();
        conn.execute_batch(
            "CREATE TABLE items (id INTEGER PRIMARY KEY, n INTEGER);
             CREATE TABLE items_tags (item_id INTEGER, tag_id INTEGER);",
        )
        .unwrap();
        for n in 1..=25 {
            conn.execute("INSERT INTO items (n) VALUES (?1)", [n]).unwrap();
        }
        conn
    }

    #[test]
    fn test_where_args_bind_before_having_args() {
        let conn = setup();
        let repo = Repository::new(&conn, "items", ID_COLUMN);
        let mut qb = QueryBuilder::new(repo, select_distinct_ids("items"));

        // added out of order on purpose
        qb.add_having(SqlClause::new("COUNT(*) = ?", vec![Value::Integer(1)]));
        qb.add_where(SqlClause::new("items.n > ?", vec![Value::Integer(20)]));

        assert_eq!(qb.args(), vec![Value::Integer(20), Value::Integer(1)]);
        assert_eq!(
            qb.compose(),
            "SELECT DISTINCT items.id FROM items WHERE items.n > ? GROUP BY items.id HAVING COUNT(*) = ?"
        );

        let (ids, count) = qb.execute_find().unwrap();
        assert_eq!(count, 5);
        assert_eq!(ids.len(), 5);
    }

    #[test]
    fn test_second_page_of_twenty_five() {
        let conn = setup();
        let repo = Repository::new(&conn, "items", ID_COLUMN);
        let mut qb = QueryBuilder::new(repo, select_distinct_ids("items"));
        qb.set_sort_and_pagination(" ORDER BY items.id ASC  LIMIT 10 OFFSET 10 ");

        let (ids, count) = qb.execute_find().unwrap();

        assert_eq!(count, 25);
        assert_eq!(ids, (11..=20).collect::<Vec<i64>>());
    }

    #[test]
    fn test_filter_builder_feeds_query() {
        let conn = setup();
        conn.execute_batch("INSERT INTO items_tags VALUES (1, 7), (2, 7), (2, 8);")
            .unwrap();
        let repo = Repository::new(&conn, "items", ID_COLUMN);
        let mut qb = QueryBuilder::new(repo, select_distinct_ids("items"));

        let mut f = FilterBuilder::new();
        f.add_join("items_tags", "tags_join", "tags_join.item_id = items.id");
        f.add_where("tags_join.tag_id IN (?, ?)", vec![Value::Integer(7), Value::Integer(8)]);
        f.add_having("COUNT(DISTINCT tags_join.tag_id) = ?", vec![Value::Integer(2)]);
        f.add_to_query_builder(&mut qb);

        let (ids, count) = qb.execute_find().unwrap();
        assert_eq!((ids, count), (vec![2], 1));
    }
}
