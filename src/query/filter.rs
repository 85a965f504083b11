// src/query/filter.rs
//
// Filter builder: collects the joins and clauses criterion handlers emit
//
// Each clause carries its own bound arguments, so WHERE and HAVING
// arguments can never drift out of order relative to their placeholders.

use rusqlite::types::Value;

use crate::query::builder::QueryBuilder;

/// A SQL fragment and the arguments bound to its placeholders, in order
#[derive(Debug, Clone, PartialEq)]
pub struct SqlClause {
    pub sql: String,
    pub args: Vec<Value>,
}

impl SqlClause {
    pub fn new(sql: impl Into<String>, args: Vec<Value>) -> Self {
        Self {
            sql: sql.into(),
            args,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Join {
    pub table: String,
    pub alias: String,
    pub on_clause: String,
}

impl Join {
    fn key(&self) -> &str {
        if self.alias.is_empty() {
            &self.table
        } else {
            &self.alias
        }
    }

    fn to_sql(&self) -> String {
        if self.alias.is_empty() {
            format!(" LEFT JOIN {} ON {}", self.table, self.on_clause)
        } else {
            format!(
                " LEFT JOIN {} AS {} ON {}",
                self.table, self.alias, self.on_clause
            )
        }
    }
}

/// Joins deduplicated by alias (or table name when unaliased)
#[derive(Debug, Clone, Default)]
pub struct Joins(Vec<Join>);

impl Joins {
    pub fn add(&mut self, join: Join) {
        if !self.0.iter().any(|j| j.key() == join.key()) {
            self.0.push(join);
        }
    }

    pub fn extend(&mut self, other: Joins) {
        for join in other.0 {
            self.add(join);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn to_sql(&self) -> String {
        self.0.iter().map(Join::to_sql).collect()
    }
}

/// Receives builder mutations from one criterion
pub trait CriterionHandler {
    fn handle(&self, f: &mut FilterBuilder);
}

impl<F> CriterionHandler for F
where
    F: Fn(&mut FilterBuilder),
{
    fn handle(&self, f: &mut FilterBuilder) {
        self(f)
    }
}

#[derive(Debug, Default)]
pub struct FilterBuilder {
    joins: Joins,
    where_clauses: Vec<SqlClause>,
    having_clauses: Vec<SqlClause>,
}

impl FilterBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_join(&mut self, table: &str, alias: &str, on_clause: &str) {
        self.joins.add(Join {
            table: table.to_string(),
            alias: alias.to_string(),
            on_clause: on_clause.to_string(),
        });
    }

    /// Add a WHERE fragment; empty fragments are ignored
    pub fn add_where(&mut self, sql: impl Into<String>, args: Vec<Value>) {
        let sql = sql.into();
        if !sql.is_empty() {
            self.where_clauses.push(SqlClause::new(sql, args));
        }
    }

    /// Add a HAVING fragment; empty fragments are ignored
    pub fn add_having(&mut self, sql: impl Into<String>, args: Vec<Value>) {
        let sql = sql.into();
        if !sql.is_empty() {
            self.having_clauses.push(SqlClause::new(sql, args));
        }
    }

    pub fn handle_criterion<H: CriterionHandler>(&mut self, handler: H) {
        handler.handle(self);
    }

    pub fn joins_sql(&self) -> String {
        self.joins.to_sql()
    }

    pub fn where_clauses(&self) -> &[SqlClause] {
        &self.where_clauses
    }

    pub fn having_clauses(&self) -> &[SqlClause] {
        &self.having_clauses
    }

    /// Move everything collected so far into `query`
    pub fn add_to_query_builder(self, query: &mut QueryBuilder<'_>) {
        query.add_joins(self.joins);
        for clause in self.where_clauses {
            query.add_where(clause);
        }
        for clause in self.having_clauses {
            query.add_having(clause);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_clauses_are_ignored() {
        let mut f = FilterBuilder::new();
        f.add_where("", vec![Value::Integer(1)]);
        f.add_having("", vec![]);
        assert!(f.where_clauses().is_empty());
        assert!(f.having_clauses().is_empty());
    }

    #[test]
    fn test_joins_dedup_by_alias_then_table() {
        let mut f = FilterBuilder::new();
        f.add_join("scene_markers", "", "scene_markers.scene_id = scenes.id");
        f.add_join("scene_markers", "", "scene_markers.scene_id = scenes.id");
        f.add_join("scenes_tags", "tags_join", "tags_join.scene_id = scenes.id");
        f.add_join("scenes_tags", "other_join", "other_join.scene_id = scenes.id");

        assert_eq!(
            f.joins_sql(),
            " LEFT JOIN scene_markers ON scene_markers.scene_id = scenes.id \
LEFT JOIN scenes_tags AS tags_join ON tags_join.scene_id = scenes.id \
LEFT JOIN scenes_tags AS other_join ON other_join.scene_id = scenes.id"
        );
    }

    #[test]
    fn test_closure_handlers() {
        let mut f = FilterBuilder::new();
        f.handle_criterion(|f: &mut FilterBuilder| f.add_where("a = ?", vec![Value::Integer(1)]));
        assert_eq!(f.where_clauses().len(), 1);
    }
}
