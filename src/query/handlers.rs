// src/query/handlers.rs
//
// Criterion handlers
//
// Each handler turns one criterion plus a column (or relationship)
// descriptor into builder mutations. Unconstrained criteria add nothing.

use rusqlite::types::Value;

use crate::db::join_repository::JoinTable;
use crate::db::repository::in_binding;
use crate::query::criterion::{check_regex, IntCriterion, MultiCriterion, Resolution, StringCriterion};
use crate::query::filter::{FilterBuilder, SqlClause};

fn text(value: &str) -> Value {
    Value::Text(value.to_string())
}

fn ids_args(ids: &[i64]) -> Vec<Value> {
    ids.iter().map(|id| Value::Integer(*id)).collect()
}

/// Substring search across `columns`
///
/// The term is split on spaces and every word is matched against every
/// column; a term wrapped in double quotes is matched as one phrase.
/// Includes OR-combines the matches, Excludes (`not`) AND-combines
/// their negations.
pub fn search_clause(columns: &[&str], q: &str, not: bool) -> SqlClause {
    let phrase = q
        .strip_prefix('"')
        .and_then(|rest| rest.strip_suffix('"'));
    let words: Vec<&str> = if let Some(phrase) = phrase {
        vec![phrase]
    } else {
        q.split(' ').filter(|w| !w.is_empty()).collect()
    };

    let mut likes = Vec::new();
    let mut args = Vec::new();
    for word in words {
        for column in columns {
            if not {
                likes.push(format!("({0} IS NULL OR {0} NOT LIKE ?)", column));
            } else {
                likes.push(format!("{} LIKE ?", column));
            }
            args.push(text(&format!("%{}%", word)));
        }
    }

    if likes.is_empty() {
        return SqlClause::new("", Vec::new());
    }

    let joiner = if not { " AND " } else { " OR " };
    SqlClause::new(format!("({})", likes.join(joiner)), args)
}

pub fn string_criterion_handler<'a>(
    criterion: &'a StringCriterion,
    column: &'a str,
) -> impl Fn(&mut FilterBuilder) + 'a {
    move |f: &mut FilterBuilder| match criterion {
        StringCriterion::Unconstrained => {}
        StringCriterion::Equals(v) => f.add_where(format!("{} LIKE ?", column), vec![text(v)]),
        StringCriterion::NotEquals(v) => {
            f.add_where(format!("{} NOT LIKE ?", column), vec![text(v)])
        }
        StringCriterion::Includes(v) => {
            let clause = search_clause(&[column], v, false);
            f.add_where(clause.sql, clause.args);
        }
        StringCriterion::Excludes(v) => {
            let clause = search_clause(&[column], v, true);
            f.add_where(clause.sql, clause.args);
        }
        StringCriterion::MatchesRegex(v) => {
            if regex_usable(v) {
                f.add_where(format!("{} REGEXP ?", column), vec![text(v)]);
            }
        }
        StringCriterion::NotMatchesRegex(v) => {
            if regex_usable(v) {
                f.add_where(
                    format!("({0} IS NULL OR {0} NOT REGEXP ?)", column),
                    vec![text(v)],
                );
            }
        }
        StringCriterion::IsNull => {
            f.add_where(format!("({0} IS NULL OR TRIM({0}) = '')", column), Vec::new())
        }
        StringCriterion::NotNull => {
            f.add_where(format!("({0} IS NOT NULL AND TRIM({0}) != '')", column), Vec::new())
        }
    }
}

fn regex_usable(pattern: &str) -> bool {
    match check_regex(pattern) {
        Ok(()) => true,
        Err(e) => {
            log::warn!("Dropping regex criterion: {}", e);
            false
        }
    }
}

/// WHERE clause for an int criterion against `column`
pub fn int_clause(criterion: &IntCriterion, column: &str) -> Option<SqlClause> {
    let clause = match *criterion {
        IntCriterion::Unconstrained => return None,
        IntCriterion::Equals(v) => SqlClause::new(format!("{} = ?", column), vec![Value::Integer(v)]),
        IntCriterion::NotEquals(v) => {
            SqlClause::new(format!("{} != ?", column), vec![Value::Integer(v)])
        }
        IntCriterion::GreaterThan(v) => {
            SqlClause::new(format!("{} > ?", column), vec![Value::Integer(v)])
        }
        IntCriterion::LessThan(v) => {
            SqlClause::new(format!("{} < ?", column), vec![Value::Integer(v)])
        }
        IntCriterion::IsNull => SqlClause::new(format!("{} IS NULL", column), Vec::new()),
        IntCriterion::NotNull => SqlClause::new(format!("{} IS NOT NULL", column), Vec::new()),
    };
    Some(clause)
}

pub fn int_criterion_handler<'a>(
    criterion: &'a IntCriterion,
    column: &'a str,
) -> impl Fn(&mut FilterBuilder) + 'a {
    move |f: &mut FilterBuilder| {
        if let Some(clause) = int_clause(criterion, column) {
            f.add_where(clause.sql, clause.args);
        }
    }
}

/// Int criterion over a computed count, e.g. a correlated subquery
pub fn count_criterion_handler<'a>(
    criterion: &'a IntCriterion,
    count_expr: String,
) -> impl Fn(&mut FilterBuilder) + 'a {
    move |f: &mut FilterBuilder| {
        if let Some(clause) = int_clause(criterion, &count_expr) {
            f.add_where(clause.sql, clause.args);
        }
    }
}

pub fn bool_criterion_handler<'a>(
    value: Option<bool>,
    column: &'a str,
) -> impl Fn(&mut FilterBuilder) + 'a {
    move |f: &mut FilterBuilder| {
        if let Some(v) = value {
            f.add_where(format!("{} = ?", column), vec![Value::Integer(i64::from(v))]);
        }
    }
}

/// Durations are stored as fractional seconds but filtered as whole ones:
/// Equals `v` matches `v <= d < v + 1`, NotEquals is its complement.
pub fn duration_criterion_handler<'a>(
    criterion: &'a IntCriterion,
    column: &'a str,
) -> impl Fn(&mut FilterBuilder) + 'a {
    move |f: &mut FilterBuilder| match *criterion {
        IntCriterion::Equals(v) => match v.checked_add(1) {
            Some(next) => f.add_where(
                format!("{0} >= ? AND {0} < ?", column),
                vec![Value::Integer(v), Value::Integer(next)],
            ),
            None => f.add_where(format!("{} >= ?", column), vec![Value::Integer(v)]),
        },
        IntCriterion::NotEquals(v) => match v.checked_add(1) {
            Some(next) => f.add_where(
                format!("({0} < ? OR {0} >= ?)", column),
                vec![Value::Integer(v), Value::Integer(next)],
            ),
            None => f.add_where(format!("{} < ?", column), vec![Value::Integer(v)]),
        },
        _ => {
            if let Some(clause) = int_clause(criterion, column) {
                f.add_where(clause.sql, clause.args);
            }
        }
    }
}

pub fn resolution_criterion_handler<'a>(
    resolution: Option<Resolution>,
    height_column: &'a str,
    width_column: &'a str,
) -> impl Fn(&mut FilterBuilder) + 'a {
    move |f: &mut FilterBuilder| {
        if let Some(r) = resolution {
            let shorter = format!("MIN({}, {})", width_column, height_column);
            f.add_where(format!("{} >= ?", shorter), vec![Value::Integer(r.min())]);
            if let Some(max) = r.max() {
                f.add_where(format!("{} < ?", shorter), vec![Value::Integer(max)]);
            }
        }
    }
}

/// Exact match against a literal value; blank values add nothing
pub fn string_literal_criterion_handler<'a>(
    value: Option<&'a str>,
    column: &'a str,
) -> impl Fn(&mut FilterBuilder) + 'a {
    move |f: &mut FilterBuilder| {
        if let Some(v) = value.filter(|v| !v.is_empty()) {
            f.add_where(format!("{} = ?", column), vec![text(v)]);
        }
    }
}

/// Where a multi-valued criterion finds its foreign ids
#[derive(Debug, Clone)]
pub enum MultiTarget<'a> {
    /// An association table joined on the owner's id
    Relation {
        join: JoinTable,
        alias: &'a str,
        owner_expr: &'a str,
    },
    /// A nullable foreign key column on the owner's own row
    ForeignKey { column: &'a str },
}

impl MultiTarget<'_> {
    fn foreign_expr(&self) -> String {
        match self {
            MultiTarget::Relation { join, alias, .. } => format!("{}.{}", alias, join.fk_column),
            MultiTarget::ForeignKey { column } => column.to_string(),
        }
    }

    /// Predicate true when the owner has no association inside `ids`,
    /// or with `outside` set, none outside them
    fn anti_clause(&self, ids: &[i64], outside: bool) -> String {
        let op = if outside { "NOT IN" } else { "IN" };
        match self {
            MultiTarget::Relation {
                join, owner_expr, ..
            } => format!(
                "NOT EXISTS (SELECT 1 FROM {table} AS anti WHERE anti.{id_col} = {owner} AND anti.{fk} {op} {binding})",
                table = join.table,
                id_col = join.id_column,
                owner = owner_expr,
                fk = join.fk_column,
                op = op,
                binding = in_binding(ids.len())
            ),
            MultiTarget::ForeignKey { column } => {
                if outside {
                    format!("({0} IS NULL OR {0} IN {1})", column, in_binding(ids.len()))
                } else {
                    format!("({0} IS NULL OR {0} NOT IN {1})", column, in_binding(ids.len()))
                }
            }
        }
    }
}

/// Ids are de-duplicated before they are bound or counted.
///
/// IncludesAny: foreign id IN set.
/// IncludesAll: the same plus `HAVING COUNT(DISTINCT fk) = n`.
/// Excludes: no association inside the set (anti-join).
/// Equals: IncludesAll plus no association outside the set.
pub fn multi_criterion_handler<'a>(
    criterion: &'a MultiCriterion,
    target: MultiTarget<'a>,
) -> impl Fn(&mut FilterBuilder) + 'a {
    move |f: &mut FilterBuilder| {
        let mut ids: Vec<i64> = Vec::with_capacity(criterion.ids().len());
        for id in criterion.ids() {
            if !ids.contains(id) {
                ids.push(*id);
            }
        }
        let ids = ids.as_slice();
        if ids.is_empty() {
            return;
        }

        let include_all = |f: &mut FilterBuilder| {
            add_includes(f, &target, ids);
            f.add_having(
                format!("COUNT(DISTINCT {}) = ?", target.foreign_expr()),
                vec![Value::Integer(ids.len() as i64)],
            );
        };

        match criterion {
            MultiCriterion::Unconstrained => {}
            MultiCriterion::IncludesAny(_) => add_includes(f, &target, ids),
            MultiCriterion::IncludesAll(_) => include_all(f),
            MultiCriterion::Excludes(_) => {
                f.add_where(target.anti_clause(ids, false), ids_args(ids));
            }
            MultiCriterion::Equals(_) => {
                f.add_where(target.anti_clause(ids, true), ids_args(ids));
                include_all(f);
            }
        }
    }
}

fn add_includes(f: &mut FilterBuilder, target: &MultiTarget<'_>, ids: &[i64]) {
    if let MultiTarget::Relation {
        join,
        alias,
        owner_expr,
    } = target
    {
        join.join(f, alias, owner_expr);
    }
    f.add_where(
        format!("{} IN {}", target.foreign_expr(), in_binding(ids.len())),
        ids_args(ids),
    );
}

/// Owner has no row in `join`
pub fn missing_relation_handler<'a>(
    join: JoinTable,
    alias: &'a str,
    owner_expr: &'a str,
) -> impl Fn(&mut FilterBuilder) + 'a {
    move |f: &mut FilterBuilder| {
        join.join(f, alias, owner_expr);
        f.add_where(format!("{}.{} IS NULL", alias, join.id_column), Vec::new());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::join_repository::SCENES_TAGS;

    #[test]
    fn test_search_clause_one_arg_per_column() {
        let clause = search_clause(&["scenes.title", "scenes.details"], "foo", false);
        assert_eq!(clause.sql, "(scenes.title LIKE ? OR scenes.details LIKE ?)");
        assert_eq!(clause.args, vec![text("%foo%"), text("%foo%")]);
    }

    #[test]
    fn test_search_clause_words_and_phrases() {
        let clause = search_clause(&["t"], "a b", false);
        assert_eq!(clause.args.len(), 2);

        let clause = search_clause(&["t"], "\"a b\"", false);
        assert_eq!(clause.args, vec![text("%a b%")]);
    }

    #[test]
    fn test_unbalanced_quote_is_not_a_phrase() {
        let clause = search_clause(&["t"], "\"foo bar", false);
        assert_eq!(clause.args, vec![text("%\"foo%"), text("%bar%")]);

        let clause = search_clause(&["t"], "\"", false);
        assert_eq!(clause.args, vec![text("%\"%")]);
    }

    #[test]
    fn test_excludes_is_null_safe() {
        let clause = search_clause(&["t"], "x", true);
        assert_eq!(clause.sql, "((t IS NULL OR t NOT LIKE ?))");
    }

    #[test]
    fn test_invalid_regex_is_dropped() {
        let criterion = StringCriterion::MatchesRegex("(".to_string());
        let mut f = FilterBuilder::new();
        f.handle_criterion(string_criterion_handler(&criterion, "scenes.path"));
        assert!(f.where_clauses().is_empty());
    }

    #[test]
    fn test_duration_equals_is_a_one_second_window() {
        let criterion = IntCriterion::Equals(120);
        let mut f = FilterBuilder::new();
        f.handle_criterion(duration_criterion_handler(&criterion, "scenes.duration"));

        let clause = &f.where_clauses()[0];
        assert_eq!(clause.sql, "scenes.duration >= ? AND scenes.duration < ?");
        assert_eq!(clause.args, vec![Value::Integer(120), Value::Integer(121)]);
    }

    #[test]
    fn test_duration_window_at_max_value() {
        let equals = IntCriterion::Equals(i64::MAX);
        let not_equals = IntCriterion::NotEquals(i64::MAX);
        let mut f = FilterBuilder::new();
        f.handle_criterion(duration_criterion_handler(&equals, "d"));
        f.handle_criterion(duration_criterion_handler(&not_equals, "d"));

        assert_eq!(
            f.where_clauses()[0],
            SqlClause::new("d >= ?", vec![Value::Integer(i64::MAX)])
        );
        assert_eq!(
            f.where_clauses()[1],
            SqlClause::new("d < ?", vec![Value::Integer(i64::MAX)])
        );
    }

    #[test]
    fn test_duplicate_ids_are_counted_once() {
        let criterion = MultiCriterion::IncludesAll(vec![4, 4, 7, 4]);
        let mut f = FilterBuilder::new();
        f.handle_criterion(multi_criterion_handler(
            &criterion,
            MultiTarget::ForeignKey { column: "scenes.studio_id" },
        ));

        assert_eq!(f.where_clauses()[0].sql, "scenes.studio_id IN (?, ?)");
        assert_eq!(f.having_clauses()[0].args, vec![Value::Integer(2)]);
    }

    #[test]
    fn test_includes_all_binds_count_as_having_arg() {
        let criterion = MultiCriterion::IncludesAll(vec![1, 2]);
        let mut f = FilterBuilder::new();
        f.handle_criterion(multi_criterion_handler(
            &criterion,
            MultiTarget::Relation {
                join: SCENES_TAGS,
                alias: "tags_join",
                owner_expr: "scenes.id",
            },
        ));

        assert_eq!(f.where_clauses()[0].sql, "tags_join.tag_id IN (?, ?)");
        assert_eq!(
            f.having_clauses()[0],
            SqlClause::new("COUNT(DISTINCT tags_join.tag_id) = ?", vec![Value::Integer(2)])
        );
    }

    #[test]
    fn test_unconstrained_adds_nothing() {
        let mut f = FilterBuilder::new();
        let s = StringCriterion::Unconstrained;
        let i = IntCriterion::Unconstrained;
        let m = MultiCriterion::Unconstrained;
        f.handle_criterion(string_criterion_handler(&s, "a"));
        f.handle_criterion(int_criterion_handler(&i, "b"));
        f.handle_criterion(multi_criterion_handler(&m, MultiTarget::ForeignKey { column: "c" }));
        f.handle_criterion(bool_criterion_handler(None, "d"));
        assert!(f.where_clauses().is_empty());
        assert!(f.joins_sql().is_empty());
    }
}
