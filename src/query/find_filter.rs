// src/query/find_filter.rs
//
// Free-text search term, sorting and pagination of a find request

use serde::{Deserialize, Serialize};

pub const DEFAULT_PER_PAGE: i64 = 25;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    pub fn as_sql(&self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pagination {
    /// Every match, no LIMIT
    All,
    /// One-based page
    Page { page: i64, per_page: i64 },
}

impl Pagination {
    pub fn to_sql(&self) -> String {
        match self {
            Pagination::All => String::new(),
            Pagination::Page { page, per_page } => {
                // Past the last representable row is just an empty page
                let offset = page.saturating_sub(1).max(0).saturating_mul(*per_page);
                format!(" LIMIT {} OFFSET {} ", per_page, offset)
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FindFilter {
    pub q: Option<String>,
    pub page: Option<i64>,
    pub per_page: Option<i64>,
    pub sort: Option<String>,
    pub direction: Option<SortDirection>,
}

impl FindFilter {
    pub fn page(page: i64, per_page: i64) -> Self {
        Self {
            page: Some(page),
            per_page: Some(per_page),
            ..Default::default()
        }
    }

    pub fn sorted(mut self, sort: &str, direction: SortDirection) -> Self {
        self.sort = Some(sort.to_string());
        self.direction = Some(direction);
        self
    }

    /// Non-blank search term
    pub fn query(&self) -> Option<&str> {
        self.q.as_deref().filter(|q| !q.trim().is_empty())
    }

    pub fn pagination(&self) -> Pagination {
        match (self.page, self.per_page) {
            (None, None) => Pagination::All,
            (_, Some(per_page)) if per_page < 0 => Pagination::All,
            (page, per_page) => Pagination::Page {
                page: page.unwrap_or(1).max(1),
                per_page: match per_page {
                    Some(n) if n > 0 => n,
                    _ => DEFAULT_PER_PAGE,
                },
            },
        }
    }

    pub fn direction(&self) -> SortDirection {
        self.direction.unwrap_or_default()
    }
}

/// How one entity resolves sort keys to SQL
///
/// Only keys listed here reach the ORDER BY clause.
pub struct SortSpec<'a> {
    pub table: &'a str,
    pub default_sort: &'a str,
    /// Keys that sort by the column of the same name
    pub columns: &'a [&'a str],
    /// Keys that sort by a computed expression
    pub expressions: Vec<(&'a str, String)>,
    /// Appended after the primary ordering
    pub tie_breakers: &'a str,
}

impl<'a> SortSpec<'a> {
    pub fn new(table: &'a str, default_sort: &'a str, columns: &'a [&'a str]) -> Self {
        Self {
            table,
            default_sort,
            columns,
            expressions: Vec::new(),
            tie_breakers: "",
        }
    }

    pub fn with_expression(mut self, key: &'a str, expr: String) -> Self {
        self.expressions.push((key, expr));
        self
    }

    pub fn with_tie_breakers(mut self, tie_breakers: &'a str) -> Self {
        self.tie_breakers = tie_breakers;
        self
    }

    fn column_expr(&self, key: &str) -> Option<String> {
        if let Some((_, expr)) = self.expressions.iter().find(|(k, _)| *k == key) {
            return Some(expr.clone());
        }
        if key == "filesize" {
            return Some(format!("CAST({}.size AS INTEGER)", self.table));
        }
        self.columns
            .iter()
            .find(|c| **c == key)
            .map(|c| match *c {
                "name" | "title" => format!("{}.{} COLLATE NOCASE", self.table, c),
                _ => format!("{}.{}", self.table, c),
            })
    }

    /// ` ORDER BY ...` for the requested sort, falling back to the default
    pub fn order_by(&self, find_filter: &FindFilter) -> String {
        let direction = find_filter.direction().as_sql();
        let sort = find_filter.sort.as_deref().unwrap_or(self.default_sort);

        if sort == "random" {
            return self.random_order(RANDOM_SEED, direction);
        }
        if let Some(seed) = sort.strip_prefix("random_") {
            return match seed.parse::<u64>() {
                Ok(seed) => self.random_order(seed % 100_000_000, direction),
                Err(_) => {
                    log::warn!("Invalid random sort seed '{}', using default seed", seed);
                    self.random_order(RANDOM_SEED, direction)
                }
            };
        }

        let expr = match self.column_expr(sort) {
            Some(expr) => expr,
            None => {
                log::warn!(
                    "Unknown sort key '{}' for {}, using '{}'",
                    sort,
                    self.table,
                    self.default_sort
                );
                match self.column_expr(self.default_sort) {
                    Some(expr) => expr,
                    None => format!("{}.id", self.table),
                }
            }
        };

        format!(" ORDER BY {} {}{} ", expr, direction, self.tie_breakers)
    }

    fn random_order(&self, seed: u64, direction: &str) -> String {
        format!(
            " ORDER BY ((({table}.id + {seed}) * 2654435761) % 4294967296) {dir}, {table}.id {dir} ",
            table = self.table,
            seed = seed,
            dir = direction
        )
    }
}

const RANDOM_SEED: u64 = 5_381;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pagination_defaults() {
        assert_eq!(FindFilter::default().pagination(), Pagination::All);
        assert_eq!(
            FindFilter {
                per_page: Some(-1),
                page: Some(3),
                ..Default::default()
            }
            .pagination(),
            Pagination::All
        );
        assert_eq!(
            FindFilter {
                page: Some(2),
                ..Default::default()
            }
            .pagination(),
            Pagination::Page {
                page: 2,
                per_page: DEFAULT_PER_PAGE
            }
        );
        assert_eq!(
            FindFilter::page(0, 10).pagination(),
            Pagination::Page {
                page: 1,
                per_page: 10
            }
        );
    }

    #[test]
    fn test_pagination_sql() {
        assert_eq!(FindFilter::page(2, 10).pagination().to_sql(), " LIMIT 10 OFFSET 10 ");
        assert_eq!(Pagination::All.to_sql(), "");
    }

    #[test]
    fn test_huge_page_offset_saturates() {
        let ff: FindFilter =
            serde_json::from_str(r#"{"page": 9223372036854775807, "per_page": 10}"#).unwrap();
        assert_eq!(
            ff.pagination().to_sql(),
            format!(" LIMIT 10 OFFSET {} ", i64::MAX)
        );

        let page = Pagination::Page {
            page: i64::MIN,
            per_page: 10,
        };
        assert_eq!(page.to_sql(), " LIMIT 10 OFFSET 0 ");
    }

    #[test]
    fn test_unknown_sort_key_falls_back() {
        let spec = SortSpec::new("tags", "name", &["name", "created_at"]);
        let ff = FindFilter::default().sorted("name; DROP TABLE tags", SortDirection::Desc);

        assert_eq!(spec.order_by(&ff), " ORDER BY tags.name COLLATE NOCASE DESC ");
    }

    #[test]
    fn test_expression_and_filesize_keys() {
        let spec = SortSpec::new("scenes", "title", &["title"])
            .with_expression("tag_count", "(SELECT 1)".to_string())
            .with_tie_breakers(", scenes.rating DESC");

        let ff = FindFilter::default().sorted("filesize", SortDirection::Asc);
        assert_eq!(
            spec.order_by(&ff),
            " ORDER BY CAST(scenes.size AS INTEGER) ASC, scenes.rating DESC "
        );

        let ff = FindFilter::default().sorted("tag_count", SortDirection::Asc);
        assert!(spec.order_by(&ff).starts_with(" ORDER BY (SELECT 1) ASC"));
    }

    #[test]
    fn test_seeded_random_is_stable() {
        let spec = SortSpec::new("scenes", "title", &["title"]);
        let a = FindFilter::default().sorted("random_42", SortDirection::Asc);
        let b = FindFilter::default().sorted("random_43", SortDirection::Asc);

        assert_eq!(spec.order_by(&a), spec.order_by(&a));
        assert_ne!(spec.order_by(&a), spec.order_by(&b));
    }
}
