// src/query/mod.rs
//
// Dynamic query composition
//
// Provides:
// - Typed criteria and their inbound inputs
// - Find filter (search term, sort, pagination)
// - Filter builder and criterion handlers
// - Query builder (compose + execute find)

pub mod builder;
pub mod criterion;
pub mod filter;
pub mod find_filter;
pub mod handlers;

pub use builder::QueryBuilder;
pub use criterion::{
    CriterionModifier, IntCriterion, IntCriterionInput, MultiCriterion, MultiCriterionInput,
    Resolution, StringCriterion, StringCriterionInput,
};
pub use filter::{CriterionHandler, FilterBuilder, SqlClause};
pub use find_filter::{FindFilter, Pagination, SortDirection, SortSpec};
