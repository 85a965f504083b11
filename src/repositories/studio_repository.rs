// src/repositories/studio_repository.rs
//
// Studio persistence and filtering
//
// Studios form a tree through parent_id; deleting a parent detaches
// its children (ON DELETE SET NULL).

use rusqlite::types::Value;
use rusqlite::{Connection, Row};
use serde::Deserialize;

use crate::db::blob_repository::{BlobRepository, STUDIOS_IMAGE};
use crate::db::fields::{get_timestamp, Entity, Field, PartialEntity};
use crate::db::repository::{select_distinct_ids, Repository, ID_COLUMN};
use crate::db::stash_id_repository::{StashId, StashIdRepository, STUDIO_STASH_IDS};
use crate::domain::studio::{validate_studio, validate_studio_partial, Studio, StudioPartial};
use crate::error::AppResult;
use crate::query::criterion::{IntCriterion, MultiCriterion, StringCriterion};
use crate::query::filter::FilterBuilder;
use crate::query::find_filter::{FindFilter, SortSpec};
use crate::query::handlers::{
    count_criterion_handler, missing_relation_handler, multi_criterion_handler, search_clause,
    string_criterion_handler, string_literal_criterion_handler, MultiTarget,
};
use crate::query::QueryBuilder;
use crate::repositories::common::{blank_text, unknown_missing_key, EntityQueryBuilder};

const TABLE: &str = "studios";

const SORT_COLUMNS: &[&str] = &["id", "name", "url", "created_at", "updated_at"];

const SCENE_COUNT_EXPR: &str =
    "(SELECT COUNT(*) FROM scenes WHERE scenes.studio_id = studios.id)";

impl Entity for Studio {
    const TABLE: &'static str = TABLE;

    fn id(&self) -> i64 {
        self.id
    }

    fn fields(&self) -> Vec<Field> {
        vec![
            Field::set("name", &self.name),
            Field::set("url", &self.url),
            Field::set("details", &self.details),
            Field::set("parent_id", &self.parent_id),
            Field::set("created_at", &self.created_at),
            Field::set("updated_at", &self.updated_at),
        ]
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Studio {
            id: row.get("id")?,
            name: row.get("name")?,
            url: row.get("url")?,
            details: row.get("details")?,
            parent_id: row.get("parent_id")?,
            created_at: get_timestamp(row, "created_at")?,
            updated_at: get_timestamp(row, "updated_at")?,
        })
    }
}

impl PartialEntity for StudioPartial {
    fn id(&self) -> i64 {
        self.id
    }

    fn fields(&self) -> Vec<Field> {
        vec![
            Field::patch("name", &self.name),
            Field::patch("url", &self.url),
            Field::patch("details", &self.details),
            Field::patch("parent_id", &self.parent_id),
        ]
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StudioFilter {
    pub name: StringCriterion,
    pub url: StringCriterion,
    pub parent_studios: MultiCriterion,
    pub is_missing: Option<String>,
    pub scene_count: IntCriterion,
    pub stash_id: Option<String>,
}

pub struct StudioQueryBuilder<'a> {
    conn: &'a Connection,
}

impl<'a> EntityQueryBuilder<'a> for StudioQueryBuilder<'a> {
    type Record = Studio;
    type Partial = StudioPartial;

    fn repository(&self) -> Repository<'a> {
        Repository::new(self.conn, TABLE, ID_COLUMN)
    }

    fn validate(&self, studio: &Studio) -> AppResult<()> {
        Ok(validate_studio(studio)?)
    }

    fn validate_partial(&self, partial: &StudioPartial) -> AppResult<()> {
        Ok(validate_studio_partial(partial)?)
    }
}

impl<'a> StudioQueryBuilder<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    pub fn find_by_name(&self, name: &str, nocase: bool) -> AppResult<Option<Studio>> {
        let collate = if nocase { " COLLATE NOCASE" } else { "" };
        let query = format!(
            "SELECT * FROM studios WHERE studios.name{} = ? ORDER BY studios.id ASC LIMIT 1",
            collate
        );
        self.repository()
            .query_one(&query, &[Value::Text(name.to_string())])
    }

    /// Direct children of `parent_id`
    pub fn find_children(&self, parent_id: i64) -> AppResult<Vec<Studio>> {
        self.repository().query(
            "SELECT * FROM studios WHERE studios.parent_id = ? ORDER BY studios.name ASC",
            &[Value::Integer(parent_id)],
        )
    }

    pub fn query(
        &self,
        filter: &StudioFilter,
        find_filter: &FindFilter,
    ) -> AppResult<(Vec<Studio>, i64)> {
        let mut query = QueryBuilder::new(self.repository(), select_distinct_ids(TABLE));

        if let Some(q) = find_filter.query() {
            query.add_where(search_clause(&["studios.name"], q, false));
        }

        let mut f = FilterBuilder::new();
        build_filter(&mut f, filter);
        f.add_to_query_builder(&mut query);

        query.set_sort_and_pagination(format!(
            "{}{}",
            sort_spec().order_by(find_filter),
            find_filter.pagination().to_sql()
        ));

        let (ids, count) = query.execute_find()?;
        Ok((self.find_many(&ids)?, count))
    }

    pub fn image(&self, id: i64) -> AppResult<Option<Vec<u8>>> {
        BlobRepository::new(self.conn, STUDIOS_IMAGE).get(id)
    }

    pub fn update_image(&self, id: i64, image: &[u8]) -> AppResult<()> {
        BlobRepository::new(self.conn, STUDIOS_IMAGE).replace(id, image)
    }

    pub fn destroy_image(&self, id: i64) -> AppResult<()> {
        BlobRepository::new(self.conn, STUDIOS_IMAGE).destroy(id)
    }

    pub fn stash_ids(&self, id: i64) -> AppResult<Vec<StashId>> {
        StashIdRepository::new(self.conn, STUDIO_STASH_IDS).get(id)
    }

    pub fn update_stash_ids(&self, id: i64, stash_ids: &[StashId]) -> AppResult<()> {
        StashIdRepository::new(self.conn, STUDIO_STASH_IDS).replace(id, stash_ids)
    }
}

fn sort_spec() -> SortSpec<'static> {
    SortSpec::new(TABLE, "name", SORT_COLUMNS)
        .with_expression("scenes_count", SCENE_COUNT_EXPR.to_string())
}

fn build_filter(f: &mut FilterBuilder, filter: &StudioFilter) {
    f.handle_criterion(string_criterion_handler(&filter.name, "studios.name"));
    f.handle_criterion(string_criterion_handler(&filter.url, "studios.url"));
    f.handle_criterion(multi_criterion_handler(
        &filter.parent_studios,
        MultiTarget::ForeignKey {
            column: "studios.parent_id",
        },
    ));

    match filter.is_missing.as_deref() {
        None | Some("") => {}
        Some(column @ ("url" | "details")) => {
            f.add_where(blank_text(&format!("studios.{}", column)), Vec::new())
        }
        Some("image") => f.add_where(
            format!("NOT {}", STUDIOS_IMAGE.exists_expr("studios.id")),
            Vec::new(),
        ),
        Some("stash_id") => f.handle_criterion(missing_relation_handler(
            STUDIO_STASH_IDS.as_join(),
            "studio_stash_ids",
            "studios.id",
        )),
        Some(other) => unknown_missing_key(TABLE, other),
    }

    f.handle_criterion(count_criterion_handler(
        &filter.scene_count,
        SCENE_COUNT_EXPR.to_string(),
    ));

    if filter.stash_id.as_deref().is_some_and(|s| !s.is_empty()) {
        STUDIO_STASH_IDS
            .as_join()
            .join(f, "studio_stash_ids", "studios.id");
    }
    f.handle_criterion(string_literal_criterion_handler(
        filter.stash_id.as_deref(),
        "studio_stash_ids.stash_id",
    ));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use crate::query::criterion::MultiCriterionInput;
    use crate::repositories::common::fixtures::test_db;

    fn names(studios: &[Studio]) -> Vec<&str> {
        studios.iter().map(|s| s.name.as_str()).collect()
    }

    #[test]
    fn test_children_and_parent_filter() {
        let conn = test_db();
        let qb = StudioQueryBuilder::new(&conn);
        let parent = qb.create(&Studio::new("Network")).unwrap();
        let mut child = Studio::new("Channel");
        child.parent_id = Some(parent.id);
        qb.create(&child).unwrap();
        qb.create(&Studio::new("Indie")).unwrap();

        assert_eq!(names(&qb.find_children(parent.id).unwrap()), vec!["Channel"]);

        let filter = StudioFilter {
            parent_studios: MultiCriterion::parse(&MultiCriterionInput {
                value: vec![parent.id],
                modifier: Some("INCLUDES".to_string()),
            })
            .unwrap(),
            ..Default::default()
        };
        let (studios, _) = qb.query(&filter, &FindFilter::default()).unwrap();
        assert_eq!(names(&studios), vec!["Channel"]);

        let filter = StudioFilter {
            parent_studios: MultiCriterion::parse(&MultiCriterionInput {
                value: vec![parent.id],
                modifier: Some("EXCLUDES".to_string()),
            })
            .unwrap(),
            ..Default::default()
        };
        let (studios, _) = qb.query(&filter, &FindFilter::default()).unwrap();
        assert_eq!(names(&studios), vec!["Indie", "Network"]);
    }

    #[test]
    fn test_self_parent_rejected() {
        let conn = test_db();
        let qb = StudioQueryBuilder::new(&conn);
        let studio = qb.create(&Studio::new("Loop")).unwrap();

        let mut partial = StudioPartial::new(studio.id);
        partial.parent_id = Some(Some(studio.id));

        assert!(matches!(qb.update(&partial), Err(AppError::Domain(_))));
    }

    #[test]
    fn test_deleting_parent_detaches_children() {
        let conn = test_db();
        let qb = StudioQueryBuilder::new(&conn);
        let parent = qb.create(&Studio::new("Parent")).unwrap();
        let mut child = Studio::new("Child");
        child.parent_id = Some(parent.id);
        let child = qb.create(&child).unwrap();

        qb.destroy(parent.id).unwrap();

        assert_eq!(qb.get(child.id).unwrap().parent_id, None);
    }

    #[test]
    fn test_find_by_name_and_missing_url() {
        let conn = test_db();
        let qb = StudioQueryBuilder::new(&conn);
        let mut with_url = Studio::new("Linked");
        with_url.url = Some("https://example.org".to_string());
        qb.create(&with_url).unwrap();
        qb.create(&Studio::new("Bare")).unwrap();

        assert!(qb.find_by_name("linked", true).unwrap().is_some());
        assert!(qb.find_by_name("linked", false).unwrap().is_none());

        let filter = StudioFilter {
            is_missing: Some("url".to_string()),
            ..Default::default()
        };
        let (studios, count) = qb.query(&filter, &FindFilter::default()).unwrap();
        assert_eq!((names(&studios), count), (vec!["Bare"], 1));
    }
}
