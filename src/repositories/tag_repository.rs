// src/repositories/tag_repository.rs
//
// Tag persistence and filtering

use rusqlite::types::Value;
use rusqlite::{Connection, Row};
use serde::Deserialize;

use crate::db::blob_repository::{BlobRepository, TAGS_IMAGE};
use crate::db::fields::{get_timestamp, Entity, Field, PartialEntity};
use crate::db::join_repository::{GALLERIES_TAGS, IMAGES_TAGS, SCENES_TAGS};
use crate::db::repository::{in_binding, select_distinct_ids, Repository, ID_COLUMN};
use crate::domain::common::require_non_empty;
use crate::domain::tag::{validate_tag, Tag, TagPartial};
use crate::error::AppResult;
use crate::query::criterion::{IntCriterion, StringCriterion};
use crate::query::filter::FilterBuilder;
use crate::query::find_filter::{FindFilter, SortSpec};
use crate::query::handlers::{count_criterion_handler, search_clause, string_criterion_handler};
use crate::query::QueryBuilder;
use crate::repositories::common::{select_by_relation, unknown_missing_key, EntityQueryBuilder};

const TABLE: &str = "tags";

const SORT_COLUMNS: &[&str] = &["id", "name", "created_at", "updated_at"];

/// Performers appearing in scenes carrying the tag
const PERFORMER_COUNT_EXPR: &str = "(SELECT COUNT(DISTINCT performers_scenes.performer_id) \
     FROM scenes_tags \
     JOIN performers_scenes ON performers_scenes.scene_id = scenes_tags.scene_id \
     WHERE scenes_tags.tag_id = tags.id)";

impl Entity for Tag {
    const TABLE: &'static str = TABLE;

    fn id(&self) -> i64 {
        self.id
    }

    fn fields(&self) -> Vec<Field> {
        vec![
            Field::set("name", &self.name),
            Field::set("created_at", &self.created_at),
            Field::set("updated_at", &self.updated_at),
        ]
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Tag {
            id: row.get("id")?,
            name: row.get("name")?,
            created_at: get_timestamp(row, "created_at")?,
            updated_at: get_timestamp(row, "updated_at")?,
        })
    }
}

impl PartialEntity for TagPartial {
    fn id(&self) -> i64 {
        self.id
    }

    fn fields(&self) -> Vec<Field> {
        vec![Field::patch("name", &self.name)]
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TagFilter {
    pub name: StringCriterion,
    pub is_missing: Option<String>,
    pub scene_count: IntCriterion,
    pub image_count: IntCriterion,
    pub gallery_count: IntCriterion,
    pub performer_count: IntCriterion,
}

pub struct TagQueryBuilder<'a> {
    conn: &'a Connection,
}

impl<'a> EntityQueryBuilder<'a> for TagQueryBuilder<'a> {
    type Record = Tag;
    type Partial = TagPartial;

    fn repository(&self) -> Repository<'a> {
        Repository::new(self.conn, TABLE, ID_COLUMN)
    }

    fn validate(&self, tag: &Tag) -> AppResult<()> {
        Ok(validate_tag(tag)?)
    }

    fn validate_partial(&self, partial: &TagPartial) -> AppResult<()> {
        if let Some(name) = &partial.name {
            require_non_empty("name", name)?;
        }
        Ok(())
    }
}

impl<'a> TagQueryBuilder<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    pub fn find_by_name(&self, name: &str, nocase: bool) -> AppResult<Option<Tag>> {
        Ok(self.find_by_names(&[name.to_string()], nocase)?.into_iter().next())
    }

    pub fn find_by_names(&self, names: &[String], nocase: bool) -> AppResult<Vec<Tag>> {
        if names.is_empty() {
            return Ok(Vec::new());
        }
        let collate = if nocase { " COLLATE NOCASE" } else { "" };
        let query = format!(
            "SELECT * FROM tags WHERE tags.name{} IN {} ORDER BY tags.name ASC",
            collate,
            in_binding(names.len())
        );
        let args: Vec<Value> = names.iter().map(|n| Value::Text(n.clone())).collect();
        self.repository().query(&query, &args)
    }

    pub fn find_by_scene(&self, scene_id: i64) -> AppResult<Vec<Tag>> {
        self.repository().query(
            &select_by_relation(TABLE, SCENES_TAGS.reversed()),
            &[Value::Integer(scene_id)],
        )
    }

    pub fn find_by_image(&self, image_id: i64) -> AppResult<Vec<Tag>> {
        self.repository().query(
            &select_by_relation(TABLE, IMAGES_TAGS.reversed()),
            &[Value::Integer(image_id)],
        )
    }

    pub fn find_by_gallery(&self, gallery_id: i64) -> AppResult<Vec<Tag>> {
        self.repository().query(
            &select_by_relation(TABLE, GALLERIES_TAGS.reversed()),
            &[Value::Integer(gallery_id)],
        )
    }

    pub fn query(&self, filter: &TagFilter, find_filter: &FindFilter) -> AppResult<(Vec<Tag>, i64)> {
        let mut query = QueryBuilder::new(self.repository(), select_distinct_ids(TABLE));

        if let Some(q) = find_filter.query() {
            query.add_where(search_clause(&["tags.name"], q, false));
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
        BlobRepository::new(self.conn, TAGS_IMAGE).get(id)
    }

    pub fn update_image(&self, id: i64, image: &[u8]) -> AppResult<()> {
        BlobRepository::new(self.conn, TAGS_IMAGE).replace(id, image)
    }

    pub fn destroy_image(&self, id: i64) -> AppResult<()> {
        BlobRepository::new(self.conn, TAGS_IMAGE).destroy(id)
    }
}

fn sort_spec() -> SortSpec<'static> {
    SortSpec::new(TABLE, "name", SORT_COLUMNS)
        .with_expression("scenes_count", SCENES_TAGS.reversed().count_expr("tags.id"))
        .with_expression("images_count", IMAGES_TAGS.reversed().count_expr("tags.id"))
        .with_expression("galleries_count", GALLERIES_TAGS.reversed().count_expr("tags.id"))
}

fn build_filter(f: &mut FilterBuilder, filter: &TagFilter) {
    f.handle_criterion(string_criterion_handler(&filter.name, "tags.name"));

    match filter.is_missing.as_deref() {
        None | Some("") => {}
        Some("image") => f.add_where(format!("NOT {}", TAGS_IMAGE.exists_expr("tags.id")), Vec::new()),
        Some(other) => unknown_missing_key(TABLE, other),
    }

    f.handle_criterion(count_criterion_handler(
        &filter.scene_count,
        SCENES_TAGS.reversed().count_expr("tags.id"),
    ));
    f.handle_criterion(count_criterion_handler(
        &filter.image_count,
        IMAGES_TAGS.reversed().count_expr("tags.id"),
    ));
    f.handle_criterion(count_criterion_handler(
        &filter.gallery_count,
        GALLERIES_TAGS.reversed().count_expr("tags.id"),
    ));
    f.handle_criterion(count_criterion_handler(
        &filter.performer_count,
        PERFORMER_COUNT_EXPR.to_string(),
    ));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::scene::Scene;
    use crate::error::AppError;
    use crate::query::criterion::IntCriterionInput;
    use crate::repositories::common::fixtures::test_db;
    use crate::repositories::scene_repository::SceneQueryBuilder;

    fn names(tags: &[Tag]) -> Vec<&str> {
        tags.iter().map(|t| t.name.as_str()).collect()
    }

    #[test]
    fn test_unique_name() {
        let conn = test_db();
        let qb = TagQueryBuilder::new(&conn);
        qb.create(&Tag::new("dup")).unwrap();

        assert!(matches!(
            qb.create(&Tag::new("dup")),
            Err(AppError::ConstraintViolation(_))
        ));
    }

    #[test]
    fn test_find_by_name_nocase() {
        let conn = test_db();
        let qb = TagQueryBuilder::new(&conn);
        qb.create(&Tag::new("Outdoor")).unwrap();

        assert!(qb.find_by_name("outdoor", false).unwrap().is_none());
        assert_eq!(
            qb.find_by_name("outdoor", true).unwrap().map(|t| t.name),
            Some("Outdoor".to_string())
        );
        assert!(qb.find_by_names(&[], true).unwrap().is_empty());
    }

    #[test]
    fn test_scene_count_filter_and_find_by_scene() {
        let conn = test_db();
        let qb = TagQueryBuilder::new(&conn);
        let scenes = SceneQueryBuilder::new(&conn);
        let used = qb.create(&Tag::new("used")).unwrap();
        qb.create(&Tag::new("unused")).unwrap();

        let mut scene = Scene::new("/t.mp4");
        scene.checksum = Some("c".to_string());
        let scene = scenes.create(&scene).unwrap();
        scenes.update_tags(scene.id, &[used.id]).unwrap();

        let filter = TagFilter {
            scene_count: IntCriterion::parse(&IntCriterionInput {
                value: 0,
                modifier: Some("GREATER_THAN".to_string()),
            })
            .unwrap(),
            ..Default::default()
        };
        let (tags, count) = qb.query(&filter, &FindFilter::default()).unwrap();

        assert_eq!((names(&tags), count), (vec!["used"], 1));
        assert_eq!(names(&qb.find_by_scene(scene.id).unwrap()), vec!["used"]);
    }

    #[test]
    fn test_is_missing_image_and_search() {
        let conn = test_db();
        let qb = TagQueryBuilder::new(&conn);
        let pictured = qb.create(&Tag::new("pictured")).unwrap();
        qb.create(&Tag::new("plain")).unwrap();
        qb.update_image(pictured.id, b"img").unwrap();

        let filter = TagFilter {
            is_missing: Some("image".to_string()),
            ..Default::default()
        };
        let (tags, _) = qb.query(&filter, &FindFilter::default()).unwrap();
        assert_eq!(names(&tags), vec!["plain"]);

        let find_filter = FindFilter {
            q: Some("PIC".to_string()),
            ..Default::default()
        };
        let (tags, _) = qb.query(&TagFilter::default(), &find_filter).unwrap();
        assert_eq!(names(&tags), vec!["pictured"]);

        qb.destroy_image(pictured.id).unwrap();
        assert_eq!(qb.image(pictured.id).unwrap(), None);
    }
}
