// src/repositories/gallery_repository.rs
//
// Gallery persistence and filtering
//
// RULES:
// - Galleries without a path are user collections, never scan targets
// - Scenes and images are reached through the reversed association tables

use chrono::{DateTime, Utc};
use rusqlite::types::Value;
use rusqlite::{Connection, Row};
use serde::Deserialize;

use crate::db::fields::{
    get_date, get_optional_timestamp, get_timestamp, Entity, Field, PartialEntity, ToValue,
};
use crate::db::join_repository::{
    JoinRepository, JoinTable, GALLERIES_IMAGES, GALLERIES_TAGS, PERFORMERS_GALLERIES,
    SCENES_GALLERIES,
};
use crate::db::repository::{select_distinct_ids, Repository, ID_COLUMN};
use crate::domain::common::{require_non_empty, validate_rating};
use crate::domain::gallery::{validate_gallery, Gallery, GalleryPartial};
use crate::error::AppResult;
use crate::query::criterion::{IntCriterion, MultiCriterion, StringCriterion};
use crate::query::filter::FilterBuilder;
use crate::query::find_filter::{FindFilter, SortSpec};
use crate::query::handlers::{
    bool_criterion_handler, count_criterion_handler, int_criterion_handler,
    missing_relation_handler, multi_criterion_handler, search_clause, string_criterion_handler,
    MultiTarget,
};
use crate::query::QueryBuilder;
use crate::repositories::common::{
    blank_date, blank_text, count_by_relation, select_by_relation, unknown_missing_key,
    EntityQueryBuilder,
};

const TABLE: &str = "galleries";

/// galleries_images keyed by gallery
const GALLERY_IMAGES: JoinTable = GALLERIES_IMAGES.reversed();

/// scenes_galleries keyed by gallery
const GALLERY_SCENES: JoinTable = SCENES_GALLERIES.reversed();

const SEARCH_COLUMNS: &[&str] = &["galleries.title", "galleries.path", "galleries.checksum"];

const SORT_COLUMNS: &[&str] = &[
    "id",
    "title",
    "path",
    "date",
    "rating",
    "organized",
    "created_at",
    "updated_at",
];

impl Entity for Gallery {
    const TABLE: &'static str = TABLE;

    fn id(&self) -> i64 {
        self.id
    }

    fn fields(&self) -> Vec<Field> {
        vec![
            Field::set("path", &self.path),
            Field::set("checksum", &self.checksum),
            Field::set("zip", &self.zip),
            Field::set("title", &self.title),
            Field::set("url", &self.url),
            Field::set("date", &self.date),
            Field::set("details", &self.details),
            Field::set("rating", &self.rating),
            Field::set("organized", &self.organized),
            Field::set("studio_id", &self.studio_id),
            Field::set("file_mod_time", &self.file_mod_time),
            Field::set("created_at", &self.created_at),
            Field::set("updated_at", &self.updated_at),
        ]
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Gallery {
            id: row.get("id")?,
            path: row.get("path")?,
            checksum: row.get("checksum")?,
            zip: row.get("zip")?,
            title: row.get("title")?,
            url: row.get("url")?,
            date: get_date(row, "date")?,
            details: row.get("details")?,
            rating: row.get("rating")?,
            organized: row.get("organized")?,
            studio_id: row.get("studio_id")?,
            file_mod_time: get_optional_timestamp(row, "file_mod_time")?,
            created_at: get_timestamp(row, "created_at")?,
            updated_at: get_timestamp(row, "updated_at")?,
        })
    }
}

impl PartialEntity for GalleryPartial {
    fn id(&self) -> i64 {
        self.id
    }

    fn fields(&self) -> Vec<Field> {
        vec![
            Field::patch("path", &self.path),
            Field::patch("checksum", &self.checksum),
            Field::patch("zip", &self.zip),
            Field::patch("title", &self.title),
            Field::patch("url", &self.url),
            Field::patch("date", &self.date),
            Field::patch("details", &self.details),
            Field::patch("rating", &self.rating),
            Field::patch("organized", &self.organized),
            Field::patch("studio_id", &self.studio_id),
            Field::patch("file_mod_time", &self.file_mod_time),
        ]
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct GalleryFilter {
    pub title: StringCriterion,
    pub path: StringCriterion,
    pub checksum: StringCriterion,
    pub details: StringCriterion,
    pub url: StringCriterion,
    pub rating: IntCriterion,
    pub organized: Option<bool>,
    pub is_missing: Option<String>,
    pub tags: MultiCriterion,
    pub performers: MultiCriterion,
    pub studios: MultiCriterion,
    pub scenes: MultiCriterion,
    pub image_count: IntCriterion,
}

pub struct GalleryQueryBuilder<'a> {
    conn: &'a Connection,
}

impl<'a> EntityQueryBuilder<'a> for GalleryQueryBuilder<'a> {
    type Record = Gallery;
    type Partial = GalleryPartial;

    fn repository(&self) -> Repository<'a> {
        Repository::new(self.conn, TABLE, ID_COLUMN)
    }

    fn validate(&self, gallery: &Gallery) -> AppResult<()> {
        Ok(validate_gallery(gallery)?)
    }

    fn validate_partial(&self, partial: &GalleryPartial) -> AppResult<()> {
        if let Some(Some(path)) = &partial.path {
            require_non_empty("path", path)?;
        }
        if let Some(checksum) = &partial.checksum {
            require_non_empty("checksum", checksum)?;
        }
        if let Some(rating) = partial.rating {
            validate_rating(rating)?;
        }
        Ok(())
    }
}

impl<'a> GalleryQueryBuilder<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    pub fn find_by_path(&self, path: &str) -> AppResult<Option<Gallery>> {
        self.repository().query_one(
            "SELECT * FROM galleries WHERE galleries.path = ? LIMIT 1",
            &[Value::Text(path.to_string())],
        )
    }

    pub fn find_by_checksum(&self, checksum: &str) -> AppResult<Option<Gallery>> {
        self.repository().query_one(
            "SELECT * FROM galleries WHERE galleries.checksum = ? LIMIT 1",
            &[Value::Text(checksum.to_string())],
        )
    }

    pub fn find_by_scene(&self, scene_id: i64) -> AppResult<Vec<Gallery>> {
        self.repository()
            .query(&select_by_relation(TABLE, GALLERY_SCENES), &[Value::Integer(scene_id)])
    }

    pub fn find_by_image(&self, image_id: i64) -> AppResult<Vec<Gallery>> {
        self.repository()
            .query(&select_by_relation(TABLE, GALLERY_IMAGES), &[Value::Integer(image_id)])
    }

    /// Archive-backed galleries only
    pub fn find_zips(&self) -> AppResult<Vec<Gallery>> {
        self.repository().query(
            "SELECT * FROM galleries WHERE galleries.zip = 1 ORDER BY galleries.id ASC",
            &[],
        )
    }

    pub fn count_by_scene(&self, scene_id: i64) -> AppResult<i64> {
        count_by_relation(self.repository(), GALLERY_SCENES, scene_id)
    }

    pub fn update_file_mod_time(&self, id: i64, mod_time: DateTime<Utc>) -> AppResult<()> {
        self.repository()
            .update_raw(id, &[("file_mod_time", mod_time.to_value())])
    }

    pub fn query(
        &self,
        filter: &GalleryFilter,
        find_filter: &FindFilter,
    ) -> AppResult<(Vec<Gallery>, i64)> {
        let mut query = QueryBuilder::new(self.repository(), select_distinct_ids(TABLE));

        if let Some(q) = find_filter.query() {
            query.add_where(search_clause(SEARCH_COLUMNS, q, false));
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

    // ========================================================================
    // ASSOCIATIONS
    // ========================================================================

    pub fn performer_ids(&self, id: i64) -> AppResult<Vec<i64>> {
        JoinRepository::new(self.conn, PERFORMERS_GALLERIES).get_ids(id)
    }

    pub fn update_performers(&self, id: i64, performer_ids: &[i64]) -> AppResult<()> {
        JoinRepository::new(self.conn, PERFORMERS_GALLERIES).replace(id, performer_ids)
    }

    pub fn tag_ids(&self, id: i64) -> AppResult<Vec<i64>> {
        JoinRepository::new(self.conn, GALLERIES_TAGS).get_ids(id)
    }

    pub fn update_tags(&self, id: i64, tag_ids: &[i64]) -> AppResult<()> {
        JoinRepository::new(self.conn, GALLERIES_TAGS).replace(id, tag_ids)
    }

    pub fn image_ids(&self, id: i64) -> AppResult<Vec<i64>> {
        JoinRepository::new(self.conn, GALLERY_IMAGES).get_ids(id)
    }

    pub fn update_images(&self, id: i64, image_ids: &[i64]) -> AppResult<()> {
        JoinRepository::new(self.conn, GALLERY_IMAGES).replace(id, image_ids)
    }

    pub fn scene_ids(&self, id: i64) -> AppResult<Vec<i64>> {
        JoinRepository::new(self.conn, GALLERY_SCENES).get_ids(id)
    }

    pub fn update_scenes(&self, id: i64, scene_ids: &[i64]) -> AppResult<()> {
        JoinRepository::new(self.conn, GALLERY_SCENES).replace(id, scene_ids)
    }
}

fn sort_spec() -> SortSpec<'static> {
    SortSpec::new(TABLE, "path", SORT_COLUMNS)
        .with_expression("image_count", GALLERY_IMAGES.count_expr("galleries.id"))
}

fn build_filter(f: &mut FilterBuilder, filter: &GalleryFilter) {
    f.handle_criterion(string_criterion_handler(&filter.title, "galleries.title"));
    f.handle_criterion(string_criterion_handler(&filter.path, "galleries.path"));
    f.handle_criterion(string_criterion_handler(&filter.checksum, "galleries.checksum"));
    f.handle_criterion(string_criterion_handler(&filter.details, "galleries.details"));
    f.handle_criterion(string_criterion_handler(&filter.url, "galleries.url"));
    f.handle_criterion(int_criterion_handler(&filter.rating, "galleries.rating"));
    f.handle_criterion(bool_criterion_handler(filter.organized, "galleries.organized"));

    match filter.is_missing.as_deref() {
        None | Some("") => {}
        Some(column @ ("title" | "details" | "url")) => {
            f.add_where(blank_text(&format!("galleries.{}", column)), Vec::new())
        }
        Some("date") => f.add_where(blank_date("galleries.date"), Vec::new()),
        Some("studio") => f.add_where("galleries.studio_id IS NULL", Vec::new()),
        Some("performers") => f.handle_criterion(missing_relation_handler(
            PERFORMERS_GALLERIES,
            "performers_join",
            "galleries.id",
        )),
        Some("tags") => f.handle_criterion(missing_relation_handler(
            GALLERIES_TAGS,
            "tags_join",
            "galleries.id",
        )),
        Some("scenes") => f.handle_criterion(missing_relation_handler(
            GALLERY_SCENES,
            "scenes_join",
            "galleries.id",
        )),
        Some(other) => unknown_missing_key(TABLE, other),
    }

    f.handle_criterion(multi_criterion_handler(
        &filter.tags,
        MultiTarget::Relation {
            join: GALLERIES_TAGS,
            alias: "tags_join",
            owner_expr: "galleries.id",
        },
    ));
    f.handle_criterion(multi_criterion_handler(
        &filter.performers,
        MultiTarget::Relation {
            join: PERFORMERS_GALLERIES,
            alias: "performers_join",
            owner_expr: "galleries.id",
        },
    ));
    f.handle_criterion(multi_criterion_handler(
        &filter.scenes,
        MultiTarget::Relation {
            join: GALLERY_SCENES,
            alias: "scenes_join",
            owner_expr: "galleries.id",
        },
    ));
    f.handle_criterion(multi_criterion_handler(
        &filter.studios,
        MultiTarget::ForeignKey {
            column: "galleries.studio_id",
        },
    ));

    f.handle_criterion(count_criterion_handler(
        &filter.image_count,
        GALLERY_IMAGES.count_expr("galleries.id"),
    ));
}
