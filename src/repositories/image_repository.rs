// src/repositories/image_repository.rs
//
// Image persistence and filtering

use chrono::{DateTime, Utc};
use rusqlite::types::Value;
use rusqlite::{Connection, Row};
use serde::Deserialize;

use crate::db::fields::{get_optional_timestamp, get_timestamp, Entity, Field, PartialEntity, ToValue};
use crate::db::join_repository::{JoinRepository, GALLERIES_IMAGES, IMAGES_TAGS, PERFORMERS_IMAGES};
use crate::db::repository::{select_distinct_ids, Repository, ID_COLUMN};
use crate::domain::common::{require_non_empty, validate_o_counter, validate_rating};
use crate::domain::image::{validate_image, Image, ImagePartial};
use crate::error::AppResult;
use crate::query::criterion::{IntCriterion, MultiCriterion, Resolution, StringCriterion};
use crate::query::filter::FilterBuilder;
use crate::query::find_filter::{FindFilter, SortSpec};
use crate::query::handlers::{
    bool_criterion_handler, count_criterion_handler, int_criterion_handler,
    missing_relation_handler, multi_criterion_handler, resolution_criterion_handler,
    search_clause, string_criterion_handler, MultiTarget,
};
use crate::query::QueryBuilder;
use crate::repositories::common::{
    adjust_counter, blank_text, count_by_relation, select_by_relation, unknown_missing_key,
    EntityQueryBuilder,
};

const TABLE: &str = "images";

const SEARCH_COLUMNS: &[&str] = &["images.title", "images.path", "images.checksum"];

const SORT_COLUMNS: &[&str] = &[
    "id",
    "title",
    "path",
    "rating",
    "organized",
    "o_counter",
    "created_at",
    "updated_at",
];

impl Entity for Image {
    const TABLE: &'static str = TABLE;

    fn id(&self) -> i64 {
        self.id
    }

    fn fields(&self) -> Vec<Field> {
        vec![
            Field::set("path", &self.path),
            Field::set("checksum", &self.checksum),
            Field::set("title", &self.title),
            Field::set("rating", &self.rating),
            Field::set("organized", &self.organized),
            Field::set("o_counter", &self.o_counter),
            Field::set("size", &self.size),
            Field::set("width", &self.width),
            Field::set("height", &self.height),
            Field::set("studio_id", &self.studio_id),
            Field::set("file_mod_time", &self.file_mod_time),
            Field::set("created_at", &self.created_at),
            Field::set("updated_at", &self.updated_at),
        ]
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Image {
            id: row.get("id")?,
            path: row.get("path")?,
            checksum: row.get("checksum")?,
            title: row.get("title")?,
            rating: row.get("rating")?,
            organized: row.get("organized")?,
            o_counter: row.get("o_counter")?,
            size: row.get("size")?,
            width: row.get("width")?,
            height: row.get("height")?,
            studio_id: row.get("studio_id")?,
            file_mod_time: get_optional_timestamp(row, "file_mod_time")?,
            created_at: get_timestamp(row, "created_at")?,
            updated_at: get_timestamp(row, "updated_at")?,
        })
    }
}

impl PartialEntity for ImagePartial {
    fn id(&self) -> i64 {
        self.id
    }

    fn fields(&self) -> Vec<Field> {
        vec![
            Field::patch("path", &self.path),
            Field::patch("checksum", &self.checksum),
            Field::patch("title", &self.title),
            Field::patch("rating", &self.rating),
            Field::patch("organized", &self.organized),
            Field::patch("o_counter", &self.o_counter),
            Field::patch("size", &self.size),
            Field::patch("width", &self.width),
            Field::patch("height", &self.height),
            Field::patch("studio_id", &self.studio_id),
            Field::patch("file_mod_time", &self.file_mod_time),
        ]
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ImageFilter {
    pub title: StringCriterion,
    pub path: StringCriterion,
    pub checksum: StringCriterion,
    pub rating: IntCriterion,
    pub o_counter: IntCriterion,
    pub organized: Option<bool>,
    pub resolution: Option<Resolution>,
    pub is_missing: Option<String>,
    pub tags: MultiCriterion,
    pub performers: MultiCriterion,
    pub galleries: MultiCriterion,
    pub studios: MultiCriterion,
    pub tag_count: IntCriterion,
    pub performer_count: IntCriterion,
}

pub struct ImageQueryBuilder<'a> {
    conn: &'a Connection,
}

impl<'a> EntityQueryBuilder<'a> for ImageQueryBuilder<'a> {
    type Record = Image;
    type Partial = ImagePartial;

    fn repository(&self) -> Repository<'a> {
        Repository::new(self.conn, TABLE, ID_COLUMN)
    }

    fn validate(&self, image: &Image) -> AppResult<()> {
        Ok(validate_image(image)?)
    }

    fn validate_partial(&self, partial: &ImagePartial) -> AppResult<()> {
        if let Some(path) = &partial.path {
            require_non_empty("path", path)?;
        }
        if let Some(checksum) = &partial.checksum {
            require_non_empty("checksum", checksum)?;
        }
        if let Some(rating) = partial.rating {
            validate_rating(rating)?;
        }
        if let Some(o_counter) = partial.o_counter {
            validate_o_counter(o_counter)?;
        }
        Ok(())
    }
}

impl<'a> ImageQueryBuilder<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    pub fn find_by_path(&self, path: &str) -> AppResult<Option<Image>> {
        self.repository().query_one(
            "SELECT * FROM images WHERE images.path = ? LIMIT 1",
            &[Value::Text(path.to_string())],
        )
    }

    pub fn find_by_checksum(&self, checksum: &str) -> AppResult<Option<Image>> {
        self.repository().query_one(
            "SELECT * FROM images WHERE images.checksum = ? LIMIT 1",
            &[Value::Text(checksum.to_string())],
        )
    }

    pub fn find_by_gallery(&self, gallery_id: i64) -> AppResult<Vec<Image>> {
        self.repository().query(
            &select_by_relation(TABLE, GALLERIES_IMAGES),
            &[Value::Integer(gallery_id)],
        )
    }

    pub fn count_by_gallery(&self, gallery_id: i64) -> AppResult<i64> {
        count_by_relation(self.repository(), GALLERIES_IMAGES, gallery_id)
    }

    pub fn total_size(&self) -> AppResult<f64> {
        self.repository()
            .run_sum("SELECT SUM(CAST(images.size AS REAL)) FROM images", &[])
    }

    pub fn increment_o_counter(&self, id: i64) -> AppResult<i64> {
        adjust_counter(self.repository(), id, "o_counter", "o_counter + 1")
    }

    pub fn decrement_o_counter(&self, id: i64) -> AppResult<i64> {
        adjust_counter(self.repository(), id, "o_counter", "MAX(o_counter - 1, 0)")
    }

    pub fn reset_o_counter(&self, id: i64) -> AppResult<i64> {
        adjust_counter(self.repository(), id, "o_counter", "0")
    }

    pub fn update_file_mod_time(&self, id: i64, mod_time: DateTime<Utc>) -> AppResult<()> {
        self.repository()
            .update_raw(id, &[("file_mod_time", mod_time.to_value())])
    }

    pub fn query(&self, filter: &ImageFilter, find_filter: &FindFilter) -> AppResult<(Vec<Image>, i64)> {
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

    pub fn performer_ids(&self, id: i64) -> AppResult<Vec<i64>> {
        JoinRepository::new(self.conn, PERFORMERS_IMAGES).get_ids(id)
    }

    pub fn update_performers(&self, id: i64, performer_ids: &[i64]) -> AppResult<()> {
        JoinRepository::new(self.conn, PERFORMERS_IMAGES).replace(id, performer_ids)
    }

    pub fn tag_ids(&self, id: i64) -> AppResult<Vec<i64>> {
        JoinRepository::new(self.conn, IMAGES_TAGS).get_ids(id)
    }

    pub fn update_tags(&self, id: i64, tag_ids: &[i64]) -> AppResult<()> {
        JoinRepository::new(self.conn, IMAGES_TAGS).replace(id, tag_ids)
    }

    pub fn gallery_ids(&self, id: i64) -> AppResult<Vec<i64>> {
        JoinRepository::new(self.conn, GALLERIES_IMAGES).get_ids(id)
    }

    pub fn update_galleries(&self, id: i64, gallery_ids: &[i64]) -> AppResult<()> {
        JoinRepository::new(self.conn, GALLERIES_IMAGES).replace(id, gallery_ids)
    }
}

fn sort_spec() -> SortSpec<'static> {
    SortSpec::new(TABLE, "title", SORT_COLUMNS)
        .with_expression("tag_count", IMAGES_TAGS.count_expr("images.id"))
        .with_expression("performer_count", PERFORMERS_IMAGES.count_expr("images.id"))
}

fn build_filter(f: &mut FilterBuilder, filter: &ImageFilter) {
    f.handle_criterion(string_criterion_handler(&filter.title, "images.title"));
    f.handle_criterion(string_criterion_handler(&filter.path, "images.path"));
    f.handle_criterion(string_criterion_handler(&filter.checksum, "images.checksum"));
    f.handle_criterion(int_criterion_handler(&filter.rating, "images.rating"));
    f.handle_criterion(int_criterion_handler(&filter.o_counter, "images.o_counter"));
    f.handle_criterion(bool_criterion_handler(filter.organized, "images.organized"));
    f.handle_criterion(resolution_criterion_handler(
        filter.resolution,
        "images.height",
        "images.width",
    ));

    match filter.is_missing.as_deref() {
        None | Some("") => {}
        Some("title") => f.add_where(blank_text("images.title"), Vec::new()),
        Some("studio") => f.add_where("images.studio_id IS NULL", Vec::new()),
        Some("performers") => f.handle_criterion(missing_relation_handler(
            PERFORMERS_IMAGES,
            "performers_join",
            "images.id",
        )),
        Some("tags") => {
            f.handle_criterion(missing_relation_handler(IMAGES_TAGS, "tags_join", "images.id"))
        }
        Some("galleries") => f.handle_criterion(missing_relation_handler(
            GALLERIES_IMAGES,
            "galleries_join",
            "images.id",
        )),
        Some(other) => unknown_missing_key(TABLE, other),
    }

    f.handle_criterion(multi_criterion_handler(
        &filter.tags,
        MultiTarget::Relation {
            join: IMAGES_TAGS,
            alias: "tags_join",
            owner_expr: "images.id",
        },
    ));
    f.handle_criterion(multi_criterion_handler(
        &filter.performers,
        MultiTarget::Relation {
            join: PERFORMERS_IMAGES,
            alias: "performers_join",
            owner_expr: "images.id",
        },
    ));
    f.handle_criterion(multi_criterion_handler(
        &filter.galleries,
        MultiTarget::Relation {
            join: GALLERIES_IMAGES,
            alias: "galleries_join",
            owner_expr: "images.id",
        },
    ));
    f.handle_criterion(multi_criterion_handler(
        &filter.studios,
        MultiTarget::ForeignKey {
            column: "images.studio_id",
        },
    ));

    f.handle_criterion(count_criterion_handler(
        &filter.tag_count,
        IMAGES_TAGS.count_expr("images.id"),
    ));
    f.handle_criterion(count_criterion_handler(
        &filter.performer_count,
        PERFORMERS_IMAGES.count_expr("images.id"),
    ));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::gallery::Gallery;
    use crate::domain::performer::Performer;
    use crate::query::criterion::MultiCriterionInput;
    use crate::repositories::common::fixtures::test_db;
    use crate::repositories::gallery_repository::GalleryQueryBuilder;
    use crate::repositories::performer_repository::PerformerQueryBuilder;

    fn paths(images: &[Image]) -> Vec<&str> {
        images.iter().map(|i| i.path.as_str()).collect()
    }

    #[test]
    fn test_find_by_checksum_and_gallery() {
        let conn = test_db();
        let qb = ImageQueryBuilder::new(&conn);
        let gallery = GalleryQueryBuilder::new(&conn)
            .create(&Gallery::new("g"))
            .unwrap();
        let image = qb.create(&Image::new("/i/a.jpg", "aaa")).unwrap();
        qb.create(&Image::new("/i/b.jpg", "bbb")).unwrap();
        qb.update_galleries(image.id, &[gallery.id]).unwrap();

        assert_eq!(qb.find_by_checksum("aaa").unwrap().map(|i| i.id), Some(image.id));
        assert_eq!(paths(&qb.find_by_gallery(gallery.id).unwrap()), vec!["/i/a.jpg"]);
        assert_eq!(qb.count_by_gallery(gallery.id).unwrap(), 1);

        let filter = ImageFilter {
            is_missing: Some("galleries".to_string()),
            ..Default::default()
        };
        let (images, _) = qb.query(&filter, &FindFilter::default()).unwrap();
        assert_eq!(paths(&images), vec!["/i/b.jpg"]);
    }

    #[test]
    fn test_performer_equals_exact_set() {
        let conn = test_db();
        let qb = ImageQueryBuilder::new(&conn);
        let performers = PerformerQueryBuilder::new(&conn);
        let a = performers.create(&Performer::new("A")).unwrap().id;
        let b = performers.create(&Performer::new("B")).unwrap().id;

        let exact = qb.create(&Image::new("/exact.jpg", "1")).unwrap();
        let extra = qb.create(&Image::new("/extra.jpg", "2")).unwrap();
        qb.update_performers(exact.id, &[a]).unwrap();
        qb.update_performers(extra.id, &[a, b]).unwrap();

        let filter = ImageFilter {
            performers: MultiCriterion::parse(&MultiCriterionInput {
                value: vec![a, a],
                modifier: Some("EQUALS".to_string()),
            })
            .unwrap(),
            ..Default::default()
        };
        let (images, count) = qb.query(&filter, &FindFilter::default()).unwrap();

        assert_eq!((paths(&images), count), (vec!["/exact.jpg"], 1));
    }

    #[test]
    fn test_o_counter_and_search() {
        let conn = test_db();
        let qb = ImageQueryBuilder::new(&conn);
        let image = qb.create(&Image::new("/beach/sun.jpg", "x")).unwrap();
        qb.create(&Image::new("/city/night.jpg", "y")).unwrap();

        assert_eq!(qb.decrement_o_counter(image.id).unwrap(), 0);
        assert_eq!(qb.increment_o_counter(image.id).unwrap(), 1);

        let find_filter = FindFilter {
            q: Some("BEACH".to_string()),
            ..Default::default()
        };
        let (images, _) = qb.query(&ImageFilter::default(), &find_filter).unwrap();
        assert_eq!(paths(&images), vec!["/beach/sun.jpg"]);
    }
}
