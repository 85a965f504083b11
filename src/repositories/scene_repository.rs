// src/repositories/scene_repository.rs
//
// Scene persistence and filtering
//
// RULES:
// - Connection is borrowed, never owned
// - Association writers replace, they never merge
// - O-counter never drops below zero

use chrono::{DateTime, Utc};
use rusqlite::types::Value;
use rusqlite::{params, Connection, Row};
use serde::Deserialize;

use crate::db::blob_repository::{BlobRepository, SCENES_COVER};
use crate::db::fields::{
    get_date, get_optional_timestamp, get_timestamp, Entity, Field, PartialEntity, ToValue,
};
use crate::db::join_repository::{
    JoinRepository, MOVIES_SCENES, PERFORMERS_SCENES, SCENES_GALLERIES, SCENES_TAGS,
};
use crate::db::repository::{build_count_query, select_distinct_ids, Repository, ID_COLUMN};
use crate::db::stash_id_repository::{StashId, StashIdRepository, SCENE_STASH_IDS};
use crate::db::transaction::read_txn;
use crate::domain::common::{require_non_empty, validate_o_counter, validate_rating};
use crate::domain::scene::{validate_scene, MoviesScenes, Scene, ScenePartial};
use crate::error::AppResult;
use crate::query::criterion::{check_regex, IntCriterion, MultiCriterion, Resolution, StringCriterion};
use crate::query::filter::FilterBuilder;
use crate::query::find_filter::{FindFilter, SortSpec};
use crate::query::handlers::{
    bool_criterion_handler, count_criterion_handler, duration_criterion_handler,
    int_criterion_handler, missing_relation_handler, multi_criterion_handler,
    resolution_criterion_handler, search_clause, string_criterion_handler,
    string_literal_criterion_handler, MultiTarget,
};
use crate::query::QueryBuilder;
use crate::repositories::common::{
    adjust_counter, blank_date, blank_text, count_by_relation, select_by_relation,
    unknown_missing_key, EntityQueryBuilder,
};

const TABLE: &str = "scenes";

const SEARCH_COLUMNS: &[&str] = &[
    "scenes.title",
    "scenes.details",
    "scenes.path",
    "scenes.oshash",
    "scenes.checksum",
    "scene_markers.title",
];

const SORT_COLUMNS: &[&str] = &[
    "id",
    "title",
    "path",
    "date",
    "rating",
    "organized",
    "o_counter",
    "duration",
    "framerate",
    "bitrate",
    "created_at",
    "updated_at",
];

const SORT_TIE_BREAKERS: &str =
    ", scenes.bitrate DESC, scenes.framerate DESC, scenes.rating DESC, scenes.duration DESC";

const WALL_SIZE: i64 = 80;

impl Entity for Scene {
    const TABLE: &'static str = TABLE;

    fn id(&self) -> i64 {
        self.id
    }

    fn fields(&self) -> Vec<Field> {
        vec![
            Field::set("path", &self.path),
            Field::set("checksum", &self.checksum),
            Field::set("oshash", &self.oshash),
            Field::set("title", &self.title),
            Field::set("details", &self.details),
            Field::set("url", &self.url),
            Field::set("date", &self.date),
            Field::set("rating", &self.rating),
            Field::set("organized", &self.organized),
            Field::set("o_counter", &self.o_counter),
            Field::set("size", &self.size),
            Field::set("duration", &self.duration),
            Field::set("video_codec", &self.video_codec),
            Field::set("format", &self.format),
            Field::set("audio_codec", &self.audio_codec),
            Field::set("width", &self.width),
            Field::set("height", &self.height),
            Field::set("framerate", &self.framerate),
            Field::set("bitrate", &self.bitrate),
            Field::set("studio_id", &self.studio_id),
            Field::set("file_mod_time", &self.file_mod_time),
            Field::set("created_at", &self.created_at),
            Field::set("updated_at", &self.updated_at),
        ]
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Scene {
            id: row.get("id")?,
            path: row.get("path")?,
            checksum: row.get("checksum")?,
            oshash: row.get("oshash")?,
            title: row.get("title")?,
            details: row.get("details")?,
            url: row.get("url")?,
            date: get_date(row, "date")?,
            rating: row.get("rating")?,
            organized: row.get("organized")?,
            o_counter: row.get("o_counter")?,
            size: row.get("size")?,
            duration: row.get("duration")?,
            video_codec: row.get("video_codec")?,
            format: row.get("format")?,
            audio_codec: row.get("audio_codec")?,
            width: row.get("width")?,
            height: row.get("height")?,
            framerate: row.get("framerate")?,
            bitrate: row.get("bitrate")?,
            studio_id: row.get("studio_id")?,
            file_mod_time: get_optional_timestamp(row, "file_mod_time")?,
            created_at: get_timestamp(row, "created_at")?,
            updated_at: get_timestamp(row, "updated_at")?,
        })
    }
}

impl PartialEntity for ScenePartial {
    fn id(&self) -> i64 {
        self.id
    }

    fn fields(&self) -> Vec<Field> {
        vec![
            Field::patch("path", &self.path),
            Field::patch("checksum", &self.checksum),
            Field::patch("oshash", &self.oshash),
            Field::patch("title", &self.title),
            Field::patch("details", &self.details),
            Field::patch("url", &self.url),
            Field::patch("date", &self.date),
            Field::patch("rating", &self.rating),
            Field::patch("organized", &self.organized),
            Field::patch("o_counter", &self.o_counter),
            Field::patch("size", &self.size),
            Field::patch("duration", &self.duration),
            Field::patch("video_codec", &self.video_codec),
            Field::patch("format", &self.format),
            Field::patch("audio_codec", &self.audio_codec),
            Field::patch("width", &self.width),
            Field::patch("height", &self.height),
            Field::patch("framerate", &self.framerate),
            Field::patch("bitrate", &self.bitrate),
            Field::patch("studio_id", &self.studio_id),
            Field::patch("file_mod_time", &self.file_mod_time),
        ]
    }
}

/// Everything a scene query can be narrowed by
///
/// Fields left at their default add no constraint.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SceneFilter {
    pub title: StringCriterion,
    pub details: StringCriterion,
    pub path: StringCriterion,
    pub checksum: StringCriterion,
    pub oshash: StringCriterion,
    pub url: StringCriterion,
    pub rating: IntCriterion,
    pub o_counter: IntCriterion,
    /// Whole seconds
    pub duration: IntCriterion,
    pub organized: Option<bool>,
    pub resolution: Option<Resolution>,
    pub has_markers: Option<bool>,
    pub is_missing: Option<String>,
    pub tags: MultiCriterion,
    pub performers: MultiCriterion,
    pub studios: MultiCriterion,
    pub movies: MultiCriterion,
    pub galleries: MultiCriterion,
    pub stash_id: Option<String>,
    pub performer_count: IntCriterion,
    pub tag_count: IntCriterion,
}

pub struct SceneQueryBuilder<'a> {
    conn: &'a Connection,
}

impl<'a> EntityQueryBuilder<'a> for SceneQueryBuilder<'a> {
    type Record = Scene;
    type Partial = ScenePartial;

    fn repository(&self) -> Repository<'a> {
        Repository::new(self.conn, TABLE, ID_COLUMN)
    }

    fn validate(&self, scene: &Scene) -> AppResult<()> {
        Ok(validate_scene(scene)?)
    }

    fn validate_partial(&self, partial: &ScenePartial) -> AppResult<()> {
        if let Some(path) = &partial.path {
            require_non_empty("path", path)?;
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

impl<'a> SceneQueryBuilder<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    // ========================================================================
    // FINDERS
    // ========================================================================

    pub fn find_by_path(&self, path: &str) -> AppResult<Option<Scene>> {
        self.find_by_column("path", path)
    }

    pub fn find_by_checksum(&self, checksum: &str) -> AppResult<Option<Scene>> {
        self.find_by_column("checksum", checksum)
    }

    pub fn find_by_oshash(&self, oshash: &str) -> AppResult<Option<Scene>> {
        self.find_by_column("oshash", oshash)
    }

    fn find_by_column(&self, column: &str, value: &str) -> AppResult<Option<Scene>> {
        let query = format!("SELECT * FROM scenes WHERE scenes.{} = ? LIMIT 1", column);
        self.repository()
            .query_one(&query, &[Value::Text(value.to_string())])
    }

    pub fn find_by_performer(&self, performer_id: i64) -> AppResult<Vec<Scene>> {
        self.repository().query(
            &select_by_relation(TABLE, PERFORMERS_SCENES),
            &[Value::Integer(performer_id)],
        )
    }

    pub fn find_by_movie(&self, movie_id: i64) -> AppResult<Vec<Scene>> {
        self.repository().query(
            &select_by_relation(TABLE, MOVIES_SCENES),
            &[Value::Integer(movie_id)],
        )
    }

    pub fn find_by_gallery(&self, gallery_id: i64) -> AppResult<Vec<Scene>> {
        self.repository().query(
            &select_by_relation(TABLE, SCENES_GALLERIES),
            &[Value::Integer(gallery_id)],
        )
    }

    // ========================================================================
    // COUNTS
    // ========================================================================

    pub fn count_by_performer(&self, performer_id: i64) -> AppResult<i64> {
        count_by_relation(self.repository(), PERFORMERS_SCENES, performer_id)
    }

    pub fn count_by_tag(&self, tag_id: i64) -> AppResult<i64> {
        count_by_relation(self.repository(), SCENES_TAGS, tag_id)
    }

    pub fn count_by_movie(&self, movie_id: i64) -> AppResult<i64> {
        count_by_relation(self.repository(), MOVIES_SCENES, movie_id)
    }

    pub fn count_by_studio(&self, studio_id: i64) -> AppResult<i64> {
        self.repository().run_count(
            &build_count_query("SELECT scenes.id FROM scenes WHERE scenes.studio_id = ?"),
            &[Value::Integer(studio_id)],
        )
    }

    pub fn count_missing_checksum(&self) -> AppResult<i64> {
        self.repository().run_count(
            &build_count_query("SELECT scenes.id FROM scenes WHERE scenes.checksum IS NULL"),
            &[],
        )
    }

    pub fn count_missing_oshash(&self) -> AppResult<i64> {
        self.repository().run_count(
            &build_count_query("SELECT scenes.id FROM scenes WHERE scenes.oshash IS NULL"),
            &[],
        )
    }

    /// Sum of all scene sizes in bytes
    pub fn total_size(&self) -> AppResult<f64> {
        self.repository()
            .run_sum("SELECT SUM(CAST(scenes.size AS REAL)) FROM scenes", &[])
    }

    // ========================================================================
    // COUNTERS / RAW UPDATES
    // ========================================================================

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

    // ========================================================================
    // SPECIAL QUERIES
    // ========================================================================

    /// Unorganized scenes whose path matches `regex`, case-insensitively,
    /// optionally restricted to paths under one of `path_prefixes`
    pub fn query_for_auto_tag(&self, regex: &str, path_prefixes: &[String]) -> AppResult<Vec<Scene>> {
        let pattern = format!("(?i){}", regex);
        check_regex(&pattern)?;

        let mut query =
            String::from("SELECT scenes.* FROM scenes WHERE scenes.path REGEXP ? AND scenes.organized = 0");
        let mut args = vec![Value::Text(pattern)];

        if !path_prefixes.is_empty() {
            let likes: Vec<&str> = path_prefixes.iter().map(|_| "scenes.path LIKE ?").collect();
            query.push_str(&format!(" AND ({})", likes.join(" OR ")));
            for prefix in path_prefixes {
                let separator = std::path::MAIN_SEPARATOR;
                let dir = prefix.trim_end_matches(separator);
                args.push(Value::Text(format!("{}{}%", dir, separator)));
            }
        }

        query.push_str(" ORDER BY scenes.path ASC");
        self.repository().query(&query, &args)
    }

    /// Up to 80 random scenes whose details contain `q`
    pub fn wall(&self, q: Option<&str>) -> AppResult<Vec<Scene>> {
        let repository = self.repository();
        match q.filter(|q| !q.is_empty()) {
            Some(q) => repository.query(
                "SELECT scenes.* FROM scenes WHERE scenes.details LIKE ? ORDER BY RANDOM() LIMIT ?",
                &[Value::Text(format!("%{}%", q)), Value::Integer(WALL_SIZE)],
            ),
            None => repository.query(
                "SELECT scenes.* FROM scenes ORDER BY RANDOM() LIMIT ?",
                &[Value::Integer(WALL_SIZE)],
            ),
        }
    }

    /// Filtered, sorted and paged scenes plus the total number of matches
    pub fn query(&self, filter: &SceneFilter, find_filter: &FindFilter) -> AppResult<(Vec<Scene>, i64)> {
        let mut query = QueryBuilder::new(self.repository(), select_distinct_ids(TABLE));

        if let Some(q) = find_filter.query() {
            query.join("scene_markers", "", "scene_markers.scene_id = scenes.id");
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
    // COVER
    // ========================================================================

    pub fn cover(&self, id: i64) -> AppResult<Option<Vec<u8>>> {
        BlobRepository::new(self.conn, SCENES_COVER).get(id)
    }

    pub fn update_cover(&self, id: i64, image: &[u8]) -> AppResult<()> {
        BlobRepository::new(self.conn, SCENES_COVER).replace(id, image)
    }

    pub fn destroy_cover(&self, id: i64) -> AppResult<()> {
        BlobRepository::new(self.conn, SCENES_COVER).destroy(id)
    }

    // ========================================================================
    // ASSOCIATIONS
    // ========================================================================

    pub fn performer_ids(&self, id: i64) -> AppResult<Vec<i64>> {
        JoinRepository::new(self.conn, PERFORMERS_SCENES).get_ids(id)
    }

    pub fn update_performers(&self, id: i64, performer_ids: &[i64]) -> AppResult<()> {
        JoinRepository::new(self.conn, PERFORMERS_SCENES).replace(id, performer_ids)
    }

    pub fn tag_ids(&self, id: i64) -> AppResult<Vec<i64>> {
        JoinRepository::new(self.conn, SCENES_TAGS).get_ids(id)
    }

    pub fn update_tags(&self, id: i64, tag_ids: &[i64]) -> AppResult<()> {
        JoinRepository::new(self.conn, SCENES_TAGS).replace(id, tag_ids)
    }

    pub fn gallery_ids(&self, id: i64) -> AppResult<Vec<i64>> {
        JoinRepository::new(self.conn, SCENES_GALLERIES).get_ids(id)
    }

    pub fn update_galleries(&self, id: i64, gallery_ids: &[i64]) -> AppResult<()> {
        JoinRepository::new(self.conn, SCENES_GALLERIES).replace(id, gallery_ids)
    }

    /// Movie memberships with their scene index
    pub fn movies(&self, id: i64) -> AppResult<Vec<MoviesScenes>> {
        read_txn(self.conn, |conn| {
            let mut stmt = conn.prepare(
                "SELECT movie_id, scene_id, scene_index FROM movies_scenes WHERE scene_id = ?1",
            )?;
            let movies = stmt
                .query_map(params![id], |row| {
                    Ok(MoviesScenes {
                        movie_id: row.get("movie_id")?,
                        scene_id: row.get("scene_id")?,
                        scene_index: row.get("scene_index")?,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(movies)
        })
    }

    /// Replace the scene's movie memberships; `scene_id` of each entry is ignored
    pub fn update_movies(&self, id: i64, movies: &[MoviesScenes]) -> AppResult<()> {
        let repository = Repository::new(self.conn, MOVIES_SCENES.table, MOVIES_SCENES.id_column);
        repository.destroy(&[id])?;

        for movie in movies {
            repository.insert(&[
                Field::set("movie_id", &movie.movie_id),
                Field::set("scene_id", &id),
                Field::set("scene_index", &movie.scene_index),
            ])?;
        }
        Ok(())
    }

    pub fn stash_ids(&self, id: i64) -> AppResult<Vec<StashId>> {
        StashIdRepository::new(self.conn, SCENE_STASH_IDS).get(id)
    }

    pub fn update_stash_ids(&self, id: i64, stash_ids: &[StashId]) -> AppResult<()> {
        StashIdRepository::new(self.conn, SCENE_STASH_IDS).replace(id, stash_ids)
    }
}

fn sort_spec() -> SortSpec<'static> {
    SortSpec::new(TABLE, "title", SORT_COLUMNS)
        .with_expression("performer_count", PERFORMERS_SCENES.count_expr("scenes.id"))
        .with_expression("tag_count", SCENES_TAGS.count_expr("scenes.id"))
        .with_tie_breakers(SORT_TIE_BREAKERS)
}

fn build_filter(f: &mut FilterBuilder, filter: &SceneFilter) {
    f.handle_criterion(string_criterion_handler(&filter.title, "scenes.title"));
    f.handle_criterion(string_criterion_handler(&filter.details, "scenes.details"));
    f.handle_criterion(string_criterion_handler(&filter.path, "scenes.path"));
    f.handle_criterion(string_criterion_handler(&filter.checksum, "scenes.checksum"));
    f.handle_criterion(string_criterion_handler(&filter.oshash, "scenes.oshash"));
    f.handle_criterion(string_criterion_handler(&filter.url, "scenes.url"));
    f.handle_criterion(int_criterion_handler(&filter.rating, "scenes.rating"));
    f.handle_criterion(int_criterion_handler(&filter.o_counter, "scenes.o_counter"));
    f.handle_criterion(duration_criterion_handler(&filter.duration, "scenes.duration"));
    f.handle_criterion(bool_criterion_handler(filter.organized, "scenes.organized"));
    f.handle_criterion(resolution_criterion_handler(
        filter.resolution,
        "scenes.height",
        "scenes.width",
    ));
    f.handle_criterion(has_markers_handler(filter.has_markers));
    f.handle_criterion(is_missing_handler(filter.is_missing.as_deref()));

    f.handle_criterion(multi_criterion_handler(
        &filter.tags,
        MultiTarget::Relation {
            join: SCENES_TAGS,
            alias: "tags_join",
            owner_expr: "scenes.id",
        },
    ));
    f.handle_criterion(multi_criterion_handler(
        &filter.performers,
        MultiTarget::Relation {
            join: PERFORMERS_SCENES,
            alias: "performers_join",
            owner_expr: "scenes.id",
        },
    ));
    f.handle_criterion(multi_criterion_handler(
        &filter.studios,
        MultiTarget::ForeignKey {
            column: "scenes.studio_id",
        },
    ));
    f.handle_criterion(multi_criterion_handler(
        &filter.movies,
        MultiTarget::Relation {
            join: MOVIES_SCENES,
            alias: "movies_join",
            owner_expr: "scenes.id",
        },
    ));
    f.handle_criterion(multi_criterion_handler(
        &filter.galleries,
        MultiTarget::Relation {
            join: SCENES_GALLERIES,
            alias: "galleries_join",
            owner_expr: "scenes.id",
        },
    ));

    if filter.stash_id.as_deref().is_some_and(|s| !s.is_empty()) {
        SCENE_STASH_IDS
            .as_join()
            .join(f, "scene_stash_ids", "scenes.id");
    }
    f.handle_criterion(string_literal_criterion_handler(
        filter.stash_id.as_deref(),
        "scene_stash_ids.stash_id",
    ));

    f.handle_criterion(count_criterion_handler(
        &filter.performer_count,
        PERFORMERS_SCENES.count_expr("scenes.id"),
    ));
    f.handle_criterion(count_criterion_handler(
        &filter.tag_count,
        SCENES_TAGS.count_expr("scenes.id"),
    ));
}

fn has_markers_handler(has_markers: Option<bool>) -> impl Fn(&mut FilterBuilder) {
    move |f: &mut FilterBuilder| {
        let exists = "EXISTS (SELECT 1 FROM scene_markers WHERE scene_markers.scene_id = scenes.id)";
        match has_markers {
            Some(true) => f.add_where(exists, Vec::new()),
            Some(false) => f.add_where(format!("NOT {}", exists), Vec::new()),
            None => {}
        }
    }
}

fn is_missing_handler<'a>(is_missing: Option<&'a str>) -> impl Fn(&mut FilterBuilder) + 'a {
    move |f: &mut FilterBuilder| match is_missing {
        None | Some("") => {}
        Some(column @ ("title" | "url" | "details")) => {
            f.add_where(blank_text(&format!("scenes.{}", column)), Vec::new())
        }
        Some("date") => f.add_where(blank_date("scenes.date"), Vec::new()),
        Some("studio") => f.add_where("scenes.studio_id IS NULL", Vec::new()),
        Some("galleries") => {
            f.handle_criterion(missing_relation_handler(SCENES_GALLERIES, "galleries_join", "scenes.id"))
        }
        Some("movie") => {
            f.handle_criterion(missing_relation_handler(MOVIES_SCENES, "movies_join", "scenes.id"))
        }
        Some("performers") => f.handle_criterion(missing_relation_handler(
            PERFORMERS_SCENES,
            "performers_join",
            "scenes.id",
        )),
        Some("tags") => {
            f.handle_criterion(missing_relation_handler(SCENES_TAGS, "tags_join", "scenes.id"))
        }
        Some("stash_id") => f.handle_criterion(missing_relation_handler(
            SCENE_STASH_IDS.as_join(),
            "scene_stash_ids",
            "scenes.id",
        )),
        Some("cover") => f.add_where(
            format!("NOT {}", SCENES_COVER.exists_expr("scenes.id")),
            Vec::new(),
        ),
        Some(other) => unknown_missing_key(TABLE, other),
    }
}
