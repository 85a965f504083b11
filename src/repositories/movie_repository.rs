// src/repositories/movie_repository.rs
//
// Movie persistence and filtering

use rusqlite::types::Value;
use rusqlite::{Connection, Row};
use serde::Deserialize;

use crate::db::blob_repository::{BlobRepository, MOVIES_BACK_IMAGE, MOVIES_FRONT_IMAGE};
use crate::db::fields::{get_date, get_timestamp, Entity, Field, PartialEntity};
use crate::db::join_repository::MOVIES_SCENES;
use crate::db::repository::{select_distinct_ids, Repository, ID_COLUMN};
use crate::domain::common::{require_non_empty, validate_rating};
use crate::domain::movie::{validate_movie, Movie, MoviePartial};
use crate::domain::DomainError;
use crate::error::AppResult;
use crate::query::criterion::{IntCriterion, MultiCriterion, StringCriterion};
use crate::query::filter::FilterBuilder;
use crate::query::find_filter::{FindFilter, SortSpec};
use crate::query::handlers::{
    count_criterion_handler, int_criterion_handler, missing_relation_handler,
    multi_criterion_handler, search_clause, string_criterion_handler, MultiTarget,
};
use crate::query::QueryBuilder;
use crate::repositories::common::{select_by_relation, unknown_missing_key, EntityQueryBuilder};

const TABLE: &str = "movies";

const SEARCH_COLUMNS: &[&str] = &["movies.name", "movies.aliases"];

const SORT_COLUMNS: &[&str] = &[
    "id",
    "name",
    "date",
    "rating",
    "duration",
    "created_at",
    "updated_at",
];

impl Entity for Movie {
    const TABLE: &'static str = TABLE;

    fn id(&self) -> i64 {
        self.id
    }

    fn fields(&self) -> Vec<Field> {
        vec![
            Field::set("name", &self.name),
            Field::set("aliases", &self.aliases),
            Field::set("duration", &self.duration),
            Field::set("date", &self.date),
            Field::set("rating", &self.rating),
            Field::set("studio_id", &self.studio_id),
            Field::set("director", &self.director),
            Field::set("synopsis", &self.synopsis),
            Field::set("url", &self.url),
            Field::set("created_at", &self.created_at),
            Field::set("updated_at", &self.updated_at),
        ]
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Movie {
            id: row.get("id")?,
            name: row.get("name")?,
            aliases: row.get("aliases")?,
            duration: row.get("duration")?,
            date: get_date(row, "date")?,
            rating: row.get("rating")?,
            studio_id: row.get("studio_id")?,
            director: row.get("director")?,
            synopsis: row.get("synopsis")?,
            url: row.get("url")?,
            created_at: get_timestamp(row, "created_at")?,
            updated_at: get_timestamp(row, "updated_at")?,
        })
    }
}

impl PartialEntity for MoviePartial {
    fn id(&self) -> i64 {
        self.id
    }

    fn fields(&self) -> Vec<Field> {
        vec![
            Field::patch("name", &self.name),
            Field::patch("aliases", &self.aliases),
            Field::patch("duration", &self.duration),
            Field::patch("date", &self.date),
            Field::patch("rating", &self.rating),
            Field::patch("studio_id", &self.studio_id),
            Field::patch("director", &self.director),
            Field::patch("synopsis", &self.synopsis),
            Field::patch("url", &self.url),
        ]
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MovieFilter {
    pub name: StringCriterion,
    pub director: StringCriterion,
    pub synopsis: StringCriterion,
    pub aliases: StringCriterion,
    pub rating: IntCriterion,
    /// Whole seconds
    pub duration: IntCriterion,
    pub studios: MultiCriterion,
    pub is_missing: Option<String>,
    pub scene_count: IntCriterion,
}

pub struct MovieQueryBuilder<'a> {
    conn: &'a Connection,
}

impl<'a> EntityQueryBuilder<'a> for MovieQueryBuilder<'a> {
    type Record = Movie;
    type Partial = MoviePartial;

    fn repository(&self) -> Repository<'a> {
        Repository::new(self.conn, TABLE, ID_COLUMN)
    }

    fn validate(&self, movie: &Movie) -> AppResult<()> {
        Ok(validate_movie(movie)?)
    }

    fn validate_partial(&self, partial: &MoviePartial) -> AppResult<()> {
        if let Some(name) = &partial.name {
            require_non_empty("name", name)?;
        }
        if let Some(rating) = partial.rating {
            validate_rating(rating)?;
        }
        match partial.duration {
            Some(Some(duration)) if duration < 0 => Err(DomainError::InvariantViolation(format!(
                "Movie {} given negative duration {}",
                partial.id, duration
            ))
            .into()),
            _ => Ok(()),
        }
    }
}

impl<'a> MovieQueryBuilder<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    pub fn find_by_name(&self, name: &str, nocase: bool) -> AppResult<Option<Movie>> {
        let collate = if nocase { " COLLATE NOCASE" } else { "" };
        let query = format!(
            "SELECT * FROM movies WHERE movies.name{} = ? ORDER BY movies.id ASC LIMIT 1",
            collate
        );
        self.repository()
            .query_one(&query, &[Value::Text(name.to_string())])
    }

    pub fn find_by_scene(&self, scene_id: i64) -> AppResult<Vec<Movie>> {
        self.repository().query(
            &select_by_relation(TABLE, MOVIES_SCENES.reversed()),
            &[Value::Integer(scene_id)],
        )
    }

    pub fn query(&self, filter: &MovieFilter, find_filter: &FindFilter) -> AppResult<(Vec<Movie>, i64)> {
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

    pub fn front_image(&self, id: i64) -> AppResult<Option<Vec<u8>>> {
        BlobRepository::new(self.conn, MOVIES_FRONT_IMAGE).get(id)
    }

    pub fn update_front_image(&self, id: i64, image: &[u8]) -> AppResult<()> {
        BlobRepository::new(self.conn, MOVIES_FRONT_IMAGE).replace(id, image)
    }

    pub fn destroy_front_image(&self, id: i64) -> AppResult<()> {
        BlobRepository::new(self.conn, MOVIES_FRONT_IMAGE).destroy(id)
    }

    pub fn back_image(&self, id: i64) -> AppResult<Option<Vec<u8>>> {
        BlobRepository::new(self.conn, MOVIES_BACK_IMAGE).get(id)
    }

    pub fn update_back_image(&self, id: i64, image: &[u8]) -> AppResult<()> {
        BlobRepository::new(self.conn, MOVIES_BACK_IMAGE).replace(id, image)
    }

    pub fn destroy_back_image(&self, id: i64) -> AppResult<()> {
        BlobRepository::new(self.conn, MOVIES_BACK_IMAGE).destroy(id)
    }
}

fn sort_spec() -> SortSpec<'static> {
    SortSpec::new(TABLE, "name", SORT_COLUMNS).with_expression(
        "scenes_count",
        MOVIES_SCENES.reversed().count_expr("movies.id"),
    )
}

fn build_filter(f: &mut FilterBuilder, filter: &MovieFilter) {
    f.handle_criterion(string_criterion_handler(&filter.name, "movies.name"));
    f.handle_criterion(string_criterion_handler(&filter.director, "movies.director"));
    f.handle_criterion(string_criterion_handler(&filter.synopsis, "movies.synopsis"));
    f.handle_criterion(string_criterion_handler(&filter.aliases, "movies.aliases"));
    f.handle_criterion(int_criterion_handler(&filter.rating, "movies.rating"));
    f.handle_criterion(int_criterion_handler(&filter.duration, "movies.duration"));
    f.handle_criterion(multi_criterion_handler(
        &filter.studios,
        MultiTarget::ForeignKey {
            column: "movies.studio_id",
        },
    ));

    match filter.is_missing.as_deref() {
        None | Some("") => {}
        Some("front_image") => f.add_where(
            format!("NOT {}", MOVIES_FRONT_IMAGE.exists_expr("movies.id")),
            Vec::new(),
        ),
        Some("back_image") => f.add_where(
            format!("NOT {}", MOVIES_BACK_IMAGE.exists_expr("movies.id")),
            Vec::new(),
        ),
        Some("scenes") => f.handle_criterion(missing_relation_handler(
            MOVIES_SCENES.reversed(),
            "scenes_join",
            "movies.id",
        )),
        Some("studio") => f.add_where("movies.studio_id IS NULL", Vec::new()),
        Some(other) => unknown_missing_key(TABLE, other),
    }

    f.handle_criterion(count_criterion_handler(
        &filter.scene_count,
        MOVIES_SCENES.reversed().count_expr("movies.id"),
    ));
}
