// src/repositories/performer_repository.rs
//
// Performer persistence and filtering
//
// Gender is stored as its SCREAMING_SNAKE_CASE name; an unknown stored
// value is a conversion error, not a silent None.

use rusqlite::types::{Type, Value};
use rusqlite::{Connection, Row};
use serde::Deserialize;

use crate::db::blob_repository::{BlobRepository, PERFORMERS_IMAGE};
use crate::db::fields::{get_date, get_timestamp, Entity, Field, PartialEntity, ToValue};
use crate::db::join_repository::{PERFORMERS_GALLERIES, PERFORMERS_IMAGES, PERFORMERS_SCENES};
use crate::db::repository::{in_binding, select_distinct_ids, Repository, ID_COLUMN};
use crate::db::stash_id_repository::{StashId, StashIdRepository, PERFORMER_STASH_IDS};
use crate::domain::performer::{
    validate_performer, validate_performer_partial, Gender, Performer, PerformerPartial,
};
use crate::error::AppResult;
use crate::query::criterion::{IntCriterion, StringCriterion};
use crate::query::filter::FilterBuilder;
use crate::query::find_filter::{FindFilter, SortSpec};
use crate::query::handlers::{
    bool_criterion_handler, count_criterion_handler, int_criterion_handler,
    missing_relation_handler, search_clause, string_criterion_handler,
    string_literal_criterion_handler,
};
use crate::query::QueryBuilder;
use crate::repositories::common::{
    blank_date, blank_text, select_by_relation, unknown_missing_key, EntityQueryBuilder,
};

const TABLE: &str = "performers";

const SEARCH_COLUMNS: &[&str] = &["performers.name", "performers.aliases"];

const SORT_COLUMNS: &[&str] = &[
    "id",
    "name",
    "birthdate",
    "height",
    "favorite",
    "created_at",
    "updated_at",
];

/// Nullable text columns `is_missing` accepts
const OPTIONAL_TEXT_COLUMNS: &[&str] = &[
    "gender",
    "url",
    "twitter",
    "instagram",
    "ethnicity",
    "country",
    "eye_color",
    "height",
    "measurements",
    "fake_tits",
    "career_length",
    "tattoos",
    "piercings",
    "aliases",
];

const BIRTH_YEAR_EXPR: &str = "CAST(strftime('%Y', performers.birthdate) AS INTEGER)";

impl ToValue for Gender {
    fn to_value(&self) -> Value {
        Value::Text(self.as_str().to_string())
    }
}

fn get_gender(row: &Row<'_>) -> rusqlite::Result<Option<Gender>> {
    let raw: Option<String> = row.get("gender")?;
    raw.filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<Gender>().map_err(|e| {
                let index = row.as_ref().column_index("gender").unwrap_or(0);
                rusqlite::Error::FromSqlConversionFailure(index, Type::Text, Box::new(e))
            })
        })
        .transpose()
}

impl Entity for Performer {
    const TABLE: &'static str = TABLE;

    fn id(&self) -> i64 {
        self.id
    }

    fn fields(&self) -> Vec<Field> {
        vec![
            Field::set("name", &self.name),
            Field::set("gender", &self.gender),
            Field::set("url", &self.url),
            Field::set("twitter", &self.twitter),
            Field::set("instagram", &self.instagram),
            Field::set("birthdate", &self.birthdate),
            Field::set("ethnicity", &self.ethnicity),
            Field::set("country", &self.country),
            Field::set("eye_color", &self.eye_color),
            Field::set("height", &self.height),
            Field::set("measurements", &self.measurements),
            Field::set("fake_tits", &self.fake_tits),
            Field::set("career_length", &self.career_length),
            Field::set("tattoos", &self.tattoos),
            Field::set("piercings", &self.piercings),
            Field::set("aliases", &self.aliases),
            Field::set("favorite", &self.favorite),
            Field::set("created_at", &self.created_at),
            Field::set("updated_at", &self.updated_at),
        ]
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Performer {
            id: row.get("id")?,
            name: row.get("name")?,
            gender: get_gender(row)?,
            url: row.get("url")?,
            twitter: row.get("twitter")?,
            instagram: row.get("instagram")?,
            birthdate: get_date(row, "birthdate")?,
            ethnicity: row.get("ethnicity")?,
            country: row.get("country")?,
            eye_color: row.get("eye_color")?,
            height: row.get("height")?,
            measurements: row.get("measurements")?,
            fake_tits: row.get("fake_tits")?,
            career_length: row.get("career_length")?,
            tattoos: row.get("tattoos")?,
            piercings: row.get("piercings")?,
            aliases: row.get("aliases")?,
            favorite: row.get("favorite")?,
            created_at: get_timestamp(row, "created_at")?,
            updated_at: get_timestamp(row, "updated_at")?,
        })
    }
}

impl PartialEntity for PerformerPartial {
    fn id(&self) -> i64 {
        self.id
    }

    fn fields(&self) -> Vec<Field> {
        vec![
            Field::patch("name", &self.name),
            Field::patch("gender", &self.gender),
            Field::patch("url", &self.url),
            Field::patch("twitter", &self.twitter),
            Field::patch("instagram", &self.instagram),
            Field::patch("birthdate", &self.birthdate),
            Field::patch("ethnicity", &self.ethnicity),
            Field::patch("country", &self.country),
            Field::patch("eye_color", &self.eye_color),
            Field::patch("height", &self.height),
            Field::patch("measurements", &self.measurements),
            Field::patch("fake_tits", &self.fake_tits),
            Field::patch("career_length", &self.career_length),
            Field::patch("tattoos", &self.tattoos),
            Field::patch("piercings", &self.piercings),
            Field::patch("aliases", &self.aliases),
            Field::patch("favorite", &self.favorite),
        ]
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PerformerFilter {
    pub name: StringCriterion,
    pub aliases: StringCriterion,
    pub url: StringCriterion,
    pub twitter: StringCriterion,
    pub instagram: StringCriterion,
    pub ethnicity: StringCriterion,
    pub country: StringCriterion,
    pub eye_color: StringCriterion,
    pub height: StringCriterion,
    pub measurements: StringCriterion,
    pub fake_tits: StringCriterion,
    pub career_length: StringCriterion,
    pub tattoos: StringCriterion,
    pub piercings: StringCriterion,
    pub favorite: Option<bool>,
    pub gender: Option<Gender>,
    pub birth_year: IntCriterion,
    pub is_missing: Option<String>,
    pub scene_count: IntCriterion,
    pub image_count: IntCriterion,
    pub gallery_count: IntCriterion,
    pub stash_id: Option<String>,
}

pub struct PerformerQueryBuilder<'a> {
    conn: &'a Connection,
}

impl<'a> EntityQueryBuilder<'a> for PerformerQueryBuilder<'a> {
    type Record = Performer;
    type Partial = PerformerPartial;

    fn repository(&self) -> Repository<'a> {
        Repository::new(self.conn, TABLE, ID_COLUMN)
    }

    fn validate(&self, performer: &Performer) -> AppResult<()> {
        Ok(validate_performer(performer)?)
    }

    fn validate_partial(&self, partial: &PerformerPartial) -> AppResult<()> {
        Ok(validate_performer_partial(partial)?)
    }
}

impl<'a> PerformerQueryBuilder<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Performers whose name is one of `names`
    pub fn find_by_names(&self, names: &[String], nocase: bool) -> AppResult<Vec<Performer>> {
        if names.is_empty() {
            return Ok(Vec::new());
        }
        let collate = if nocase { " COLLATE NOCASE" } else { "" };
        let query = format!(
            "SELECT * FROM performers WHERE performers.name{} IN {} ORDER BY performers.name ASC",
            collate,
            in_binding(names.len())
        );
        let args: Vec<Value> = names.iter().map(|n| Value::Text(n.clone())).collect();
        self.repository().query(&query, &args)
    }

    pub fn find_by_scene(&self, scene_id: i64) -> AppResult<Vec<Performer>> {
        self.repository().query(
            &select_by_relation(TABLE, PERFORMERS_SCENES.reversed()),
            &[Value::Integer(scene_id)],
        )
    }

    pub fn find_by_image(&self, image_id: i64) -> AppResult<Vec<Performer>> {
        self.repository().query(
            &select_by_relation(TABLE, PERFORMERS_IMAGES.reversed()),
            &[Value::Integer(image_id)],
        )
    }

    pub fn find_by_gallery(&self, gallery_id: i64) -> AppResult<Vec<Performer>> {
        self.repository().query(
            &select_by_relation(TABLE, PERFORMERS_GALLERIES.reversed()),
            &[Value::Integer(gallery_id)],
        )
    }

    pub fn query(
        &self,
        filter: &PerformerFilter,
        find_filter: &FindFilter,
    ) -> AppResult<(Vec<Performer>, i64)> {
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

    pub fn image(&self, id: i64) -> AppResult<Option<Vec<u8>>> {
        BlobRepository::new(self.conn, PERFORMERS_IMAGE).get(id)
    }

    pub fn update_image(&self, id: i64, image: &[u8]) -> AppResult<()> {
        BlobRepository::new(self.conn, PERFORMERS_IMAGE).replace(id, image)
    }

    pub fn destroy_image(&self, id: i64) -> AppResult<()> {
        BlobRepository::new(self.conn, PERFORMERS_IMAGE).destroy(id)
    }

    pub fn stash_ids(&self, id: i64) -> AppResult<Vec<StashId>> {
        StashIdRepository::new(self.conn, PERFORMER_STASH_IDS).get(id)
    }

    pub fn update_stash_ids(&self, id: i64, stash_ids: &[StashId]) -> AppResult<()> {
        StashIdRepository::new(self.conn, PERFORMER_STASH_IDS).replace(id, stash_ids)
    }
}

fn sort_spec() -> SortSpec<'static> {
    SortSpec::new(TABLE, "name", SORT_COLUMNS)
        .with_expression("birth_year", BIRTH_YEAR_EXPR.to_string())
        .with_expression(
            "scenes_count",
            PERFORMERS_SCENES.reversed().count_expr("performers.id"),
        )
}

fn build_filter(f: &mut FilterBuilder, filter: &PerformerFilter) {
    let text_criteria: [(&StringCriterion, &str); 14] = [
        (&filter.name, "performers.name"),
        (&filter.aliases, "performers.aliases"),
        (&filter.url, "performers.url"),
        (&filter.twitter, "performers.twitter"),
        (&filter.instagram, "performers.instagram"),
        (&filter.ethnicity, "performers.ethnicity"),
        (&filter.country, "performers.country"),
        (&filter.eye_color, "performers.eye_color"),
        (&filter.height, "performers.height"),
        (&filter.measurements, "performers.measurements"),
        (&filter.fake_tits, "performers.fake_tits"),
        (&filter.career_length, "performers.career_length"),
        (&filter.tattoos, "performers.tattoos"),
        (&filter.piercings, "performers.piercings"),
    ];
    for (criterion, column) in text_criteria {
        f.handle_criterion(string_criterion_handler(criterion, column));
    }

    f.handle_criterion(bool_criterion_handler(filter.favorite, "performers.favorite"));
    f.handle_criterion(string_literal_criterion_handler(
        filter.gender.map(|g| g.as_str()),
        "performers.gender",
    ));
    f.handle_criterion(int_criterion_handler(&filter.birth_year, BIRTH_YEAR_EXPR));

    match filter.is_missing.as_deref() {
        None | Some("") => {}
        Some(column) if OPTIONAL_TEXT_COLUMNS.iter().any(|c| *c == column) => {
            f.add_where(blank_text(&format!("performers.{}", column)), Vec::new())
        }
        Some("birthdate") => f.add_where(blank_date("performers.birthdate"), Vec::new()),
        Some("image") => f.add_where(
            format!("NOT {}", PERFORMERS_IMAGE.exists_expr("performers.id")),
            Vec::new(),
        ),
        Some("scenes") => f.handle_criterion(missing_relation_handler(
            PERFORMERS_SCENES.reversed(),
            "scenes_join",
            "performers.id",
        )),
        Some("stash_id") => f.handle_criterion(missing_relation_handler(
            PERFORMER_STASH_IDS.as_join(),
            "performer_stash_ids",
            "performers.id",
        )),
        Some(other) => unknown_missing_key(TABLE, other),
    }

    f.handle_criterion(count_criterion_handler(
        &filter.scene_count,
        PERFORMERS_SCENES.reversed().count_expr("performers.id"),
    ));
    f.handle_criterion(count_criterion_handler(
        &filter.image_count,
        PERFORMERS_IMAGES.reversed().count_expr("performers.id"),
    ));
    f.handle_criterion(count_criterion_handler(
        &filter.gallery_count,
        PERFORMERS_GALLERIES.reversed().count_expr("performers.id"),
    ));

    if filter.stash_id.as_deref().is_some_and(|s| !s.is_empty()) {
        PERFORMER_STASH_IDS
            .as_join()
            .join(f, "performer_stash_ids", "performers.id");
    }
    f.handle_criterion(string_literal_criterion_handler(
        filter.stash_id.as_deref(),
        "performer_stash_ids.stash_id",
    ));
}
