// src/repositories/scene_marker_repository.rs
//
// Scene marker persistence

use rusqlite::types::Value;
use rusqlite::{Connection, Row};

use crate::db::fields::{get_timestamp, Entity, Field, PartialEntity};
use crate::db::repository::{build_count_query, Repository, ID_COLUMN};
use crate::domain::common::require_non_empty;
use crate::domain::scene::{validate_scene_marker, SceneMarker, SceneMarkerPartial};
use crate::domain::DomainError;
use crate::error::AppResult;
use crate::repositories::common::EntityQueryBuilder;

const TABLE: &str = "scene_markers";

impl Entity for SceneMarker {
    const TABLE: &'static str = TABLE;

    fn id(&self) -> i64 {
        self.id
    }

    fn fields(&self) -> Vec<Field> {
        vec![
            Field::set("title", &self.title),
            Field::set("seconds", &self.seconds),
            Field::set("scene_id", &self.scene_id),
            Field::set("created_at", &self.created_at),
            Field::set("updated_at", &self.updated_at),
        ]
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(SceneMarker {
            id: row.get("id")?,
            title: row.get("title")?,
            seconds: row.get("seconds")?,
            scene_id: row.get("scene_id")?,
            created_at: get_timestamp(row, "created_at")?,
            updated_at: get_timestamp(row, "updated_at")?,
        })
    }
}

impl PartialEntity for SceneMarkerPartial {
    fn id(&self) -> i64 {
        self.id
    }

    fn fields(&self) -> Vec<Field> {
        vec![
            Field::patch("title", &self.title),
            Field::patch("seconds", &self.seconds),
        ]
    }
}

pub struct SceneMarkerQueryBuilder<'a> {
    conn: &'a Connection,
}

impl<'a> EntityQueryBuilder<'a> for SceneMarkerQueryBuilder<'a> {
    type Record = SceneMarker;
    type Partial = SceneMarkerPartial;

    fn repository(&self) -> Repository<'a> {
        Repository::new(self.conn, TABLE, ID_COLUMN)
    }

    fn validate(&self, marker: &SceneMarker) -> AppResult<()> {
        Ok(validate_scene_marker(marker)?)
    }

    fn validate_partial(&self, partial: &SceneMarkerPartial) -> AppResult<()> {
        if let Some(title) = &partial.title {
            require_non_empty("title", title)?;
        }
        if let Some(seconds) = partial.seconds.filter(|s| *s < 0.0) {
            return Err(DomainError::InvariantViolation(format!(
                "Marker {} moved to negative time {}",
                partial.id, seconds
            ))
            .into());
        }
        Ok(())
    }
}

impl<'a> SceneMarkerQueryBuilder<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Markers of one scene in playback order
    pub fn find_by_scene(&self, scene_id: i64) -> AppResult<Vec<SceneMarker>> {
        self.repository().query(
            "SELECT * FROM scene_markers WHERE scene_id = ? ORDER BY seconds ASC, id ASC",
            &[Value::Integer(scene_id)],
        )
    }

    pub fn count_by_scene(&self, scene_id: i64) -> AppResult<i64> {
        self.repository().run_count(
            &build_count_query("SELECT id FROM scene_markers WHERE scene_id = ?"),
            &[Value::Integer(scene_id)],
        )
    }
}
