use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// A video file in the library
///
/// A scene is identified by its path and by at least one content hash
/// (`checksum` or `oshash`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scene {
    pub id: i64,

    pub path: String,

    /// SHA-256 of the file contents
    pub checksum: Option<String>,

    /// Size plus head/tail hash, cheap to compute on large files
    pub oshash: Option<String>,

    pub title: Option<String>,
    pub details: Option<String>,
    pub url: Option<String>,
    pub date: Option<NaiveDate>,

    /// 1..=5
    pub rating: Option<i64>,

    pub organized: bool,

    pub o_counter: i64,

    /// File size in bytes, stored as text
    pub size: Option<String>,

    /// Seconds, fractional
    pub duration: Option<f64>,

    pub video_codec: Option<String>,
    pub format: Option<String>,
    pub audio_codec: Option<String>,
    pub width: Option<i64>,
    pub height: Option<i64>,
    pub framerate: Option<f64>,
    pub bitrate: Option<i64>,

    pub studio_id: Option<i64>,

    pub file_mod_time: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Scene {
    pub fn new(path: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: 0,
            path: path.into(),
            checksum: None,
            oshash: None,
            title: None,
            details: None,
            url: None,
            date: None,
            rating: None,
            organized: false,
            o_counter: 0,
            size: None,
            duration: None,
            video_codec: None,
            format: None,
            audio_codec: None,
            width: None,
            height: None,
            framerate: None,
            bitrate: None,
            studio_id: None,
            file_mod_time: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Shorter side of the frame, when known
    pub fn short_side(&self) -> Option<i64> {
        match (self.width, self.height) {
            (Some(w), Some(h)) => Some(w.min(h)),
            _ => None,
        }
    }
}

/// Partial scene update
///
/// `None` leaves a column alone; `Some(None)` clears a nullable column.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScenePartial {
    pub id: i64,
    pub path: Option<String>,
    pub checksum: Option<Option<String>>,
    pub oshash: Option<Option<String>>,
    pub title: Option<Option<String>>,
    pub details: Option<Option<String>>,
    pub url: Option<Option<String>>,
    pub date: Option<Option<NaiveDate>>,
    pub rating: Option<Option<i64>>,
    pub organized: Option<bool>,
    pub o_counter: Option<i64>,
    pub size: Option<Option<String>>,
    pub duration: Option<Option<f64>>,
    pub video_codec: Option<Option<String>>,
    pub format: Option<Option<String>>,
    pub audio_codec: Option<Option<String>>,
    pub width: Option<Option<i64>>,
    pub height: Option<Option<i64>>,
    pub framerate: Option<Option<f64>>,
    pub bitrate: Option<Option<i64>>,
    pub studio_id: Option<Option<i64>>,
    pub file_mod_time: Option<Option<DateTime<Utc>>>,
}

impl ScenePartial {
    pub fn new(id: i64) -> Self {
        Self {
            id,
            ..Default::default()
        }
    }
}

/// A titled point in time within a scene
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneMarker {
    pub id: i64,
    pub title: String,
    pub seconds: f64,
    pub scene_id: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SceneMarker {
    pub fn new(scene_id: i64, title: impl Into<String>, seconds: f64) -> Self {
        let now = Utc::now();
        Self {
            id: 0,
            title: title.into(),
            seconds,
            scene_id,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SceneMarkerPartial {
    pub id: i64,
    pub title: Option<String>,
    pub seconds: Option<f64>,
}

/// Membership of a scene in a movie, with its position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoviesScenes {
    pub movie_id: i64,
    pub scene_id: i64,
    pub scene_index: Option<i64>,
}
