// src/domain/image.rs
//
// Image Entity
//
// A still image file, standalone or inside a gallery

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::common::{require_non_empty, validate_o_counter, validate_rating};
use crate::domain::DomainResult;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Image {
    pub id: i64,
    pub path: String,
    pub checksum: String,
    pub title: Option<String>,
    pub rating: Option<i64>,
    pub organized: bool,
    pub o_counter: i64,
    pub size: Option<i64>,
    pub width: Option<i64>,
    pub height: Option<i64>,
    pub studio_id: Option<i64>,
    pub file_mod_time: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Image {
    pub fn new(path: impl Into<String>, checksum: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: 0,
            path: path.into(),
            checksum: checksum.into(),
            title: None,
            rating: None,
            organized: false,
            o_counter: 0,
            size: None,
            width: None,
            height: None,
            studio_id: None,
            file_mod_time: None,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImagePartial {
    pub id: i64,
    pub path: Option<String>,
    pub checksum: Option<String>,
    pub title: Option<Option<String>>,
    pub rating: Option<Option<i64>>,
    pub organized: Option<bool>,
    pub o_counter: Option<i64>,
    pub size: Option<Option<i64>>,
    pub width: Option<Option<i64>>,
    pub height: Option<Option<i64>>,
    pub studio_id: Option<Option<i64>>,
    pub file_mod_time: Option<Option<DateTime<Utc>>>,
}

pub fn validate_image(image: &Image) -> DomainResult<()> {
    require_non_empty("path", &image.path)?;
    require_non_empty("checksum", &image.checksum)?;
    validate_rating(image.rating)?;
    validate_o_counter(image.o_counter)
}
