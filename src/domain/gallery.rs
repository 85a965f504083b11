// src/domain/gallery.rs
//
// Gallery Entity
//
// A set of images. Zip galleries are backed by an archive at `path`;
// galleries without a path are user-created collections.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::common::{require_non_empty, validate_rating};
use crate::domain::DomainResult;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Gallery {
    pub id: i64,
    pub path: Option<String>,
    pub checksum: String,
    pub zip: bool,
    pub title: Option<String>,
    pub url: Option<String>,
    pub date: Option<NaiveDate>,
    pub details: Option<String>,
    pub rating: Option<i64>,
    pub organized: bool,
    pub studio_id: Option<i64>,
    pub file_mod_time: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Gallery {
    pub fn new(checksum: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: 0,
            path: None,
            checksum: checksum.into(),
            zip: false,
            title: None,
            url: None,
            date: None,
            details: None,
            rating: None,
            organized: false,
            studio_id: None,
            file_mod_time: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn from_archive(path: impl Into<String>, checksum: impl Into<String>) -> Self {
        Self {
            path: Some(path.into()),
            zip: true,
            ..Self::new(checksum)
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GalleryPartial {
    pub id: i64,
    pub path: Option<Option<String>>,
    pub checksum: Option<String>,
    pub zip: Option<bool>,
    pub title: Option<Option<String>>,
    pub url: Option<Option<String>>,
    pub date: Option<Option<NaiveDate>>,
    pub details: Option<Option<String>>,
    pub rating: Option<Option<i64>>,
    pub organized: Option<bool>,
    pub studio_id: Option<Option<i64>>,
    pub file_mod_time: Option<Option<DateTime<Utc>>>,
}

pub fn validate_gallery(gallery: &Gallery) -> DomainResult<()> {
    require_non_empty("checksum", &gallery.checksum)?;
    if let Some(path) = &gallery.path {
        require_non_empty("path", path)?;
    }
    validate_rating(gallery.rating)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_gallery() {
        assert!(validate_gallery(&Gallery::from_archive("/g/set.zip", "abc")).is_ok());
        assert!(validate_gallery(&Gallery::new("abc")).is_ok());

        let mut gallery = Gallery::new("abc");
        gallery.rating = Some(0);
        assert!(validate_gallery(&gallery).is_err());
    }
}
