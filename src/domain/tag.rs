// src/domain/tag.rs
//
// Tag Entity
//
// Tags are free-form labels attached to scenes, images, galleries and
// performers. Names are unique (case-sensitive in the store).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::common::require_non_empty;
use crate::domain::DomainResult;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tag {
    pub id: i64,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Tag {
    pub fn new(name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: 0,
            name: name.into(),
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TagPartial {
    pub id: i64,
    pub name: Option<String>,
}

pub fn validate_tag(tag: &Tag) -> DomainResult<()> {
    require_non_empty("name", &tag.name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_tag() {
        assert!(validate_tag(&Tag::new("outdoor")).is_ok());
        assert!(validate_tag(&Tag::new(" ")).is_err());
    }
}
