use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A production studio; studios form a tree through `parent_id`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Studio {
    pub id: i64,
    pub name: String,
    pub url: Option<String>,
    pub details: Option<String>,
    pub parent_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Studio {
    pub fn new(name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: 0,
            name: name.into(),
            url: None,
            details: None,
            parent_id: None,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct StudioPartial {
    pub id: i64,
    pub name: Option<String>,
    pub url: Option<Option<String>>,
    pub details: Option<Option<String>>,
    pub parent_id: Option<Option<i64>>,
}

impl StudioPartial {
    pub fn new(id: i64) -> Self {
        Self {
            id,
            ..Default::default()
        }
    }
}
