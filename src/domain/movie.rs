// src/domain/movie.rs
//
// Movie Entity
//
// A movie groups scenes in order (see MoviesScenes) and carries
// front/back cover images in a separate table.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::common::{require_non_empty, validate_rating};
use crate::domain::{DomainError, DomainResult};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Movie {
    pub id: i64,
    pub name: String,
    pub aliases: Option<String>,
    /// Whole seconds
    pub duration: Option<i64>,
    pub date: Option<NaiveDate>,
    pub rating: Option<i64>,
    pub studio_id: Option<i64>,
    pub director: Option<String>,
    pub synopsis: Option<String>,
    pub url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Movie {
    pub fn new(name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: 0,
            name: name.into(),
            aliases: None,
            duration: None,
            date: None,
            rating: None,
            studio_id: None,
            director: None,
            synopsis: None,
            url: None,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MoviePartial {
    pub id: i64,
    pub name: Option<String>,
    pub aliases: Option<Option<String>>,
    pub duration: Option<Option<i64>>,
    pub date: Option<Option<NaiveDate>>,
    pub rating: Option<Option<i64>>,
    pub studio_id: Option<Option<i64>>,
    pub director: Option<Option<String>>,
    pub synopsis: Option<Option<String>>,
    pub url: Option<Option<String>>,
}

pub fn validate_movie(movie: &Movie) -> DomainResult<()> {
    require_non_empty("name", &movie.name)?;
    validate_rating(movie.rating)?;
    if let Some(duration) = movie.duration.filter(|d| *d < 0) {
        return Err(DomainError::InvariantViolation(format!(
            "Movie {} has negative duration {}",
            movie.name, duration
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_movie() {
        let mut movie = Movie::new("Feature");
        movie.duration = Some(5400);
        assert!(validate_movie(&movie).is_ok());

        movie.duration = Some(-1);
        assert!(validate_movie(&movie).is_err());
    }
}
