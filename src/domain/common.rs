// src/domain/common.rs
//
// Invariants shared by several entities

use crate::domain::{DomainError, DomainResult};

pub const MIN_RATING: i64 = 1;
pub const MAX_RATING: i64 = 5;

pub fn require_non_empty(field: &'static str, value: &str) -> DomainResult<()> {
    if value.trim().is_empty() {
        return Err(DomainError::EmptyField(field));
    }
    Ok(())
}

/// Unset ratings are valid
pub fn validate_rating(rating: Option<i64>) -> DomainResult<()> {
    match rating {
        Some(r) if !(MIN_RATING..=MAX_RATING).contains(&r) => Err(DomainError::RatingOutOfRange(r)),
        _ => Ok(()),
    }
}

pub fn validate_o_counter(o_counter: i64) -> DomainResult<()> {
    if o_counter < 0 {
        return Err(DomainError::NegativeCounter(o_counter));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rating_bounds() {
        assert!(validate_rating(None).is_ok());
        assert!(validate_rating(Some(1)).is_ok());
        assert!(validate_rating(Some(5)).is_ok());
        assert!(matches!(
            validate_rating(Some(6)),
            Err(DomainError::RatingOutOfRange(6))
        ));
        assert!(validate_rating(Some(0)).is_err());
    }

    #[test]
    fn test_non_empty() {
        assert!(require_non_empty("name", "  ").is_err());
        assert!(require_non_empty("name", "x").is_ok());
    }
}
