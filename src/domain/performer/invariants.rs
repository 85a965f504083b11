use super::entity::{Performer, PerformerPartial};
use crate::domain::common::require_non_empty;
use crate::domain::{DomainError, DomainResult};
use chrono::{NaiveDate, Utc};

/// Validates all Performer invariants
pub fn validate_performer(performer: &Performer) -> DomainResult<()> {
    require_non_empty("name", &performer.name)?;
    validate_birthdate(&performer.name, performer.birthdate)?;
    Ok(())
}

pub fn validate_performer_partial(partial: &PerformerPartial) -> DomainResult<()> {
    if let Some(name) = &partial.name {
        require_non_empty("name", name)?;
    }
    if let Some(birthdate) = partial.birthdate {
        validate_birthdate(&partial.id.to_string(), birthdate)?;
    }
    Ok(())
}

/// Birthdate cannot be in the future
fn validate_birthdate(performer: &str, birthdate: Option<NaiveDate>) -> DomainResult<()> {
    if let Some(birthdate) = birthdate {
        if birthdate > Utc::now().date_naive() {
            return Err(DomainError::InvariantViolation(format!(
                "Performer {} has a birthdate in the future",
                performer
            )));
        }
    }
    Ok(())
}
