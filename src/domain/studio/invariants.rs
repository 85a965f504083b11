use super::entity::{Studio, StudioPartial};
use crate::domain::common::require_non_empty;
use crate::domain::{DomainError, DomainResult};

/// Validates all Studio invariants
pub fn validate_studio(studio: &Studio) -> DomainResult<()> {
    require_non_empty("name", &studio.name)?;
    validate_parent(studio.id, studio.parent_id)?;
    Ok(())
}

/// Validates the fields a partial update touches
pub fn validate_studio_partial(partial: &StudioPartial) -> DomainResult<()> {
    if let Some(name) = &partial.name {
        require_non_empty("name", name)?;
    }
    if let Some(parent_id) = partial.parent_id {
        validate_parent(partial.id, parent_id)?;
    }
    Ok(())
}

/// Unsaved studios (id 0) cannot reference themselves yet
fn validate_parent(id: i64, parent_id: Option<i64>) -> DomainResult<()> {
    if id != 0 && parent_id == Some(id) {
        return Err(DomainError::SelfParent(id));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_studio() {
        let mut studio = Studio::new("Acme");
        studio.id = 3;
        studio.parent_id = Some(1);
        assert!(validate_studio(&studio).is_ok());
    }

    #[test]
    fn test_self_parent_fails() {
        let mut studio = Studio::new("Acme");
        studio.id = 3;
        studio.parent_id = Some(3);
        assert!(matches!(validate_studio(&studio), Err(DomainError::SelfParent(3))));

        let partial = StudioPartial {
            parent_id: Some(Some(4)),
            ..StudioPartial::new(4)
        };
        assert!(validate_studio_partial(&partial).is_err());
    }

    #[test]
    fn test_clearing_parent_is_valid() {
        let partial = StudioPartial {
            parent_id: Some(None),
            ..StudioPartial::new(4)
        };
        assert!(validate_studio_partial(&partial).is_ok());
    }
}
