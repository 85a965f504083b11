use super::entity::{Scene, SceneMarker};
use crate::domain::common::{require_non_empty, validate_o_counter, validate_rating};
use crate::domain::{DomainError, DomainResult};

/// Validates all Scene invariants
pub fn validate_scene(scene: &Scene) -> DomainResult<()> {
    require_non_empty("path", &scene.path)?;
    validate_hashes(scene)?;
    validate_rating(scene.rating)?;
    validate_o_counter(scene.o_counter)?;
    Ok(())
}

/// A scene must be identifiable by content
fn validate_hashes(scene: &Scene) -> DomainResult<()> {
    let present = |h: &Option<String>| h.as_deref().is_some_and(|h| !h.is_empty());
    if !present(&scene.checksum) && !present(&scene.oshash) {
        return Err(DomainError::InvariantViolation(format!(
            "Scene {} has neither checksum nor oshash",
            scene.path
        )));
    }
    Ok(())
}

pub fn validate_scene_marker(marker: &SceneMarker) -> DomainResult<()> {
    require_non_empty("title", &marker.title)?;
    if marker.seconds < 0.0 {
        return Err(DomainError::InvariantViolation(format!(
            "Marker '{}' starts at negative time {}",
            marker.title, marker.seconds
        )));
    }
    Ok(())
}

/// Scene Invariants:
///
/// 1. Path is non-empty and unique (unique index)
/// 2. At least one of checksum/oshash is set
/// 3. Rating, when set, is 1..=5
/// 4. O-counter never goes below zero

#[cfg(test)]
mod tests {
    use super::*;

    fn hashed(path: &str) -> Scene {
        let mut scene = Scene::new(path);
        scene.oshash = Some("0123456789abcdef".to_string());
        scene
    }

    #[test]
    fn test_valid_scene() {
        assert!(validate_scene(&hashed("/media/a.mp4")).is_ok());
    }

    #[test]
    fn test_scene_requires_a_hash() {
        let scene = Scene::new("/media/a.mp4");
        assert!(matches!(
            validate_scene(&scene),
            Err(DomainError::InvariantViolation(_))
        ));
    }

    #[test]
    fn test_scene_rejects_bad_rating_and_counter() {
        let mut scene = hashed("/media/a.mp4");
        scene.rating = Some(9);
        assert!(validate_scene(&scene).is_err());

        let mut scene = hashed("/media/a.mp4");
        scene.o_counter = -1;
        assert!(matches!(
            validate_scene(&scene),
            Err(DomainError::NegativeCounter(-1))
        ));
    }

    #[test]
    fn test_marker_time() {
        let marker = SceneMarker::new(1, "intro", -1.0);
        assert!(validate_scene_marker(&marker).is_err());
    }
}
