pub mod entity;
pub mod invariants;

pub use entity::{MoviesScenes, Scene, SceneMarker, SceneMarkerPartial, ScenePartial};
pub use invariants::{validate_scene, validate_scene_marker};
