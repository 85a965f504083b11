// src/domain/mod.rs
//
// Domain Root - entity types and their invariants
//
// All other modules import from `crate::domain::*`

// ============================================================================
// MODULE DECLARATIONS
// ============================================================================

pub mod common;
pub mod gallery;
pub mod image;
pub mod movie;
pub mod performer;
pub mod scene;
pub mod studio;
pub mod tag;

// ============================================================================
// PUBLIC API RE-EXPORTS
// ============================================================================

pub use gallery::{validate_gallery, Gallery, GalleryPartial};
pub use image::{validate_image, Image, ImagePartial};
pub use movie::{validate_movie, Movie, MoviePartial};
pub use performer::{validate_performer, Gender, Performer, PerformerPartial};
pub use scene::{validate_scene, MoviesScenes, Scene, SceneMarker, SceneMarkerPartial, ScenePartial};
pub use studio::{validate_studio, Studio, StudioPartial};
pub use tag::{validate_tag, Tag, TagPartial};

// ============================================================================
// DOMAIN ERROR TYPES
// ============================================================================

use thiserror::Error;

/// Violations of entity invariants
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("{0} must not be empty")]
    EmptyField(&'static str),

    #[error("Rating {0} is outside 1..=5")]
    RatingOutOfRange(i64),

    #[error("O-counter {0} is negative")]
    NegativeCounter(i64),

    #[error("Studio {0} cannot be its own parent")]
    SelfParent(i64),

    #[error("Invariant violation: {0}")]
    InvariantViolation(String),
}

pub type DomainResult<T> = Result<T, DomainError>;
