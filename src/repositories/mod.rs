// src/repositories/mod.rs
//
// Entity query builders
//
// CRITICAL RULES:
// - Builders borrow a connection (usually a transaction), never a pool
// - NO transaction management
// - NO cross-builder calls outside tests
// - Caller text never reaches SQL except through bound parameters

pub mod common;
pub mod gallery_repository;
pub mod image_repository;
pub mod movie_repository;
pub mod performer_repository;
pub mod scene_marker_repository;
pub mod scene_repository;
pub mod studio_repository;
pub mod tag_repository;

pub use common::EntityQueryBuilder;
pub use gallery_repository::{GalleryFilter, GalleryQueryBuilder};
pub use image_repository::{ImageFilter, ImageQueryBuilder};
pub use movie_repository::{MovieFilter, MovieQueryBuilder};
pub use performer_repository::{PerformerFilter, PerformerQueryBuilder};
pub use scene_marker_repository::SceneMarkerQueryBuilder;
pub use scene_repository::{SceneFilter, SceneQueryBuilder};
pub use studio_repository::{StudioFilter, StudioQueryBuilder};
pub use tag_repository::{TagFilter, TagQueryBuilder};
