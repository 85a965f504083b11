// src/services/mod.rs
//
// Services Module - Orchestration Layer
//
// Owns the pool and decides transaction boundaries.

pub mod library_service;

pub use library_service::{AssociationKind, LibraryService, SceneAssociations};
