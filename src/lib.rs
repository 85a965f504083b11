// src/lib.rs
// Medialib - Local-first media library store
//
// Architecture:
// - Domain: entity types and their invariants, no I/O
// - Query: typed criteria compiled to parameterised SQL
// - Repositories: per-entity query builders over a borrowed connection
// - Services: transaction boundaries, owned pool
// - Scanner and registries: filesystem-facing collaborators
// - Explicit: no global state, no hidden connections

// ============================================================================
// FOUNDATION
// ============================================================================

pub mod config;
pub mod db;
pub mod domain;
pub mod error;
pub mod query;
pub mod repositories;

// ============================================================================
// APPLICATION LAYER
// ============================================================================

pub mod app;
pub mod registry;
pub mod scanner;
pub mod services;

// ============================================================================
// PUBLIC API - Domain Entities
// ============================================================================

pub use domain::{
    validate_gallery,
    validate_image,
    validate_movie,
    validate_performer,
    validate_scene,
    validate_studio,
    validate_tag,
    DomainError,
    // Gallery
    Gallery,
    GalleryPartial,
    // Performer
    Gender,
    // Image
    Image,
    ImagePartial,
    // Movie
    Movie,
    MoviePartial,
    MoviesScenes,
    Performer,
    PerformerPartial,
    // Scene
    Scene,
    SceneMarker,
    SceneMarkerPartial,
    ScenePartial,
    // Studio
    Studio,
    StudioPartial,
    // Tag
    Tag,
    TagPartial,
};

// ============================================================================
// PUBLIC API - Errors and Configuration
// ============================================================================

pub use config::{AppConfig, DatabaseConfig, LibraryConfig};
pub use error::{AppError, AppResult};

// ============================================================================
// PUBLIC API - Database
// ============================================================================

pub use db::{
    create_connection_pool, initialize_database, read_txn, with_read_txn, with_txn,
    ConnectionPool,
};

// ============================================================================
// PUBLIC API - Queries and Repositories
// ============================================================================

pub use query::find_filter::{FindFilter, SortDirection};
pub use repositories::{
    EntityQueryBuilder, GalleryFilter, GalleryQueryBuilder, ImageFilter, ImageQueryBuilder,
    MovieFilter, MovieQueryBuilder, PerformerFilter, PerformerQueryBuilder,
    SceneMarkerQueryBuilder, SceneFilter, SceneQueryBuilder, StudioFilter, StudioQueryBuilder,
    TagFilter, TagQueryBuilder,
};

// ============================================================================
// PUBLIC API - Services and Wiring
// ============================================================================

pub use app::MediaLibrary;
pub use registry::{ManifestCache, PluginManifest, PluginRegistry, ScraperManifest, ScraperRegistry};
pub use scanner::{MetadataProber, ScanSummary, ScanTask, VideoMetadata};
pub use services::{AssociationKind, LibraryService, SceneAssociations};
