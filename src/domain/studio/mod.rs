pub mod entity;
pub mod invariants;

pub use entity::{Studio, StudioPartial};
pub use invariants::{validate_studio, validate_studio_partial};
