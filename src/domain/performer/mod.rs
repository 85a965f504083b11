pub mod entity;
pub mod invariants;

pub use entity::{Gender, Performer, PerformerPartial};
pub use invariants::{validate_performer, validate_performer_partial};
