// src/scanner/mod.rs
//
// Library scanning
//
// Walks the configured roots and keeps scenes, images and galleries in
// step with the files on disk.

pub mod hashing;
pub mod prober;
pub mod task;

pub use hashing::{oshash, sha256};
pub use prober::{MetadataProber, NullProber, VideoMetadata};
pub use task::{FileKind, ScanOutcome, ScanSummary, ScanTask};
