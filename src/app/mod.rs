// src/app/mod.rs
//
// Application wiring

pub mod media_library;

pub use media_library::MediaLibrary;
