//! Pure domain types and tree operations for the generation engine.
//!
//! Contains the scene/shot entity model, the per-kind generation state
//! machine, persistent tree update helpers with structural sharing, and
//! prompt composition. No I/O lives in this crate.

pub mod error;
pub mod prompt;
pub mod scene;
pub mod tree;
