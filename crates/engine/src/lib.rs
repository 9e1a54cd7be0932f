//! Generation engine: per-scene orchestration, cancellation registry,
//! and sequential batch runs.
//!
//! The engine owns the storyboard tree behind a [`tokio::sync::RwLock`]
//! and mutates it copy-on-write through `sceneforge-core`'s tree
//! helpers. Remote submission and polling are delegated to
//! `sceneforge-remote`; every in-flight request is tracked in the
//! [`registry::AbortRegistry`] so user stops and stop-all can abort it.

pub mod batch;
pub mod error;
pub mod events;
pub mod orchestrator;
pub mod registry;
