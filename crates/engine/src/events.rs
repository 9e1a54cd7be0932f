//! Engine events broadcast to UI subscribers.
//!
//! These represent the high-level generation state changes the rest of
//! the application cares about. They are emitted by the orchestrator
//! and batch runner on a [`tokio::sync::broadcast`] channel; call
//! [`crate::orchestrator::Orchestrator::subscribe`] to receive them.

use sceneforge_core::scene::{GenerationKind, SceneId};

/// Broadcast channel capacity for engine events.
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// A high-level generation event.
#[derive(Debug, Clone)]
pub enum GenerationEvent {
    /// A generation request was submitted for a scene.
    Started {
        scene_id: SceneId,
        kind: GenerationKind,
    },

    /// A generation request completed successfully.
    Completed {
        scene_id: SceneId,
        kind: GenerationKind,
        /// Generated artifact URLs.
        urls: Vec<String>,
    },

    /// A generation request failed.
    Failed {
        scene_id: SceneId,
        kind: GenerationKind,
        /// Human-readable failure reason.
        message: String,
    },

    /// A generation request was cancelled by the user.
    Cancelled {
        scene_id: SceneId,
        kind: GenerationKind,
    },

    /// A batch run started over `total` eligible scenes.
    BatchStarted {
        kind: GenerationKind,
        total: usize,
    },

    /// A batch run finished, either exhausting its items or stopped.
    BatchFinished {
        kind: GenerationKind,
        /// Number of items processed before the run ended.
        processed: usize,
        /// Whether the run was stopped before completing.
        stopped: bool,
    },
}
