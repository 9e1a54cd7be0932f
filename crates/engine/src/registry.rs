//! Registry of cancellation handles for in-flight generation jobs.
//!
//! One entry per in-flight `(scene, kind)` pair. The orchestrator
//! registers a fresh token before submitting, and either `release`s it
//! on completion or sees it `cancel`led by the UI. `cancel` and
//! `release` are idempotent: cancelling a job that already finished,
//! or twice, is a no-op.

use std::collections::HashMap;
use std::sync::Mutex;

use sceneforge_core::scene::{GenerationKind, SceneId};
use tokio_util::sync::CancellationToken;

/// Key identifying one in-flight job.
pub type JobKey = (SceneId, GenerationKind);

/// Process-wide map from job key to active cancellation handle.
///
/// Guarded by a [`std::sync::Mutex`]; no caller holds the lock across
/// an await point.
#[derive(Default)]
pub struct AbortRegistry {
    handles: Mutex<HashMap<JobKey, CancellationToken>>,
}

impl AbortRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create and store a fresh token for `key`, returning a clone.
    ///
    /// Overwrites any stale prior handle for the same key; with the
    /// one-job-per-(scene, kind) invariant upheld there is none.
    pub fn register(&self, key: JobKey) -> CancellationToken {
        let token = CancellationToken::new();
        let mut handles = self.handles.lock().expect("abort registry poisoned");
        if handles.insert(key, token.clone()).is_some() {
            tracing::warn!(scene_id = %key.0, kind = %key.1, "Replaced stale abort handle");
        }
        token
    }

    /// Signal the handle for `key` and remove it. No-op when absent.
    pub fn cancel(&self, key: &JobKey) {
        let removed = self
            .handles
            .lock()
            .expect("abort registry poisoned")
            .remove(key);
        if let Some(token) = removed {
            tracing::info!(scene_id = %key.0, kind = %key.1, "Cancelling generation job");
            token.cancel();
        }
    }

    /// Remove the handle for `key` without signaling it. No-op when
    /// absent (e.g. after a `cancel_all` already cleared it).
    pub fn release(&self, key: &JobKey) {
        self.handles
            .lock()
            .expect("abort registry poisoned")
            .remove(key);
    }

    /// Signal and clear every handle. Used by global stop.
    pub fn cancel_all(&self) {
        let drained: Vec<(JobKey, CancellationToken)> = self
            .handles
            .lock()
            .expect("abort registry poisoned")
            .drain()
            .collect();
        if !drained.is_empty() {
            tracing::info!(count = drained.len(), "Cancelling all generation jobs");
        }
        for (_, token) in drained {
            token.cancel();
        }
    }

    /// Whether a handle is currently registered for `key`.
    pub fn is_registered(&self, key: &JobKey) -> bool {
        self.handles
            .lock()
            .expect("abort registry poisoned")
            .contains_key(key)
    }

    /// Number of in-flight handles.
    pub fn len(&self) -> usize {
        self.handles.lock().expect("abort registry poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
