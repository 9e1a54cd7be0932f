//! Sequential batch generation over the storyboard tree.
//!
//! The runner snapshots eligible nodes once, then drives the
//! orchestrator one item at a time. Sequential on purpose: the external
//! service is rate-limited and stateful per job, and one-at-a-time
//! keeps the abort-handle bookkeeping a single entry per key.
//!
//! Batch lifecycle is an explicit [`BatchState`] machine rather than a
//! flag checked inside a loop body, so stopping-between-items is a
//! first-class transition.

use std::sync::{Arc, Mutex};

use sceneforge_core::scene::{GenerationKind, SceneId};
use sceneforge_core::tree;
use tokio_util::sync::CancellationToken;

use crate::events::GenerationEvent;
use crate::orchestrator::{GenerationOutcome, Orchestrator};

/// Lifecycle of the batch runner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchState {
    /// No batch has run yet, or the last one finished.
    Idle,
    /// A batch is processing item `current` of `total`.
    Running {
        /// Zero-based index of the item being processed.
        current: usize,
        /// Number of items in the snapshot.
        total: usize,
    },
    /// The last batch was stopped before exhausting its items.
    Stopped,
    /// The last batch processed every item in its snapshot.
    Completed,
}

/// Summary of a finished batch run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchSummary {
    /// Items that ran to a terminal outcome (including failures).
    pub processed: usize,
    /// Items whose generation failed.
    pub failed: usize,
    /// Whether the run was stopped before exhausting the snapshot.
    pub stopped: bool,
}

/// Errors from the batch runner itself. Per-item generation failures
/// are never errors here; they are recorded on the affected nodes.
#[derive(Debug, thiserror::Error)]
pub enum BatchError {
    /// A run is already in progress on this runner.
    #[error("A batch run is already in progress")]
    AlreadyRunning,
}

/// Drives the orchestrator across all eligible nodes sequentially.
pub struct BatchRunner {
    orchestrator: Arc<Orchestrator>,
    state: Mutex<BatchState>,
    /// Token for the current (or most recent) run. Replaced per run.
    cancel: Mutex<CancellationToken>,
}

impl BatchRunner {
    pub fn new(orchestrator: Arc<Orchestrator>) -> Self {
        Self {
            orchestrator,
            state: Mutex::new(BatchState::Idle),
            cancel: Mutex::new(CancellationToken::new()),
        }
    }

    /// Current batch state.
    pub fn state(&self) -> BatchState {
        *self.state.lock().expect("batch state poisoned")
    }

    /// Run generation of `kind` across every eligible node.
    ///
    /// Eligible: lacking the target output and not currently
    /// generating, snapshotted once at the start in pre-order. The
    /// cancellation token is checked before each item; items started
    /// before a stop still finish through their own abort path.
    /// Per-item failures are recorded on the item and the loop
    /// continues.
    pub async fn run(&self, kind: GenerationKind) -> Result<BatchSummary, BatchError> {
        let eligible = self.eligible(kind).await;
        let total = eligible.len();

        let token = {
            let mut state = self.state.lock().expect("batch state poisoned");
            if matches!(*state, BatchState::Running { .. }) {
                return Err(BatchError::AlreadyRunning);
            }
            *state = BatchState::Running { current: 0, total };
            let token = CancellationToken::new();
            *self.cancel.lock().expect("batch cancel poisoned") = token.clone();
            token
        };

        tracing::info!(kind = %kind, total, "Batch run started");
        self.orchestrator
            .emit(GenerationEvent::BatchStarted { kind, total });

        let mut processed = 0;
        let mut failed = 0;
        let mut stopped = false;

        for (i, id) in eligible.iter().enumerate() {
            if token.is_cancelled() {
                stopped = true;
                break;
            }
            *self.state.lock().expect("batch state poisoned") = BatchState::Running {
                current: i,
                total,
            };

            match self.orchestrator.generate(*id, kind).await {
                Ok(GenerationOutcome::Failed { message }) => {
                    processed += 1;
                    failed += 1;
                    tracing::warn!(scene_id = %id, kind = %kind, error = %message, "Batch item failed");
                }
                Ok(GenerationOutcome::Cancelled) => {
                    // Stop-all aborted the item mid-flight; the loop
                    // check above ends the run before the next item.
                    processed += 1;
                }
                Ok(GenerationOutcome::Rejected) => {
                    // Started manually after the snapshot was taken;
                    // nothing ran on behalf of the batch.
                    tracing::debug!(scene_id = %id, kind = %kind, "Batch item already in flight, skipped");
                }
                Ok(GenerationOutcome::Success { .. }) => processed += 1,
                Err(e) => {
                    // Node deleted mid-run; skip it.
                    failed += 1;
                    tracing::warn!(scene_id = %id, kind = %kind, error = %e, "Batch item skipped");
                }
            }
        }

        *self.state.lock().expect("batch state poisoned") = if stopped {
            BatchState::Stopped
        } else {
            BatchState::Completed
        };

        tracing::info!(kind = %kind, processed, failed, stopped, "Batch run finished");
        self.orchestrator.emit(GenerationEvent::BatchFinished {
            kind,
            processed,
            stopped,
        });

        Ok(BatchSummary {
            processed,
            failed,
            stopped,
        })
    }

    /// Stop everything: prevent the batch from starting new items,
    /// abort every in-flight job (batch or manual, image or video),
    /// and clear volatile generation state tree-wide so no node is
    /// left showing a stuck spinner.
    pub async fn stop_all(&self) {
        tracing::info!("Stop-all requested");
        self.cancel
            .lock()
            .expect("batch cancel poisoned")
            .cancel();
        self.orchestrator.registry().cancel_all();
        self.orchestrator.reset_all_volatile().await;
    }

    /// Snapshot the ids of nodes eligible for a batch of `kind`.
    async fn eligible(&self, kind: GenerationKind) -> Vec<SceneId> {
        let roots = self.orchestrator.scenes().await;
        tree::flatten(&roots)
            .iter()
            .filter(|s| !s.has_output(kind) && !s.is_active(kind))
            .map(|s| s.id)
            .collect()
    }
}
