//! Per-scene generation lifecycle coordinator.
//!
//! [`Orchestrator`] owns the storyboard tree and drives one generation
//! request end to end: precondition check, in-flight marking, abort
//! handle registration, prompt composition, remote submit, polling, and
//! result application. Single-item and batch generation both go through
//! [`Orchestrator::generate`]; the batch runner just calls it in a loop.
//!
//! Cancellation is distinguished from failure everywhere: a user stop
//! clears the in-flight state without recording an error.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{broadcast, RwLock};

use sceneforge_core::prompt::{compose_prompt, validate_prompt};
use sceneforge_core::scene::{CharacterAsset, GenState, GenerationKind, Scene, SceneId};
use sceneforge_core::tree;
use sceneforge_remote::api::{ApiError, GenerationApi};
use sceneforge_remote::poll::poll_until_complete;
use sceneforge_remote::types::{GenerationOptions, InlineImage, SubmitOutcome, SubmitRequest};

use crate::error::EngineError;
use crate::events::{GenerationEvent, EVENT_CHANNEL_CAPACITY};
use crate::registry::AbortRegistry;

/// Project-level context applied to every generation request.
#[derive(Debug, Clone, Default)]
pub struct ProjectContext {
    /// Character library entries referenced by scenes.
    pub characters: Vec<CharacterAsset>,
    /// Inline reference image per character, where one was uploaded.
    pub character_images: HashMap<SceneId, InlineImage>,
    /// Active style/brand-guideline prefix prepended to every prompt.
    pub style_prefix: Option<String>,
    /// Generation options forwarded to the service.
    pub options: GenerationOptions,
}

/// Terminal result of one generation request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenerationOutcome {
    /// Outputs were generated and applied to the scene.
    Success {
        /// Generated artifact URLs.
        urls: Vec<String>,
    },
    /// A request of this kind was already in flight for the scene.
    /// Explicitly rejected, never queued.
    Rejected,
    /// The user stopped the request. No error is recorded.
    Cancelled,
    /// The request failed; the message is recorded on the scene and
    /// prior outputs are left untouched.
    Failed {
        /// Human-readable failure reason.
        message: String,
    },
}

/// Coordinates generation requests against the storyboard tree.
///
/// Created once per project via [`Orchestrator::new`]. The returned
/// `Arc` can be cheaply cloned into UI handlers; different scenes may
/// generate concurrently through the same instance.
pub struct Orchestrator {
    api: Arc<GenerationApi>,
    registry: Arc<AbortRegistry>,
    tree: RwLock<Vec<Arc<Scene>>>,
    context: RwLock<ProjectContext>,
    event_tx: broadcast::Sender<GenerationEvent>,
}

impl Orchestrator {
    /// Create an orchestrator over an empty tree.
    pub fn new(api: GenerationApi, context: ProjectContext) -> Arc<Self> {
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Arc::new(Self {
            api: Arc::new(api),
            registry: Arc::new(AbortRegistry::new()),
            tree: RwLock::new(Vec::new()),
            context: RwLock::new(context),
            event_tx,
        })
    }

    /// Subscribe to engine events.
    pub fn subscribe(&self) -> broadcast::Receiver<GenerationEvent> {
        self.event_tx.subscribe()
    }

    /// The abort registry shared with the batch runner.
    pub fn registry(&self) -> &AbortRegistry {
        &self.registry
    }

    /// Broadcast an engine event. Receiver lag or absence is not an
    /// error.
    pub(crate) fn emit(&self, event: GenerationEvent) {
        let _ = self.event_tx.send(event);
    }

    /// Snapshot of the current tree roots.
    pub async fn scenes(&self) -> Vec<Arc<Scene>> {
        self.tree.read().await.clone()
    }

    /// Replace the whole tree (project load, script import).
    pub async fn set_scenes(&self, roots: Vec<Arc<Scene>>) {
        *self.tree.write().await = roots;
    }

    /// Append a root scene.
    pub async fn add_scene(&self, scene: Scene) {
        self.tree.write().await.push(Arc::new(scene));
    }

    /// Replace the project context (style change, library edit).
    pub async fn set_context(&self, context: ProjectContext) {
        *self.context.write().await = context;
    }

    /// Run one generation request for `(id, kind)` to a terminal state.
    ///
    /// Returns [`GenerationOutcome::Rejected`] without side effects when
    /// a request of the same kind is already in flight for the scene.
    /// All other outcomes are also reflected on the scene node itself.
    pub async fn generate(
        &self,
        id: SceneId,
        kind: GenerationKind,
    ) -> Result<GenerationOutcome, EngineError> {
        // Check the precondition, mark in-flight, and register the
        // abort handle atomically under the write lock, capturing the
        // prompt inputs in the same pass. Registering inside the
        // critical section means a cancel() arriving at any later
        // point always finds the handle.
        let (base_prompt, character_ids, source_image, token) = {
            let mut roots = self.tree.write().await;
            let scene = tree::find(&roots, id).ok_or(EngineError::SceneNotFound(id))?;
            if scene.is_active(kind) {
                tracing::debug!(scene_id = %id, kind = %kind, "Generation already in flight, rejecting");
                return Ok(GenerationOutcome::Rejected);
            }
            let base_prompt = scene.prompt_for(kind).to_string();
            let character_ids = scene.character_ids.clone();
            let source_image = scene
                .selected_image
                .clone()
                .or_else(|| scene.image_urls.first().cloned());

            let updated = tree::update(&roots, id, |s| {
                let mut s = s.clone();
                *s.gen_state_mut(kind) = GenState::InFlight { since: Utc::now() };
                s
            })
            .ok_or(EngineError::SceneNotFound(id))?;
            *roots = updated;

            let token = self.registry.register((id, kind));
            (base_prompt, character_ids, source_image, token)
        };

        if let Err(e) = validate_prompt(&base_prompt) {
            let message = e.to_string();
            self.finish(id, kind, &FinishWith::Failed(message.clone()))
                .await;
            self.registry.release(&(id, kind));
            self.emit(GenerationEvent::Failed {
                scene_id: id,
                kind,
                message: message.clone(),
            });
            return Ok(GenerationOutcome::Failed { message });
        }

        let request = self
            .build_request(kind, &base_prompt, &character_ids, source_image)
            .await;

        self.emit(GenerationEvent::Started {
            scene_id: id,
            kind,
        });
        tracing::info!(scene_id = %id, kind = %kind, "Generation started");

        let result = match self.api.submit(request, &token).await {
            Ok(SubmitOutcome::Completed { urls }) => Ok(urls),
            Ok(SubmitOutcome::Queued {
                job_id,
                poll_interval_ms,
            }) => {
                tracing::info!(
                    scene_id = %id,
                    kind = %kind,
                    job_id = %job_id,
                    poll_interval_ms,
                    "Job queued, polling",
                );
                poll_until_complete(
                    &self.api,
                    &job_id,
                    poll_interval_ms,
                    self.api.max_poll_attempts(),
                    &token,
                )
                .await
            }
            Err(e) => Err(e),
        };

        let outcome = match result {
            Ok(urls) => {
                self.finish(id, kind, &FinishWith::Outputs(urls.clone())).await;
                self.emit(GenerationEvent::Completed {
                    scene_id: id,
                    kind,
                    urls: urls.clone(),
                });
                GenerationOutcome::Success { urls }
            }
            Err(ApiError::Aborted) => {
                tracing::info!(scene_id = %id, kind = %kind, "Generation cancelled");
                self.finish(id, kind, &FinishWith::Nothing).await;
                self.emit(GenerationEvent::Cancelled {
                    scene_id: id,
                    kind,
                });
                GenerationOutcome::Cancelled
            }
            Err(e) => {
                let message = e.to_string();
                tracing::warn!(scene_id = %id, kind = %kind, error = %message, "Generation failed");
                self.finish(id, kind, &FinishWith::Failed(message.clone()))
                    .await;
                self.emit(GenerationEvent::Failed {
                    scene_id: id,
                    kind,
                    message: message.clone(),
                });
                GenerationOutcome::Failed { message }
            }
        };

        // No-op when cancel() already removed the handle.
        self.registry.release(&(id, kind));
        Ok(outcome)
    }

    /// Request cancellation of an in-flight generation.
    ///
    /// Shows the transient cancelling state on the node and signals the
    /// abort handle; the in-flight task observes the abort and performs
    /// the terminal cleanup. A no-op when nothing is in flight (e.g.
    /// the job finished just before the user clicked stop).
    pub async fn cancel(&self, id: SceneId, kind: GenerationKind) {
        {
            let mut roots = self.tree.write().await;
            let in_flight = tree::find(&roots, id)
                .map(|s| matches!(s.gen_state(kind), GenState::InFlight { .. }))
                .unwrap_or(false);
            if in_flight {
                if let Some(updated) = tree::update(&roots, id, |s| {
                    let mut s = s.clone();
                    *s.gen_state_mut(kind) = GenState::Cancelling;
                    s
                }) {
                    *roots = updated;
                }
            }
        }
        self.registry.cancel(&(id, kind));
    }

    /// Delete a scene or shot, cancelling any in-flight jobs across its
    /// whole subtree first so no orphaned request keeps running.
    pub async fn delete_scene(&self, id: SceneId) -> Result<(), EngineError> {
        let mut roots = self.tree.write().await;

        // Removal drops the node's descendants too; every one of them
        // may carry a flight of either kind.
        let doomed_ids: Vec<SceneId> = {
            let node = tree::find(&roots, id).ok_or(EngineError::SceneNotFound(id))?;
            tree::flatten(std::slice::from_ref(node))
                .iter()
                .map(|s| s.id)
                .collect()
        };
        for doomed in doomed_ids {
            self.registry.cancel(&(doomed, GenerationKind::Image));
            self.registry.cancel(&(doomed, GenerationKind::Video));
        }

        let updated = tree::remove(&roots, id).ok_or(EngineError::SceneNotFound(id))?;
        *roots = updated;
        tracing::info!(scene_id = %id, "Scene deleted");
        Ok(())
    }

    /// Reset every node's volatile generation state tree-wide.
    ///
    /// Part of stop-all: guarantees no stuck spinner even for nodes
    /// whose in-flight task is still winding down.
    pub async fn reset_all_volatile(&self) {
        let mut roots = self.tree.write().await;
        *roots = tree::map_all(&roots, &|s| s.reset_volatile());
    }

    // ---- private helpers ----

    /// Build the submit request for one generation.
    async fn build_request(
        &self,
        kind: GenerationKind,
        base_prompt: &str,
        character_ids: &[SceneId],
        source_image: Option<String>,
    ) -> SubmitRequest {
        let context = self.context.read().await;
        let prompt = compose_prompt(
            base_prompt,
            character_ids,
            &context.characters,
            context.style_prefix.as_deref(),
        );
        let reference_images = character_ids
            .iter()
            .filter_map(|cid| context.character_images.get(cid).cloned())
            .collect();

        SubmitRequest {
            prompt,
            reference_images,
            source_image: match kind {
                GenerationKind::Image => None,
                GenerationKind::Video => source_image,
            },
            options: context.options.clone(),
        }
    }

    /// Apply a terminal result to the scene and clear its in-flight
    /// state. Skipped silently when the scene was deleted mid-flight.
    async fn finish(&self, id: SceneId, kind: GenerationKind, with: &FinishWith) {
        let mut roots = self.tree.write().await;
        if let Some(updated) = tree::update(&roots, id, |s| {
            let mut s = s.clone();
            match with {
                FinishWith::Outputs(urls) => {
                    s.apply_outputs(kind, urls);
                    *s.gen_state_mut(kind) = GenState::Idle;
                }
                FinishWith::Failed(message) => {
                    *s.gen_state_mut(kind) = GenState::Failed {
                        message: message.clone(),
                    };
                }
                FinishWith::Nothing => {
                    *s.gen_state_mut(kind) = GenState::Idle;
                }
            }
            s
        }) {
            *roots = updated;
        }
    }
}

/// How [`Orchestrator::finish`] updates the node.
enum FinishWith {
    /// Success: record outputs, back to idle.
    Outputs(Vec<String>),
    /// Failure: record the message.
    Failed(String),
    /// Cancellation: back to idle, nothing recorded.
    Nothing,
}
