//! Scene/shot entity model and per-kind generation state.
//!
//! A [`Scene`] is a node in the storyboard tree. Scenes may own nested
//! child scenes (`shots`) to arbitrary depth; tree traversal and
//! copy-on-write updates live in [`crate::tree`].
//!
//! Volatile generation state is a tagged [`GenState`] per kind rather
//! than independent boolean + error fields, so a node can never be
//! simultaneously "generating" and "failed".

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifier for scenes, shots, and library assets.
pub type SceneId = uuid::Uuid;

/// Which output a generation request produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationKind {
    /// Still image(s) from the image prompt.
    Image,
    /// A video clip from the motion prompt plus a selected source image.
    Video,
}

impl std::fmt::Display for GenerationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GenerationKind::Image => write!(f, "image"),
            GenerationKind::Video => write!(f, "video"),
        }
    }
}

/// Volatile state of one generation kind on one node.
///
/// Successful completion returns the state to [`GenState::Idle`];
/// outputs accumulate on the node itself (`image_urls` / `video_url`)
/// because they outlive any individual attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum GenState {
    /// Nothing in flight; a new request may start.
    Idle,
    /// A request is in flight. At most one per (node, kind).
    InFlight {
        /// When the request was started.
        since: DateTime<Utc>,
    },
    /// A user-initiated abort is propagating to the in-flight request.
    Cancelling,
    /// The last attempt failed. Cleared when a new attempt starts.
    Failed {
        /// Human-readable failure reason, server message where available.
        message: String,
    },
}

impl GenState {
    /// Whether a request is currently active for this state
    /// (in flight or still winding down after a cancel).
    pub fn is_active(&self) -> bool {
        matches!(self, GenState::InFlight { .. } | GenState::Cancelling)
    }
}

/// A storyboard node: a scene, or a nested shot within a scene.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scene {
    /// Stable identity, assigned at creation.
    pub id: SceneId,
    /// Display title.
    pub title: String,
    /// Prompt used for image generation.
    pub image_prompt: String,
    /// Motion prompt used for video generation.
    pub video_prompt: String,
    /// Library asset ids of characters appearing in this node.
    pub character_ids: Vec<SceneId>,
    /// All generated image URLs, in generation order.
    pub image_urls: Vec<String>,
    /// The image used as video input. Defaults to the first generated
    /// image if the user never picked one.
    pub selected_image: Option<String>,
    /// The generated video URL, if any. Replaced on regeneration.
    pub video_url: Option<String>,
    /// Image generation state.
    pub image_gen: GenState,
    /// Video generation state.
    pub video_gen: GenState,
    /// Nested child shots.
    pub shots: Vec<Arc<Scene>>,
}

impl Scene {
    /// Create an empty scene with the given title and prompts.
    pub fn new(title: impl Into<String>, image_prompt: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4(),
            title: title.into(),
            image_prompt: image_prompt.into(),
            video_prompt: String::new(),
            character_ids: Vec::new(),
            image_urls: Vec::new(),
            selected_image: None,
            video_url: None,
            image_gen: GenState::Idle,
            video_gen: GenState::Idle,
            shots: Vec::new(),
        }
    }

    /// The generation state for `kind`.
    pub fn gen_state(&self, kind: GenerationKind) -> &GenState {
        match kind {
            GenerationKind::Image => &self.image_gen,
            GenerationKind::Video => &self.video_gen,
        }
    }

    /// Mutable access to the generation state for `kind`.
    pub fn gen_state_mut(&mut self, kind: GenerationKind) -> &mut GenState {
        match kind {
            GenerationKind::Image => &mut self.image_gen,
            GenerationKind::Video => &mut self.video_gen,
        }
    }

    /// Whether a request for `kind` is currently active on this node.
    pub fn is_active(&self, kind: GenerationKind) -> bool {
        self.gen_state(kind).is_active()
    }

    /// The prompt text for `kind`.
    pub fn prompt_for(&self, kind: GenerationKind) -> &str {
        match kind {
            GenerationKind::Image => &self.image_prompt,
            GenerationKind::Video => &self.video_prompt,
        }
    }

    /// Whether this node already has the output `kind` produces.
    pub fn has_output(&self, kind: GenerationKind) -> bool {
        match kind {
            GenerationKind::Image => !self.image_urls.is_empty(),
            GenerationKind::Video => self.video_url.is_some(),
        }
    }

    /// Record freshly generated outputs on this node.
    ///
    /// Images are appended; a video URL replaces the previous one. If no
    /// video-input image was selected yet, the first new image becomes
    /// the default selection.
    pub fn apply_outputs(&mut self, kind: GenerationKind, urls: &[String]) {
        match kind {
            GenerationKind::Image => {
                if self.selected_image.is_none() {
                    self.selected_image = urls.first().cloned();
                }
                self.image_urls.extend(urls.iter().cloned());
            }
            GenerationKind::Video => {
                self.video_url = urls.first().cloned();
            }
        }
    }

    /// Reset any active generation state back to [`GenState::Idle`].
    ///
    /// Used by stop-all so no node is left showing a stuck spinner,
    /// including nodes that never had an in-flight job. Recorded
    /// failures are kept; only in-flight and cancelling states clear.
    pub fn reset_volatile(&mut self) {
        if self.image_gen.is_active() {
            self.image_gen = GenState::Idle;
        }
        if self.video_gen.is_active() {
            self.video_gen = GenState::Idle;
        }
    }
}

/// A character entry from the asset library, reduced to the fields the
/// prompt composer needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CharacterAsset {
    /// Library asset id, referenced from [`Scene::character_ids`].
    pub id: SceneId,
    /// Character name.
    pub name: String,
    /// Visual description used to keep the character consistent
    /// across generations.
    pub description: String,
}
