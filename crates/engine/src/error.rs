use sceneforge_core::scene::SceneId;

/// Errors that can occur when interacting with the engine.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The requested scene or shot does not exist in the tree.
    #[error("Scene {0} not found")]
    SceneNotFound(SceneId),
}
