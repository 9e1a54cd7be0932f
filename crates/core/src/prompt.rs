//! Prompt composition for generation requests.
//!
//! Builds the final prompt sent to the generation service from the
//! node's own prompt text, the characters assigned to it, and the
//! project's active style prefix. The fixed compositional suffix is
//! *not* added here -- that is transport policy owned by the remote
//! client, not user-editable content.

use crate::error::CoreError;
use crate::scene::{CharacterAsset, SceneId};

/// Compose the final prompt for one generation request.
///
/// Order: style prefix (if any), the base prompt, then one
/// `name: description` line per assigned character so the service
/// keeps recurring characters visually consistent.
pub fn compose_prompt(
    base: &str,
    assigned: &[SceneId],
    library: &[CharacterAsset],
    style_prefix: Option<&str>,
) -> String {
    let mut parts: Vec<String> = Vec::new();

    if let Some(style) = style_prefix {
        let style = style.trim();
        if !style.is_empty() {
            parts.push(style.to_string());
        }
    }

    parts.push(base.trim().to_string());

    let characters: Vec<String> = assigned
        .iter()
        .filter_map(|id| library.iter().find(|c| c.id == *id))
        .map(|c| format!("{}: {}", c.name, c.description))
        .collect();
    if !characters.is_empty() {
        parts.push(format!("Characters in shot: {}", characters.join("; ")));
    }

    parts.join(". ")
}

/// Validate a prompt before submission.
///
/// The service rejects empty prompts with an opaque 400; catching it
/// client-side gives the user an actionable message instead.
pub fn validate_prompt(prompt: &str) -> Result<(), CoreError> {
    if prompt.trim().is_empty() {
        return Err(CoreError::Validation(
            "Prompt must not be empty".to_string(),
        ));
    }
    Ok(())
}
