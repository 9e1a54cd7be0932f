//! Wire types for the generation service REST API.
//!
//! The submit endpoint answers in one of two shapes: an immediate
//! completion carrying output URLs, or a job handle (`jobId` plus a
//! server-chosen poll interval). [`SubmitOutcome`] normalizes both.
//! Job status responses from the two service generations differ in
//! where they put the error message; [`StatusResponse::failure_message`]
//! is the single normalized reader for all of them.

use serde::{Deserialize, Serialize};

/// Fixed suffix appended to every prompt at submission.
///
/// This enforces compositional constraints the service otherwise
/// drifts on. It is transport policy, never shown to or editable by
/// the user.
pub const COMPOSITION_SUFFIX: &str =
    "Keep the background stable and consistent. Do not add extra subjects, \
     text, or watermarks.";

/// Append [`COMPOSITION_SUFFIX`] to a composed prompt.
pub fn with_composition_suffix(prompt: &str) -> String {
    format!("{} {}", prompt.trim_end(), COMPOSITION_SUFFIX)
}

/// A reference image sent inline with a submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InlineImage {
    /// Base64-encoded image bytes.
    pub data: String,
    /// MIME type, e.g. `image/png`.
    #[serde(rename = "mimeType")]
    pub mime_type: String,
}

impl InlineImage {
    /// Encode raw image bytes for inline transport.
    pub fn from_bytes(bytes: &[u8], mime_type: impl Into<String>) -> Self {
        use base64::Engine as _;
        Self {
            data: base64::engine::general_purpose::STANDARD.encode(bytes),
            mime_type: mime_type.into(),
        }
    }
}

/// Generation options forwarded to the service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GenerationOptions {
    /// Target aspect ratio, e.g. `16:9`.
    #[serde(rename = "aspectRatio", skip_serializing_if = "Option::is_none")]
    pub aspect_ratio: Option<String>,
    /// Named service-side style preset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub style: Option<String>,
}

/// Body of a `POST /generate` submission.
#[derive(Debug, Clone, Serialize)]
pub struct SubmitRequest {
    /// Final prompt text (composition suffix already applied).
    pub prompt: String,
    /// Inline reference images.
    #[serde(rename = "referenceImages")]
    pub reference_images: Vec<InlineImage>,
    /// Source image URL for video generation (the user's selected
    /// still, or the first generated one).
    #[serde(rename = "sourceImage", skip_serializing_if = "Option::is_none")]
    pub source_image: Option<String>,
    /// Generation options.
    #[serde(flatten)]
    pub options: GenerationOptions,
}

impl SubmitRequest {
    /// A request with just a prompt; images and options filled in by
    /// the caller as needed.
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            reference_images: Vec::new(),
            source_image: None,
            options: GenerationOptions::default(),
        }
    }
}

/// Raw submit response as sent by the service.
#[derive(Debug, Deserialize)]
pub struct SubmitResponse {
    /// `done` on synchronous completion, `pending`/absent otherwise.
    #[serde(default)]
    pub status: Option<String>,
    /// Output URLs when the job completed synchronously.
    #[serde(default)]
    pub outputs: Vec<Output>,
    /// Job handle when the job was queued.
    #[serde(rename = "jobId", default)]
    pub job_id: Option<String>,
    /// Server-chosen poll interval in milliseconds.
    #[serde(rename = "pollIntervalMs", default)]
    pub poll_interval_ms: Option<u64>,
}

/// One output entry in a response.
#[derive(Debug, Clone, Deserialize)]
pub struct Output {
    /// Where the generated artifact can be fetched.
    pub url: String,
}

/// Normalized result of a submission.
#[derive(Debug, Clone)]
pub enum SubmitOutcome {
    /// The service completed the request synchronously.
    Completed {
        /// Generated artifact URLs.
        urls: Vec<String>,
    },
    /// The request was queued; resolve it by polling.
    Queued {
        /// Server-assigned job identifier.
        job_id: String,
        /// Interval the server asked us to poll at, in milliseconds.
        poll_interval_ms: u64,
    },
}

/// Default poll interval when a queued response omits one.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 2_000;

/// Raw job status response from `GET /jobs/{id}`.
#[derive(Debug, Deserialize)]
pub struct StatusResponse {
    /// Job status string, e.g. `pending`, `done`, `failed`.
    #[serde(default)]
    pub status: String,
    /// Output URLs on terminal success.
    #[serde(default)]
    pub outputs: Vec<Output>,
    /// Error payload on terminal failure. Shape varies by endpoint
    /// generation: `{"message": ...}`, a bare string, or absent.
    #[serde(default)]
    pub error: Option<serde_json::Value>,
    /// Older endpoints put the failure message at the top level.
    #[serde(default)]
    pub message: Option<String>,
}

/// Normalized interpretation of a job status response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobState {
    /// Non-terminal; keep polling.
    Pending,
    /// Terminal success with output URLs.
    Done(Vec<String>),
    /// Terminal failure with the best available server message.
    Failed(String),
}

impl StatusResponse {
    /// Interpret the status string and payload.
    ///
    /// `done`/`complete` are terminal success; `failed`/`error` are
    /// terminal failure; anything else keeps polling.
    pub fn state(&self) -> JobState {
        match self.status.as_str() {
            "done" | "complete" => {
                JobState::Done(self.outputs.iter().map(|o| o.url.clone()).collect())
            }
            "failed" | "error" => JobState::Failed(self.failure_message()),
            _ => JobState::Pending,
        }
    }

    /// Extract the failure message, trying the known shapes in order:
    /// `error.message`, `error` as a bare string, top-level `message`.
    fn failure_message(&self) -> String {
        if let Some(error) = &self.error {
            if let Some(message) = error.get("message").and_then(|m| m.as_str()) {
                return message.to_string();
            }
            if let Some(message) = error.as_str() {
                return message.to_string();
            }
        }
        if let Some(message) = &self.message {
            return message.clone();
        }
        "generation failed".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn suffix_is_appended_once_after_trim() {
        let prompt = with_composition_suffix("a harbor at dawn  ");
        assert!(prompt.starts_with("a harbor at dawn "));
        assert!(prompt.ends_with(COMPOSITION_SUFFIX));
        assert_eq!(prompt.matches(COMPOSITION_SUFFIX).count(), 1);
    }

    #[test]
    fn inline_image_encodes_base64() {
        let img = InlineImage::from_bytes(b"png-bytes", "image/png");
        assert_eq!(img.data, "cG5nLWJ5dGVz");
        assert_eq!(img.mime_type, "image/png");
    }

    #[test]
    fn status_done_extracts_urls() {
        let resp: StatusResponse = serde_json::from_value(serde_json::json!({
            "status": "done",
            "outputs": [{"url": "https://x/img.png"}],
        }))
        .unwrap();
        assert_eq!(resp.state(), JobState::Done(vec!["https://x/img.png".into()]));
    }

    #[test]
    fn status_complete_is_also_terminal_success() {
        let resp: StatusResponse = serde_json::from_value(serde_json::json!({
            "status": "complete",
            "outputs": [],
        }))
        .unwrap();
        assert_matches!(resp.state(), JobState::Done(urls) if urls.is_empty());
    }

    #[test]
    fn status_failed_reads_nested_error_message() {
        let resp: StatusResponse = serde_json::from_value(serde_json::json!({
            "status": "failed",
            "error": {"message": "quota exceeded"},
        }))
        .unwrap();
        assert_eq!(resp.state(), JobState::Failed("quota exceeded".into()));
    }

    #[test]
    fn status_error_reads_bare_string_error() {
        let resp: StatusResponse = serde_json::from_value(serde_json::json!({
            "status": "error",
            "error": "model overloaded",
        }))
        .unwrap();
        assert_eq!(resp.state(), JobState::Failed("model overloaded".into()));
    }

    #[test]
    fn status_failed_falls_back_to_top_level_message() {
        let resp: StatusResponse = serde_json::from_value(serde_json::json!({
            "status": "failed",
            "message": "worker crashed",
        }))
        .unwrap();
        assert_eq!(resp.state(), JobState::Failed("worker crashed".into()));
    }

    #[test]
    fn status_failed_without_any_message_gets_default() {
        let resp: StatusResponse = serde_json::from_value(serde_json::json!({
            "status": "failed",
        }))
        .unwrap();
        assert_matches!(resp.state(), JobState::Failed(m) if m == "generation failed");
    }

    #[test]
    fn unknown_status_is_pending() {
        for status in ["pending", "queued", "running", "warming_up"] {
            let resp: StatusResponse =
                serde_json::from_value(serde_json::json!({ "status": status })).unwrap();
            assert_eq!(resp.state(), JobState::Pending);
        }
    }
}
