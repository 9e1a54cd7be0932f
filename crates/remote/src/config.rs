//! Client configuration loaded from environment variables.

use std::time::Duration;

use crate::api::ApiError;

/// Default HTTP request timeout in seconds.
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 120;

/// Default cap on poll attempts before a job is declared timed out.
const DEFAULT_MAX_POLL_ATTEMPTS: u32 = 60;

/// Configuration for the generation service client.
#[derive(Debug, Clone)]
pub struct RemoteConfig {
    /// Base HTTP URL of the generation service, without a trailing slash.
    pub base_url: String,
    /// Per-install API key sent with every request.
    pub api_key: String,
    /// Timeout applied to each individual HTTP request.
    pub request_timeout: Duration,
    /// Maximum number of status polls per job.
    pub max_poll_attempts: u32,
}

impl RemoteConfig {
    /// Load configuration from environment variables.
    ///
    /// | Env Var                    | Default                  |
    /// |----------------------------|--------------------------|
    /// | `SCENEFORGE_API_URL`       | `http://localhost:8700`  |
    /// | `SCENEFORGE_API_KEY`       | *(required)*             |
    /// | `SCENEFORGE_TIMEOUT_SECS`  | `120`                    |
    /// | `SCENEFORGE_MAX_POLLS`     | `60`                     |
    ///
    /// A missing or empty API key is a fatal configuration error --
    /// nothing can be generated without one, so we fail fast here
    /// rather than on the first request.
    pub fn from_env() -> Result<Self, ApiError> {
        let base_url = std::env::var("SCENEFORGE_API_URL")
            .unwrap_or_else(|_| "http://localhost:8700".into());

        let api_key = std::env::var("SCENEFORGE_API_KEY")
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| {
                ApiError::Config("SCENEFORGE_API_KEY is not set".to_string())
            })?;

        let request_timeout = Duration::from_secs(
            std::env::var("SCENEFORGE_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS),
        );

        let max_poll_attempts = std::env::var("SCENEFORGE_MAX_POLLS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_MAX_POLL_ATTEMPTS);

        Ok(Self {
            base_url,
            api_key,
            request_timeout,
            max_poll_attempts,
        })
    }

    /// Construct a config directly (tests, embedding hosts).
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Result<Self, ApiError> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(ApiError::Config("API key must not be empty".to_string()));
        }
        Ok(Self {
            base_url: base_url.into(),
            api_key,
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            max_poll_attempts: DEFAULT_MAX_POLL_ATTEMPTS,
        })
    }
}
