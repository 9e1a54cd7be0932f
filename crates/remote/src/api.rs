//! REST client for the generation service HTTP endpoints.
//!
//! Wraps job submission (`POST /generate`) and status retrieval
//! (`GET /jobs/{id}`) using [`reqwest`]. All calls race against a
//! [`CancellationToken`] and surface a distinguished [`ApiError::Aborted`]
//! when the token fires mid-request, so callers can tell a user stop
//! apart from a real failure.

use reqwest::StatusCode;
use tokio_util::sync::CancellationToken;

use crate::config::RemoteConfig;
use crate::types::{
    with_composition_suffix, StatusResponse, SubmitOutcome, SubmitRequest, SubmitResponse,
    DEFAULT_POLL_INTERVAL_MS,
};

/// Header carrying the per-install API key.
const API_KEY_HEADER: &str = "x-api-key";

/// HTTP client for the generation service.
pub struct GenerationApi {
    client: reqwest::Client,
    config: RemoteConfig,
}

/// Errors from the generation service client.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Client-side configuration is unusable (e.g. missing API key).
    /// Fatal; surfaced before any request is made.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The HTTP request itself failed (network, DNS, TLS, timeout).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The service returned a non-2xx status code.
    #[error("Generation service error ({status}): {body}")]
    Server {
        /// HTTP status code.
        status: u16,
        /// Raw response body for debugging.
        body: String,
    },

    /// An async response arrived without a job identifier.
    /// Fatal -- there is nothing to poll.
    #[error("Queued response is missing a job identifier")]
    MissingJobId,

    /// The status endpoint does not know the job. Fatal, not transient:
    /// a job that disappeared will never complete, so retrying forever
    /// would hang the caller.
    #[error("Job {job_id} not found on the server")]
    JobNotFound {
        /// The job identifier the server rejected.
        job_id: String,
    },

    /// The job reached a terminal failure state server-side.
    #[error("Generation failed: {message}")]
    Generation {
        /// Server-provided failure message, verbatim where available.
        message: String,
    },

    /// The poll retry budget was exhausted without a terminal state.
    #[error("Generation timed out after {attempts} status checks")]
    TimedOut {
        /// Number of polls performed before giving up.
        attempts: u32,
    },

    /// The cancellation token fired while the request was in flight.
    /// Not a failure; callers map this to a user-initiated stop.
    #[error("Request aborted")]
    Aborted,
}

impl GenerationApi {
    /// Create a new API client.
    ///
    /// Fails fast with [`ApiError::Config`] when the HTTP client cannot
    /// be built; key validation already happened in [`RemoteConfig`].
    pub fn new(config: RemoteConfig) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| ApiError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client, config })
    }

    /// Maximum number of status polls per job, from configuration.
    pub fn max_poll_attempts(&self) -> u32 {
        self.config.max_poll_attempts
    }

    /// Submit a generation request.
    ///
    /// The compositional suffix is appended to the prompt here --
    /// middleware policy, applied to every submission regardless of
    /// what the caller composed.
    ///
    /// Returns [`SubmitOutcome::Completed`] when the service answered
    /// synchronously, or [`SubmitOutcome::Queued`] with the job handle
    /// and the server-chosen poll interval.
    pub async fn submit(
        &self,
        mut request: SubmitRequest,
        cancel: &CancellationToken,
    ) -> Result<SubmitOutcome, ApiError> {
        request.prompt = with_composition_suffix(&request.prompt);

        let send = self
            .client
            .post(format!("{}/generate", self.config.base_url))
            .header(API_KEY_HEADER, &self.config.api_key)
            .json(&request)
            .send();

        let response = tokio::select! {
            _ = cancel.cancelled() => return Err(ApiError::Aborted),
            result = send => result?,
        };

        let response = Self::ensure_success(response).await?;
        let parsed: SubmitResponse = response.json().await?;
        Self::normalize_submit(parsed)
    }

    /// Fetch the status of a queued job.
    ///
    /// A 404 is mapped to the fatal [`ApiError::JobNotFound`] rather
    /// than a generic server error, so the poll loop never mistakes a
    /// vanished job for one that is still pending.
    pub async fn job_status(
        &self,
        job_id: &str,
        cancel: &CancellationToken,
    ) -> Result<StatusResponse, ApiError> {
        let send = self
            .client
            .get(format!("{}/jobs/{}", self.config.base_url, job_id))
            .header(API_KEY_HEADER, &self.config.api_key)
            .send();

        let response = tokio::select! {
            _ = cancel.cancelled() => return Err(ApiError::Aborted),
            result = send => result?,
        };

        if response.status() == StatusCode::NOT_FOUND {
            return Err(ApiError::JobNotFound {
                job_id: job_id.to_string(),
            });
        }

        let response = Self::ensure_success(response).await?;
        Ok(response.json().await?)
    }

    // ---- private helpers ----

    /// Normalize the two submit response shapes into a [`SubmitOutcome`].
    fn normalize_submit(parsed: SubmitResponse) -> Result<SubmitOutcome, ApiError> {
        match parsed.status.as_deref() {
            Some("done") | Some("complete") => Ok(SubmitOutcome::Completed {
                urls: parsed.outputs.into_iter().map(|o| o.url).collect(),
            }),
            _ => {
                let job_id = parsed.job_id.ok_or(ApiError::MissingJobId)?;
                Ok(SubmitOutcome::Queued {
                    job_id,
                    poll_interval_ms: parsed.poll_interval_ms.unwrap_or(DEFAULT_POLL_INTERVAL_MS),
                })
            }
        }
    }

    /// Ensure the response has a success status code. Returns the
    /// response unchanged on success, or an [`ApiError::Server`]
    /// carrying the status and body text on failure.
    async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(ApiError::Server {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn api_for(server: &MockServer) -> GenerationApi {
        let config = RemoteConfig::new(server.uri(), "k-test").unwrap();
        GenerationApi::new(config).unwrap()
    }

    #[tokio::test]
    async fn submit_synchronous_completion() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/generate"))
            .and(header("x-api-key", "k-test"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": "done",
                "outputs": [{"url": "a"}],
            })))
            .mount(&server)
            .await;

        let api = api_for(&server).await;
        let outcome = api
            .submit(
                SubmitRequest::new("a harbor"),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_matches!(outcome, SubmitOutcome::Completed { urls } if urls == vec!["a"]);
    }

    #[tokio::test]
    async fn submit_appends_composition_suffix() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/generate"))
            .and(body_partial_json(serde_json::json!({
                "prompt": with_composition_suffix("a harbor"),
            })))
            .respond_with(ResponseTemplate::new(202).set_body_json(serde_json::json!({
                "jobId": "j1",
                "pollIntervalMs": 100,
            })))
            .expect(1)
            .mount(&server)
            .await;

        let api = api_for(&server).await;
        let outcome = api
            .submit(
                SubmitRequest::new("a harbor"),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_matches!(
            outcome,
            SubmitOutcome::Queued { job_id, poll_interval_ms: 100 } if job_id == "j1"
        );
    }

    #[tokio::test]
    async fn submit_queued_without_job_id_is_fatal() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/generate"))
            .respond_with(ResponseTemplate::new(202).set_body_json(serde_json::json!({
                "status": "pending",
            })))
            .mount(&server)
            .await;

        let api = api_for(&server).await;
        let err = api
            .submit(
                SubmitRequest::new("a harbor"),
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();

        assert_matches!(err, ApiError::MissingJobId);
    }

    #[tokio::test]
    async fn submit_surfaces_server_error_with_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/generate"))
            .respond_with(ResponseTemplate::new(429).set_body_string("rate limited"))
            .mount(&server)
            .await;

        let api = api_for(&server).await;
        let err = api
            .submit(
                SubmitRequest::new("a harbor"),
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();

        assert_matches!(err, ApiError::Server { status: 429, body } if body == "rate limited");
    }

    #[tokio::test]
    async fn submit_with_cancelled_token_aborts() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/generate"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_delay(std::time::Duration::from_secs(5))
                    .set_body_json(serde_json::json!({"status": "done", "outputs": []})),
            )
            .mount(&server)
            .await;

        let api = api_for(&server).await;
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = api
            .submit(
                SubmitRequest::new("a harbor"),
                &cancel,
            )
            .await
            .unwrap_err();

        assert_matches!(err, ApiError::Aborted);
    }

    #[tokio::test]
    async fn job_status_404_is_job_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/jobs/j-missing"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let api = api_for(&server).await;
        let err = api
            .job_status("j-missing", &CancellationToken::new())
            .await
            .unwrap_err();

        assert_matches!(err, ApiError::JobNotFound { job_id } if job_id == "j-missing");
    }
}
