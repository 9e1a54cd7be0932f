//! Bounded polling loop that resolves a queued job to a terminal result.
//!
//! The interval is whatever the server asked for at submission -- fixed,
//! no backoff, since the server sized it against its own rate limits.
//! The attempt budget is the safety net for jobs that never reach a
//! terminal state server-side; it guarantees the loop ends even if
//! nobody cancels.

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::api::{ApiError, GenerationApi};
use crate::types::JobState;

/// Poll a job until it completes, fails, is cancelled, or exhausts the
/// attempt budget.
///
/// Per attempt: check the token, sleep one interval (racing the token,
/// so a cancel during the sleep stops the loop promptly instead of
/// costing one more interval plus a wasted request), check the token
/// again, then fetch status.
///
/// Terminal outcomes:
/// - success: the job's output URLs,
/// - [`ApiError::Generation`] carrying the server's failure message,
/// - [`ApiError::JobNotFound`] when the server no longer knows the job,
/// - [`ApiError::TimedOut`] after `max_attempts` non-terminal polls,
/// - [`ApiError::Aborted`] when `cancel` fires.
pub async fn poll_until_complete(
    api: &GenerationApi,
    job_id: &str,
    poll_interval_ms: u64,
    max_attempts: u32,
    cancel: &CancellationToken,
) -> Result<Vec<String>, ApiError> {
    let interval = Duration::from_millis(poll_interval_ms);

    for attempt in 1..=max_attempts {
        if cancel.is_cancelled() {
            return Err(ApiError::Aborted);
        }

        tokio::select! {
            _ = cancel.cancelled() => return Err(ApiError::Aborted),
            _ = tokio::time::sleep(interval) => {}
        }

        if cancel.is_cancelled() {
            return Err(ApiError::Aborted);
        }

        let status = api.job_status(job_id, cancel).await?;
        match status.state() {
            JobState::Pending => {
                tracing::debug!(job_id, attempt, "Job still pending");
            }
            JobState::Done(urls) => {
                tracing::info!(job_id, attempt, outputs = urls.len(), "Job completed");
                return Ok(urls);
            }
            JobState::Failed(message) => {
                tracing::warn!(job_id, attempt, error = %message, "Job failed");
                return Err(ApiError::Generation { message });
            }
        }
    }

    tracing::warn!(job_id, max_attempts, "Poll budget exhausted");
    Err(ApiError::TimedOut {
        attempts: max_attempts,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RemoteConfig;
    use assert_matches::assert_matches;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn api_for(server: &MockServer) -> GenerationApi {
        let config = RemoteConfig::new(server.uri(), "k-test").unwrap();
        GenerationApi::new(config).unwrap()
    }

    #[tokio::test]
    async fn resolves_after_pending_polls() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/jobs/j1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": "pending",
            })))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/jobs/j1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": "done",
                "outputs": [{"url": "https://x/img.png"}],
            })))
            .mount(&server)
            .await;

        let api = api_for(&server).await;
        let urls = poll_until_complete(&api, "j1", 10, 10, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(urls, vec!["https://x/img.png"]);
    }

    #[tokio::test]
    async fn terminal_failure_carries_server_message() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/jobs/j1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": "failed",
                "error": {"message": "quota exceeded"},
            })))
            .mount(&server)
            .await;

        let api = api_for(&server).await;
        let err = poll_until_complete(&api, "j1", 10, 10, &CancellationToken::new())
            .await
            .unwrap_err();
        assert_matches!(err, ApiError::Generation { message } if message == "quota exceeded");
    }

    #[tokio::test]
    async fn gives_up_after_attempt_budget() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/jobs/j1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": "pending",
            })))
            .expect(3)
            .mount(&server)
            .await;

        let api = api_for(&server).await;
        let err = poll_until_complete(&api, "j1", 10, 3, &CancellationToken::new())
            .await
            .unwrap_err();
        assert_matches!(err, ApiError::TimedOut { attempts: 3 });
    }

    #[tokio::test]
    async fn vanished_job_is_fatal_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/jobs/j1"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;

        let api = api_for(&server).await;
        let err = poll_until_complete(&api, "j1", 10, 10, &CancellationToken::new())
            .await
            .unwrap_err();
        assert_matches!(err, ApiError::JobNotFound { .. });
    }

    #[tokio::test]
    async fn pre_cancelled_token_skips_all_requests() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/jobs/j1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": "pending",
            })))
            .expect(0)
            .mount(&server)
            .await;

        let cancel = CancellationToken::new();
        cancel.cancel();

        let api = api_for(&server).await;
        let err = poll_until_complete(&api, "j1", 10, 10, &cancel)
            .await
            .unwrap_err();
        assert_matches!(err, ApiError::Aborted);
    }

    #[tokio::test]
    async fn cancel_during_sleep_stops_within_one_tick() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/jobs/j1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": "pending",
            })))
            .expect(0)
            .mount(&server)
            .await;

        let cancel = CancellationToken::new();
        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            canceller.cancel();
        });

        let api = api_for(&server).await;
        let start = std::time::Instant::now();
        // Long interval: the loop must abort mid-sleep, not after it.
        let err = poll_until_complete(&api, "j1", 60_000, 10, &cancel)
            .await
            .unwrap_err();
        assert_matches!(err, ApiError::Aborted);
        assert!(start.elapsed() < Duration::from_secs(5));
    }
}
