//! Outbound HTTP retry shared by the embedding and language model clients.
//!
//! Connection errors, HTTP 429 and 5xx are retried with exponential backoff
//! (1s, 2s, 4s, ... capped at 32s). Any other non-success status fails
//! immediately with the response body in the error.

use anyhow::Result;
use std::time::Duration;

/// Send the request built by `build`, retrying transient failures.
///
/// `build` is called once per attempt because a `RequestBuilder` is
/// consumed by `send`. `label` names the backend in log lines and errors.
pub async fn send_with_retry<F>(
    max_retries: u32,
    label: &str,
    build: F,
) -> Result<reqwest::Response>
where
    F: Fn() -> reqwest::RequestBuilder,
{
    let mut last_err = None;

    for attempt in 0..=max_retries {
        if attempt > 0 {
            let delay = backoff(attempt);
            tracing::warn!(
                "{} request failed (attempt {}/{}), retrying in {:?}",
                label,
                attempt,
                max_retries + 1,
                delay
            );
            tokio::time::sleep(delay).await;
        }

        match build().send().await {
            Ok(response) => {
                let status = response.status();
                if status.is_success() {
                    return Ok(response);
                }
                let body_text = response.text().await.unwrap_or_default();
                let err = anyhow::anyhow!("{} API error {}: {}", label, status, body_text);
                if status.as_u16() == 429 || status.is_server_error() {
                    last_err = Some(err);
                    continue;
                }
                return Err(err);
            }
            Err(e) => {
                last_err = Some(anyhow::anyhow!("{} connection error: {}", label, e));
            }
        }
    }

    Err(last_err.unwrap_or_else(|| anyhow::anyhow!("{} request failed after retries", label)))
}

fn backoff(attempt: u32) -> Duration {
    Duration::from_secs(1 << (attempt - 1).min(5))
}
