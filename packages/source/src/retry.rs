//! HTTP retry for transient errors.
//!
//! Feeds send requests through [`send_json`] or [`send_text`] rather than
//! calling `reqwest::RequestBuilder::send()` directly, so timeouts,
//! connection resets, HTTP 429 and 5xx responses are retried with
//! exponential backoff. Other 4xx responses fail immediately.

use std::time::Duration;

use crate::SourceError;

/// Retry policy for one logical request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts after the first one.
    pub max_retries: u32,
    /// Delay before the first retry; doubled on each further retry.
    pub base_delay: Duration,
    /// Upper bound on a single delay.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(4),
            max_delay: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    fn delay(&self, attempt: u32) -> Duration {
        self.base_delay
            .saturating_mul(1 << attempt.saturating_sub(1).min(16))
            .min(self.max_delay)
    }
}

/// Sends a request and parses the body as JSON.
///
/// `build_request` is called once per attempt since builders are consumed
/// by `send()`. A body that fails to parse is not retried.
///
/// # Errors
///
/// Returns [`SourceError`] if every attempt fails, the server returns a
/// non-retryable status, or the body is not valid JSON.
#[allow(clippy::future_not_send)]
pub async fn send_json<F>(
    build_request: F,
    policy: &RetryPolicy,
) -> Result<serde_json::Value, SourceError>
where
    F: Fn() -> reqwest::RequestBuilder,
{
    let text = send_text(build_request, policy).await?;
    serde_json::from_str(&text).map_err(|e| {
        let preview: String = text.chars().take(200).collect();
        log::error!("JSON parse failed: {e}\n  body preview: {preview}");
        SourceError::Json(e)
    })
}

/// Sends a request and returns the body as text.
///
/// # Errors
///
/// Returns [`SourceError`] if every attempt fails or the server returns a
/// non-retryable status.
#[allow(clippy::future_not_send)]
pub async fn send_text<F>(build_request: F, policy: &RetryPolicy) -> Result<String, SourceError>
where
    F: Fn() -> reqwest::RequestBuilder,
{
    let mut last_error = None;

    for attempt in 0..=policy.max_retries {
        if attempt > 0 {
            let delay = policy.delay(attempt);
            log::warn!("  retry {attempt}/{} in {delay:?}...", policy.max_retries);
            tokio::time::sleep(delay).await;
        }

        match build_request().send().await {
            Err(e) if is_transient(&e) => {
                log::warn!("  transient error: {e}");
                last_error = Some(SourceError::Http(e));
            }
            Err(e) => return Err(SourceError::Http(e)),
            Ok(response) => {
                let status = response.status();
                if status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
                    log::warn!("  HTTP {status}");
                    last_error = Some(SourceError::Normalization {
                        message: format!("HTTP {status} from {}", response.url()),
                    });
                    continue;
                }
                if status.is_client_error() {
                    return Err(SourceError::Normalization {
                        message: format!("HTTP {status} from {}", response.url()),
                    });
                }
                return Ok(response.text().await?);
            }
        }
    }

    Err(last_error.unwrap_or_else(|| SourceError::Normalization {
        message: "request failed after all retries".to_string(),
    }))
}

fn is_transient(e: &reqwest::Error) -> bool {
    e.is_timeout() || e.is_connect() || e.is_body() || e.is_request()
}
