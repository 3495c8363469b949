//! Exponential-backoff retry for one-off control-plane requests.
//!
//! Used for the OAuth token exchange and the post-run reindex hook, where a
//! transient failure should not abort startup or a finished run. Bulk data
//! fetches do not go through here; they use [`crate::client::FetchClient`],
//! which retries 429s on a fixed delay and never retries other statuses.
//!
//! The `build_request` closure is called on every attempt because
//! [`reqwest::RequestBuilder`] is consumed by `send()`.

use std::time::Duration;

use crate::ApiError;

/// Maximum retry attempts for transient errors. Backoff doubles from 2s,
/// so the total wait before giving up is 62 seconds.
pub const MAX_RETRIES: u32 = 5;

/// Maximum length of the response body preview included in error logs.
const BODY_PREVIEW_LEN: usize = 300;

/// Sends the request and parses the body as JSON.
///
/// # Errors
///
/// Returns [`ApiError`] if the request fails after all retries, the server
/// returns a non-retryable status, or the body is not JSON.
pub async fn send_json<F>(build_request: F) -> Result<serde_json::Value, ApiError>
where
    F: Fn() -> reqwest::RequestBuilder,
{
    let response = send_with_retry(&build_request, MAX_RETRIES, Duration::from_secs(1)).await?;
    let status = response.status();
    let text = response.text().await?;

    serde_json::from_str(&text).map_err(|e| {
        log::error!(
            "JSON parse failed (status {status}): {e}\n  body preview: {}",
            preview(&text)
        );
        ApiError::Json(e)
    })
}

/// Sends the request, retrying transient failures with exponential
/// backoff starting at `base_delay * 2`.
///
/// Retries connection errors, timeouts, HTTP 429 and HTTP 5xx. Any other
/// 4xx is permanent.
///
/// # Errors
///
/// Returns [`ApiError`] once retries are exhausted or on a permanent
/// failure.
pub async fn send_with_retry<F>(
    build_request: &F,
    max_retries: u32,
    base_delay: Duration,
) -> Result<reqwest::Response, ApiError>
where
    F: Fn() -> reqwest::RequestBuilder,
{
    let mut last_error = None;

    for attempt in 0..=max_retries {
        if attempt > 0 {
            let delay = base_delay * (1u32 << attempt.min(16));
            log::warn!("  retry {attempt}/{max_retries} in {delay:?}...");
            tokio::time::sleep(delay).await;
        }

        match build_request().send().await {
            Err(e) => {
                if is_transient(&e) && attempt < max_retries {
                    log::warn!("  transient error: {e}");
                    last_error = Some(ApiError::Http(e));
                    continue;
                }
                return Err(ApiError::Http(e));
            }
            Ok(response) => {
                let status = response.status();

                if status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
                    if attempt < max_retries {
                        log::warn!("  HTTP {status}");
                        last_error = Some(ApiError::Request {
                            message: format!("HTTP {status}"),
                        });
                        continue;
                    }
                    return Err(ApiError::Request {
                        message: format!("HTTP {status} after {max_retries} retries"),
                    });
                }

                if status.is_client_error() {
                    let body = response.text().await.unwrap_or_default();
                    return Err(ApiError::Request {
                        message: format!("HTTP {status}: {}", preview(&body)),
                    });
                }

                return Ok(response);
            }
        }
    }

    Err(last_error.unwrap_or_else(|| ApiError::Request {
        message: "request failed after all retries".to_string(),
    }))
}

fn preview(text: &str) -> String {
    if text.len() > BODY_PREVIEW_LEN {
        let cut = (0..=BODY_PREVIEW_LEN)
            .rev()
            .find(|&i| text.is_char_boundary(i))
            .unwrap_or(0);
        format!("{}...", &text[..cut])
    } else {
        text.to_string()
    }
}

/// Returns `true` if the error is likely transient and worth retrying.
fn is_transient(e: &reqwest::Error) -> bool {
    e.is_timeout() || e.is_connect() || e.is_body() || e.is_request()
}
