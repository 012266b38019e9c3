//! HTTP retry helpers for transient errors.
//!
//! Every engine request goes through [`send_json`], which retries
//! connection failures, timeouts, HTTP 429 and HTTP 5xx with exponential
//! backoff. Any other 4xx is permanent and surfaces as
//! [`EngineError::Api`] carrying the message from the API error body.
//!
//! Export submissions are safe to retry because the caller fixes the
//! `requestId` before the first attempt.

use std::time::Duration;

use greenspace_engine_models::ApiErrorBody;
use serde::de::DeserializeOwned;

use crate::EngineError;

/// Maximum number of retry attempts for transient errors.
///
/// With exponential backoff (2s, 4s, 8s, 16s, 32s) the total wait before
/// giving up is 62 seconds.
const MAX_RETRIES: u32 = 5;

/// Maximum number of full re-fetch attempts when a 2xx body cannot be
/// decoded (truncated or garbled response).
const MAX_BODY_RETRIES: u32 = 2;

/// Maximum length of the response body preview included in error logs.
const BODY_PREVIEW_LEN: usize = 500;

/// Sends an HTTP request and decodes the response body as JSON.
///
/// The `build_request` closure is called on each attempt to construct a
/// fresh [`reqwest::RequestBuilder`], since builders are consumed by
/// `.send()`.
///
/// # Errors
///
/// Returns [`EngineError::Api`] for permanent rejections,
/// [`EngineError::Transient`] if retries are exhausted, and
/// [`EngineError::Json`] if the body never decodes.
#[allow(clippy::future_not_send)]
pub async fn send_json<T, F>(build_request: F) -> Result<T, EngineError>
where
    T: DeserializeOwned,
    F: Fn() -> reqwest::RequestBuilder,
{
    let mut body_attempt = 0;

    loop {
        let response = send_inner(&build_request, MAX_RETRIES).await?;
        let url = response.url().to_string();
        let text = response.text().await?;

        match serde_json::from_str(&text) {
            Ok(value) => return Ok(value),
            Err(e) if body_attempt < MAX_BODY_RETRIES => {
                body_attempt += 1;
                let delay = backoff(body_attempt);
                log::warn!(
                    "JSON decode failed (body retry {body_attempt}/{MAX_BODY_RETRIES}), \
                     re-fetching in {delay:?}...\n  url: {url}\n  error: {e}\n  \
                     body preview: {}",
                    preview(&text),
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => {
                log::error!(
                    "JSON decode failed after {MAX_BODY_RETRIES} retries.\n  url: {url}\n  \
                     body preview: {}",
                    preview(&text),
                );
                return Err(EngineError::Json(e));
            }
        }
    }
}

/// Core retry loop. Returns the first 2xx/3xx response.
#[allow(clippy::future_not_send)]
async fn send_inner<F>(build_request: &F, max_retries: u32) -> Result<reqwest::Response, EngineError>
where
    F: Fn() -> reqwest::RequestBuilder,
{
    let mut attempt = 0;

    loop {
        if attempt > 0 {
            let delay = backoff(attempt);
            log::warn!("  retry {attempt}/{max_retries} in {delay:?}...");
            tokio::time::sleep(delay).await;
        }

        let response = match build_request().send().await {
            Ok(response) => response,
            Err(e) if is_transient(&e) && attempt < max_retries => {
                log::warn!("  transient error: {e}");
                attempt += 1;
                continue;
            }
            Err(e) => return Err(EngineError::Http(e)),
        };

        let status = response.status();
        if is_retryable_status(status) {
            if attempt < max_retries {
                log::warn!("  HTTP {status}");
                attempt += 1;
                continue;
            }
            return Err(EngineError::Transient {
                message: format!("HTTP {status} after {max_retries} retries"),
            });
        }

        if status.is_client_error() || status.is_server_error() {
            let body = response.text().await.unwrap_or_default();
            return Err(EngineError::Api {
                status: status.as_u16(),
                message: api_error_message(&body),
            });
        }

        return Ok(response);
    }
}

/// 2s, 4s, 8s, ...
fn backoff(attempt: u32) -> Duration {
    Duration::from_secs(1u64 << attempt.min(6))
}

/// Returns `true` for statuses worth retrying: 429 and all 5xx.
#[must_use]
pub fn is_retryable_status(status: reqwest::StatusCode) -> bool {
    status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

/// Returns `true` if the error is likely transient and worth retrying.
fn is_transient(e: &reqwest::Error) -> bool {
    e.is_timeout() || e.is_connect() || e.is_body() || e.is_request()
}

/// Extracts the message from a Google API error body, falling back to a
/// preview of the raw body.
#[must_use]
pub fn api_error_message(body: &str) -> String {
    serde_json::from_str::<ApiErrorBody>(body).map_or_else(
        |_| preview(body),
        |parsed| match parsed.error.status {
            Some(status) => format!("{status}: {}", parsed.error.message),
            None => parsed.error.message,
        },
    )
}

fn preview(text: &str) -> String {
    if text.len() > BODY_PREVIEW_LEN {
        let mut end = BODY_PREVIEW_LEN;
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...", &text[..end])
    } else {
        text.to_string()
    }
}
