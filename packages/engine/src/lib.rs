#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Client side of the hosted geospatial engine.
//!
//! Computations are described as deferred expression graphs
//! ([`expr::Node`], wrapped by the typed handles in [`objects`]) and
//! shipped to the engine either for synchronous evaluation
//! ([`EngineApi::compute`]) or as asynchronous export tasks
//! ([`EngineApi::export_image`], [`EngineApi::export_table`]).
//!
//! Two implementations of [`EngineApi`] are provided:
//!
//! - [`client::RestEngine`] talks to the real REST API.
//! - [`recording::RecordingEngine`] records every request and answers
//!   from a script, for dry runs and tests.
//!
//! # Environment Variables
//!
//! | Variable | Required | Description |
//! |---|---|---|
//! | `EARTHENGINE_PROJECT` | Yes | Cloud project that owns compute and export quota |
//! | `EARTHENGINE_TOKEN` | Yes | OAuth2 bearer token with the Earth Engine scope |
//! | `EARTHENGINE_API_URL` | No | API base URL (defaults to the public endpoint) |

pub mod client;
pub mod expr;
pub mod objects;
pub mod recording;
pub mod retry;
pub mod serialize;

use async_trait::async_trait;
use greenspace_engine_models::{
    ExportImageRequest, ExportTableRequest, Expression, ListOperationsResponse, Operation,
};

pub use expr::Node;

/// Errors that can occur while talking to the engine.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Missing required environment variable.
    #[error("Missing environment variable: {name}")]
    MissingEnv {
        /// Name of the missing environment variable.
        name: String,
    },

    /// HTTP request failed.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON encoding or decoding failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The engine rejected the request (bad expression, missing asset,
    /// quota, permissions). Not retried.
    #[error("Engine rejected request (HTTP {status}): {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Message from the API error body.
        message: String,
    },

    /// Rate limiting or server error that persisted through all retries.
    #[error("Engine unavailable: {message}")]
    Transient {
        /// Description of the last failure.
        message: String,
    },
}

/// Operations the pipeline needs from the engine.
///
/// Export submissions carry a `request_id`; resubmitting the same
/// request with the same id must not start a second task.
#[async_trait]
pub trait EngineApi: Send + Sync {
    /// Evaluates `expression` and returns its value as JSON.
    async fn compute(&self, expression: &Expression) -> Result<serde_json::Value, EngineError>;

    /// Starts an image export task.
    async fn export_image(&self, request: &ExportImageRequest) -> Result<Operation, EngineError>;

    /// Starts a table export task.
    async fn export_table(&self, request: &ExportTableRequest) -> Result<Operation, EngineError>;

    /// Lists export operations, one page at a time.
    async fn list_operations(
        &self,
        page_token: Option<&str>,
    ) -> Result<ListOperationsResponse, EngineError>;
}

/// Evaluates a node and deserializes the result.
///
/// # Errors
///
/// Returns [`EngineError`] if serialization, evaluation, or decoding
/// of the result fails.
pub async fn compute_as<T: serde::de::DeserializeOwned>(
    engine: &dyn EngineApi,
    node: &Node,
) -> Result<T, EngineError> {
    let expression = serialize::to_expression(node)?;
    let value = engine.compute(&expression).await?;
    Ok(serde_json::from_value(value)?)
}

/// Fetches every export operation, following page tokens.
///
/// # Errors
///
/// Returns [`EngineError`] if any page request fails.
pub async fn list_all_operations(engine: &dyn EngineApi) -> Result<Vec<Operation>, EngineError> {
    let mut operations = Vec::new();
    let mut token: Option<String> = None;

    loop {
        let page = engine.list_operations(token.as_deref()).await?;
        operations.extend(page.operations);
        match page.next_page_token {
            Some(next) if !next.is_empty() => token = Some(next),
            _ => break,
        }
    }

    Ok(operations)
}
