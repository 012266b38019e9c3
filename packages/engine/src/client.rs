//! REST client for the hosted engine.

use std::time::Duration;

use async_trait::async_trait;
use greenspace_engine_models::{
    ComputeValueRequest, ComputeValueResponse, ExportImageRequest, ExportTableRequest, Expression,
    ListOperationsResponse, Operation,
};

use crate::{EngineApi, EngineError, retry};

/// Public API endpoint.
pub const DEFAULT_API_URL: &str = "https://earthengine.googleapis.com";

/// Per-request timeout. Compute calls on large regions can take a while.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Page size for operation listing.
const OPERATIONS_PAGE_SIZE: u32 = 500;

/// Connection settings for [`RestEngine`].
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Cloud project id.
    pub project: String,
    /// OAuth2 bearer token.
    pub token: String,
    /// API base URL without trailing slash.
    pub api_url: String,
}

impl EngineConfig {
    /// Reads settings from `EARTHENGINE_PROJECT`, `EARTHENGINE_TOKEN` and
    /// (optionally) `EARTHENGINE_API_URL`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::MissingEnv`] if a required variable is unset
    /// or empty.
    pub fn from_env() -> Result<Self, EngineError> {
        Ok(Self {
            project: required_env("EARTHENGINE_PROJECT")?,
            token: required_env("EARTHENGINE_TOKEN")?,
            api_url: std::env::var("EARTHENGINE_API_URL")
                .ok()
                .filter(|v| !v.is_empty())
                .map_or_else(
                    || DEFAULT_API_URL.to_string(),
                    |v| v.trim_end_matches('/').to_string(),
                ),
        })
    }
}

fn required_env(name: &str) -> Result<String, EngineError> {
    std::env::var(name)
        .ok()
        .filter(|v| !v.is_empty())
        .ok_or_else(|| EngineError::MissingEnv {
            name: name.to_string(),
        })
}

/// [`EngineApi`] over HTTPS.
pub struct RestEngine {
    http: reqwest::Client,
    config: EngineConfig,
}

impl RestEngine {
    /// Creates a client from explicit settings.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Http`] if the HTTP client cannot be built.
    pub fn new(config: EngineConfig) -> Result<Self, EngineError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!("greenspace/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { http, config })
    }

    /// Creates a client from environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] if required variables are missing or the
    /// HTTP client cannot be built.
    pub fn from_env() -> Result<Self, EngineError> {
        Self::new(EngineConfig::from_env()?)
    }

    /// The project this client bills against.
    #[must_use]
    pub fn project(&self) -> &str {
        &self.config.project
    }

    fn endpoint(&self, method: &str) -> String {
        format!(
            "{}/v1/projects/{}/{method}",
            self.config.api_url, self.config.project
        )
    }
}

#[async_trait]
impl EngineApi for RestEngine {
    async fn compute(&self, expression: &Expression) -> Result<serde_json::Value, EngineError> {
        let url = self.endpoint("value:compute");
        let body = ComputeValueRequest { expression };
        log::debug!("POST {url} ({} values)", expression.values.len());

        let response: ComputeValueResponse = retry::send_json(|| {
            self.http
                .post(&url)
                .bearer_auth(&self.config.token)
                .json(&body)
        })
        .await?;
        Ok(response.result)
    }

    async fn export_image(&self, request: &ExportImageRequest) -> Result<Operation, EngineError> {
        let url = self.endpoint("image:export");
        log::debug!("POST {url} ({})", request.description);

        retry::send_json(|| {
            self.http
                .post(&url)
                .bearer_auth(&self.config.token)
                .json(request)
        })
        .await
    }

    async fn export_table(&self, request: &ExportTableRequest) -> Result<Operation, EngineError> {
        let url = self.endpoint("table:export");
        log::debug!("POST {url} ({})", request.description);

        retry::send_json(|| {
            self.http
                .post(&url)
                .bearer_auth(&self.config.token)
                .json(request)
        })
        .await
    }

    async fn list_operations(
        &self,
        page_token: Option<&str>,
    ) -> Result<ListOperationsResponse, EngineError> {
        let url = self.endpoint("operations");
        let page_size = OPERATIONS_PAGE_SIZE.to_string();

        retry::send_json(|| {
            let mut request = self
                .http
                .get(&url)
                .bearer_auth(&self.config.token)
                .query(&[("pageSize", page_size.as_str())]);
            if let Some(token) = page_token {
                request = request.query(&[("pageToken", token)]);
            }
            request
        })
        .await
    }
}
