//! REST API client for the ComfyUI HTTP endpoints.
//!
//! Wraps the ComfyUI HTTP API (workflow submission and history
//! retrieval) using [`reqwest`].

use std::time::Duration;

use async_trait::async_trait;
use icongen_core::job::FailureReason;

use crate::service::GenerationService;

/// HTTP client for a single ComfyUI instance.
///
/// The inner [`reqwest::Client`] pools connections, so one `ComfyUIApi`
/// can be reused for every request in a batch.
#[derive(Clone)]
pub struct ComfyUIApi {
    client: reqwest::Client,
    api_url: String,
}

/// Errors from the ComfyUI REST API layer.
#[derive(Debug, thiserror::Error)]
pub enum ComfyUIApiError {
    /// The HTTP request itself failed (network, DNS, timeout, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// ComfyUI returned a non-2xx status code.
    #[error("ComfyUI API error ({status}): {body}")]
    ApiError {
        /// HTTP status code.
        status: u16,
        /// Raw response body for debugging.
        body: String,
    },

    /// A 2xx response did not have the expected shape.
    #[error("Unexpected ComfyUI response: {0}")]
    Protocol(String),
}

impl From<ComfyUIApiError> for FailureReason {
    fn from(err: ComfyUIApiError) -> Self {
        match err {
            ComfyUIApiError::Request(e) => FailureReason::Transport {
                message: e.to_string(),
            },
            ComfyUIApiError::ApiError { status, body } => {
                FailureReason::Submission { status, body }
            }
            ComfyUIApiError::Protocol(message) => FailureReason::Protocol { message },
        }
    }
}

impl ComfyUIApi {
    /// Create a new API client for a ComfyUI instance.
    ///
    /// * `api_url` - Base HTTP URL, e.g. `http://host:8188`.
    pub fn new(api_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), api_url)
    }

    /// Create an API client whose individual calls give up after `timeout`.
    ///
    /// This bounds a single HTTP call only; the overall wait for a job is
    /// governed by the poller's attempt budget.
    pub fn with_timeout(
        api_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ComfyUIApiError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(client, api_url))
    }

    /// Create an API client reusing an existing [`reqwest::Client`].
    pub fn with_client(client: reqwest::Client, api_url: impl Into<String>) -> Self {
        let api_url = api_url.into().trim_end_matches('/').to_string();
        Self { client, api_url }
    }

    /// HTTP API base URL (e.g. `http://host:8188`).
    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    /// Submit a workflow for execution.
    ///
    /// Sends a `POST /prompt` request with the given workflow JSON and
    /// client ID. Returns the raw response body; extracting `prompt_id`
    /// is left to the caller.
    pub async fn submit_workflow(
        &self,
        workflow: &serde_json::Value,
        client_id: &str,
    ) -> Result<serde_json::Value, ComfyUIApiError> {
        let body = serde_json::json!({
            "prompt": workflow,
            "client_id": client_id,
        });

        let response = self
            .client
            .post(format!("{}/prompt", self.api_url))
            .json(&body)
            .send()
            .await?;

        Self::parse_response(response).await
    }

    /// Retrieve execution history for a specific prompt.
    ///
    /// Sends a `GET /history/{prompt_id}` request. Unknown prompts yield
    /// an empty object.
    pub async fn get_history(&self, prompt_id: &str) -> Result<serde_json::Value, ComfyUIApiError> {
        let response = self
            .client
            .get(format!("{}/history/{}", self.api_url, prompt_id))
            .send()
            .await?;

        Self::parse_response(response).await
    }

    // ---- private helpers ----

    /// Ensure the response has a success status code. Returns the
    /// response unchanged on success, or a [`ComfyUIApiError::ApiError`]
    /// containing the status and body text on failure.
    async fn ensure_success(
        response: reqwest::Response,
    ) -> Result<reqwest::Response, ComfyUIApiError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(ComfyUIApiError::ApiError {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    /// Parse a successful JSON response body.
    ///
    /// A 2xx body that is not JSON is a protocol error, not a transport one.
    async fn parse_response(
        response: reqwest::Response,
    ) -> Result<serde_json::Value, ComfyUIApiError> {
        let response = Self::ensure_success(response).await?;
        let text = response.text().await?;
        serde_json::from_str(&text)
            .map_err(|e| ComfyUIApiError::Protocol(format!("response is not valid JSON: {e}")))
    }
}

#[async_trait]
impl GenerationService for ComfyUIApi {
    async fn submit_prompt(
        &self,
        prompt: &serde_json::Value,
        client_id: &str,
    ) -> Result<serde_json::Value, ComfyUIApiError> {
        self.submit_workflow(prompt, client_id).await
    }

    async fn fetch_history(&self, prompt_id: &str) -> Result<serde_json::Value, ComfyUIApiError> {
        self.get_history(prompt_id).await
    }
}
