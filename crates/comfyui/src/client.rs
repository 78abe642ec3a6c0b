//! Workflow submission.
//!
//! [`JobClient::submit`] sends one `POST /prompt` per call and returns
//! the server's `prompt_id` as a [`JobHandle`]. It never retries: ComfyUI
//! does not deduplicate prompts, so a blind retry may run the job twice.

use std::sync::Arc;

use icongen_core::job::JobHandle;
use icongen_core::workflow::WorkflowGraph;
use serde::Deserialize;

use crate::api::ComfyUIApiError;
use crate::service::GenerationService;

/// Body of a successful `/prompt` response.
#[derive(Debug, Deserialize)]
struct SubmitResponse {
    /// Server-assigned identifier for the queued prompt.
    prompt_id: Option<String>,
    /// Position in the execution queue.
    #[serde(default)]
    number: Option<i64>,
    /// Per-node validation errors ComfyUI reports alongside a queued prompt.
    #[serde(default)]
    node_errors: serde_json::Map<String, serde_json::Value>,
}

/// Submits workflow graphs to a ComfyUI server.
pub struct JobClient {
    service: Arc<dyn GenerationService>,
    /// Client ID sent with every prompt so the server can attribute them.
    client_id: String,
}

impl JobClient {
    /// Create a client with a fresh random client ID.
    pub fn new(service: Arc<dyn GenerationService>) -> Self {
        Self::with_client_id(service, uuid::Uuid::new_v4().to_string())
    }

    pub fn with_client_id(service: Arc<dyn GenerationService>, client_id: impl Into<String>) -> Self {
        Self {
            service,
            client_id: client_id.into(),
        }
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Queue `graph` for execution and return its job handle.
    ///
    /// Fails with [`ComfyUIApiError::Request`] when the call cannot
    /// complete, [`ComfyUIApiError::ApiError`] when the server rejects the
    /// workflow, and [`ComfyUIApiError::Protocol`] when a success response
    /// carries no `prompt_id`.
    pub async fn submit(&self, graph: &WorkflowGraph) -> Result<JobHandle, ComfyUIApiError> {
        let prompt = graph.to_prompt_json();
        let content_hash = graph.content_hash();

        let body = self.service.submit_prompt(&prompt, &self.client_id).await?;

        let response: SubmitResponse = serde_json::from_value(body)
            .map_err(|e| ComfyUIApiError::Protocol(format!("malformed /prompt response: {e}")))?;

        let prompt_id = response
            .prompt_id
            .filter(|id| !id.is_empty())
            .ok_or_else(|| {
                ComfyUIApiError::Protocol("/prompt response is missing 'prompt_id'".to_string())
            })?;

        if !response.node_errors.is_empty() {
            tracing::warn!(
                prompt_id = %prompt_id,
                node_errors = %serde_json::Value::Object(response.node_errors),
                "ComfyUI queued prompt with node errors",
            );
        }

        tracing::info!(
            prompt_id = %prompt_id,
            queue_number = ?response.number,
            content_hash = %content_hash,
            "Workflow submitted to ComfyUI",
        );

        Ok(JobHandle::new(prompt_id))
    }
}
