//! The seam between job submission/polling and the transport.

use async_trait::async_trait;

use crate::api::ComfyUIApiError;

/// Operations the job client and poller need from a ComfyUI server.
///
/// [`ComfyUIApi`](crate::api::ComfyUIApi) implements this over HTTP;
/// tests substitute scripted in-memory services.
#[async_trait]
pub trait GenerationService: Send + Sync {
    /// Queue a prompt. Returns the raw response body.
    async fn submit_prompt(
        &self,
        prompt: &serde_json::Value,
        client_id: &str,
    ) -> Result<serde_json::Value, ComfyUIApiError>;

    /// Fetch the history document for one prompt ID.
    async fn fetch_history(&self, prompt_id: &str) -> Result<serde_json::Value, ComfyUIApiError>;
}
