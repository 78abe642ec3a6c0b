//! Sequential batch orchestrator.
//!
//! For each request: build the graph, submit it, wait for the sink.
//! A failure on one request is recorded in its slot and the batch moves
//! on; `results[i]` always belongs to `requests[i]`.

use std::sync::Arc;

use icongen_comfyui::client::JobClient;
use icongen_comfyui::poller::{JobPoller, PollConfig};
use icongen_comfyui::service::GenerationService;
use icongen_core::generation::{GenerationRequest, ModelSet};
use icongen_core::graph_builder::GraphBuilder;
use icongen_core::job::{FailureReason, JobResult};

/// Runs generation requests one at a time against a single service.
pub struct Orchestrator {
    builder: GraphBuilder,
    client: JobClient,
    poller: JobPoller,
}

impl Orchestrator {
    pub fn new(builder: GraphBuilder, client: JobClient, poller: JobPoller) -> Self {
        Self {
            builder,
            client,
            poller,
        }
    }

    /// Wire a builder, client, and poller around one shared service.
    pub fn for_service(
        service: Arc<dyn GenerationService>,
        models: ModelSet,
        poll: PollConfig,
    ) -> Self {
        Self::new(
            GraphBuilder::new(models),
            JobClient::new(service.clone()),
            JobPoller::new(service, poll),
        )
    }

    /// Process `requests` in order and return one result per request.
    pub async fn run(&self, requests: &[GenerationRequest]) -> Vec<JobResult> {
        let mut results = Vec::with_capacity(requests.len());

        for (index, request) in requests.iter().enumerate() {
            tracing::info!(
                index,
                total = requests.len(),
                prefix = %request.output_prefix,
                width = request.width,
                height = request.height,
                "Generating image",
            );

            let result = self.run_one(request).await;
            match &result {
                JobResult::Complete { artifact } => {
                    tracing::info!(index, artifact = %artifact, "Request completed");
                }
                JobResult::Failed { reason } => {
                    tracing::warn!(index, reason = %reason, "Request failed");
                }
            }
            results.push(result);
        }

        results
    }

    /// Build, submit, and await a single request.
    pub async fn run_one(&self, request: &GenerationRequest) -> JobResult {
        let graph = match self.builder.build(request) {
            Ok(graph) => graph,
            Err(e) => return JobResult::failed(FailureReason::from(e)),
        };

        let handle = match self.client.submit(&graph).await {
            Ok(handle) => handle,
            Err(e) => return JobResult::failed(FailureReason::from(e)),
        };

        self.poller.await_completion(handle, graph.sink()).await
    }
}
