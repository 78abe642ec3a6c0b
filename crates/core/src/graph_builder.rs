//! Fixed-topology workflow construction.
//!
//! Every request produces the same pipeline shape; only prompt strings
//! and scalar parameters differ:
//!
//! ```text
//! UNETLoader(37) ─> LoraLoaderModelOnly(73) ─────────────┐
//! CLIPLoader(38) ─┬> CLIPTextEncode(6)  positive ────────┤
//!                 └> CLIPTextEncode(7)  negative ────────┼> KSampler(3) ─> VAEDecode(74) ─> SaveImage(9)
//! EmptyLatentImage(5) ───────────────────────────────────┘                  ^
//! VAELoader(8) ─────────────────────────────────────────────────────────────┘
//! ```
//!
//! The node IDs match the workflow exported from the ComfyUI editor so
//! server-side history stays comparable with hand-run prompts.

use crate::error::CoreError;
use crate::generation::{GenerationRequest, ModelSet};
use crate::workflow::{InputValue, Node, NodeRole, WorkflowGraph};

pub const UNET_LOADER_ID: &str = "37";
pub const CLIP_LOADER_ID: &str = "38";
pub const LORA_LOADER_ID: &str = "73";
pub const POSITIVE_ID: &str = "6";
pub const NEGATIVE_ID: &str = "7";
pub const CANVAS_ID: &str = "5";
pub const SAMPLER_ID: &str = "3";
pub const VAE_LOADER_ID: &str = "8";
pub const DECODER_ID: &str = "74";
/// Node whose `images` output is the produced artifact.
pub const SINK_ID: &str = "9";

/// One image per prompt.
const BATCH_SIZE: i64 = 1;

/// Builds workflow graphs for a fixed model set.
///
/// The builder is immutable; every call to [`build`](Self::build) returns
/// a freshly allocated graph owned by the caller.
#[derive(Debug, Clone, Default)]
pub struct GraphBuilder {
    models: ModelSet,
}

impl GraphBuilder {
    pub fn new(models: ModelSet) -> Self {
        Self { models }
    }

    /// Validate the request and build its graph, deriving the seed from
    /// the current time when none is given.
    pub fn build(&self, request: &GenerationRequest) -> Result<WorkflowGraph, CoreError> {
        self.build_at(request, chrono::Utc::now().timestamp_millis())
    }

    /// Like [`build`](Self::build) with an explicit "now" for seed derivation.
    pub fn build_at(
        &self,
        request: &GenerationRequest,
        now_millis: i64,
    ) -> Result<WorkflowGraph, CoreError> {
        request.validate()?;

        let seed = i64::try_from(request.resolve_seed(now_millis))
            .map_err(|e| CoreError::Internal(format!("Seed out of range: {e}")))?;
        let sampling = &request.sampling;
        let models = &self.models;

        let mut graph = WorkflowGraph::new(SINK_ID);

        graph.insert(
            UNET_LOADER_ID,
            Node::new(NodeRole::UnetLoader)
                .with_input("unet_name", InputValue::text(&models.unet_name))
                .with_input("weight_dtype", InputValue::text(&models.weight_dtype)),
        );
        graph.insert(
            CLIP_LOADER_ID,
            Node::new(NodeRole::TextEncoderLoader)
                .with_input("clip_name", InputValue::text(&models.clip_name))
                .with_input("type", InputValue::text(&models.clip_type)),
        );
        graph.insert(
            LORA_LOADER_ID,
            Node::new(NodeRole::LoraLoader)
                .with_input("lora_name", InputValue::text(&models.lora_name))
                .with_input("strength_model", InputValue::float(models.lora_strength))
                .with_input("model", InputValue::output(UNET_LOADER_ID, 0)),
        );
        graph.insert(
            POSITIVE_ID,
            Node::new(NodeRole::PositiveConditioning)
                .with_input("text", InputValue::text(&request.prompt))
                .with_input("clip", InputValue::output(CLIP_LOADER_ID, 0)),
        );
        graph.insert(
            NEGATIVE_ID,
            Node::new(NodeRole::NegativeConditioning)
                .with_input("text", InputValue::text(&request.negative_prompt))
                .with_input("clip", InputValue::output(CLIP_LOADER_ID, 0)),
        );
        graph.insert(
            CANVAS_ID,
            Node::new(NodeRole::LatentCanvas)
                .with_input("width", InputValue::int(request.width))
                .with_input("height", InputValue::int(request.height))
                .with_input("batch_size", InputValue::int(BATCH_SIZE)),
        );
        graph.insert(
            SAMPLER_ID,
            Node::new(NodeRole::Sampler)
                .with_input("seed", InputValue::int(seed))
                .with_input("steps", InputValue::int(i64::from(sampling.steps)))
                .with_input("cfg", InputValue::float(sampling.cfg))
                .with_input("sampler_name", InputValue::text(&sampling.sampler))
                .with_input("scheduler", InputValue::text(&sampling.scheduler))
                .with_input("denoise", InputValue::float(sampling.denoise))
                .with_input("model", InputValue::output(LORA_LOADER_ID, 0))
                .with_input("positive", InputValue::output(POSITIVE_ID, 0))
                .with_input("negative", InputValue::output(NEGATIVE_ID, 0))
                .with_input("latent_image", InputValue::output(CANVAS_ID, 0)),
        );
        graph.insert(
            VAE_LOADER_ID,
            Node::new(NodeRole::VaeLoader).with_input("vae_name", InputValue::text(&models.vae_name)),
        );
        graph.insert(
            DECODER_ID,
            Node::new(NodeRole::Decoder)
                .with_input("samples", InputValue::output(SAMPLER_ID, 0))
                .with_input("vae", InputValue::output(VAE_LOADER_ID, 0)),
        );
        graph.insert(
            SINK_ID,
            Node::new(NodeRole::Sink)
                .with_input("filename_prefix", InputValue::text(&request.output_prefix))
                .with_input("images", InputValue::output(DECODER_ID, 0)),
        );

        Ok(graph)
    }
}
