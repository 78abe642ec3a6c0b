//! Generation request model, defaults, and validation.
//!
//! A [`GenerationRequest`] carries everything that varies between two
//! images produced by the same pipeline: prompt texts, canvas size,
//! output prefix, and sampling parameters. Model filenames are a
//! deployment concern and live in [`ModelSet`].

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

/// Negative prompt applied when a request does not supply one.
pub const DEFAULT_NEGATIVE_PROMPT: &str =
    "blurry, low quality, text, watermark, signature, ugly, distorted";

/// The Lightning LoRA is distilled for four steps.
pub const DEFAULT_STEPS: u32 = 4;
pub const DEFAULT_CFG: f64 = 1.0;
pub const DEFAULT_SAMPLER: &str = "euler";
pub const DEFAULT_SCHEDULER: &str = "normal";
pub const DEFAULT_DENOISE: f64 = 1.0;

/// Seeds must fit in a signed 32-bit integer on the service side.
pub const SEED_MODULUS: u64 = 2_147_483_647;

pub const DEFAULT_UNET_NAME: &str = "qwen_image_2512_fp8_e4m3fn.safetensors";
pub const DEFAULT_WEIGHT_DTYPE: &str = "fp8_e4m3fn";
pub const DEFAULT_CLIP_NAME: &str = "qwen_2.5_vl_7b_fp8_scaled.safetensors";
pub const DEFAULT_CLIP_TYPE: &str = "qwen_image";
pub const DEFAULT_LORA_NAME: &str = "Qwen-Image-2512-Lightning-4steps-V1.0-bf16.safetensors";
pub const DEFAULT_LORA_STRENGTH: f64 = 1.0;
pub const DEFAULT_VAE_NAME: &str = "qwen_image_vae.safetensors";

// ---------------------------------------------------------------------------
// Request types
// ---------------------------------------------------------------------------

/// Sampler settings for one generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplingParams {
    pub steps: u32,
    pub cfg: f64,
    pub sampler: String,
    pub scheduler: String,
    pub denoise: f64,
    /// Explicit seed. `None` derives one from the current time.
    pub seed: Option<u64>,
}

impl Default for SamplingParams {
    fn default() -> Self {
        Self {
            steps: DEFAULT_STEPS,
            cfg: DEFAULT_CFG,
            sampler: DEFAULT_SAMPLER.to_string(),
            scheduler: DEFAULT_SCHEDULER.to_string(),
            denoise: DEFAULT_DENOISE,
            seed: None,
        }
    }
}

/// One requested output image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub prompt: String,
    #[serde(default = "default_negative_prompt")]
    pub negative_prompt: String,
    /// Canvas width in pixels. Signed so bad input can be reported instead
    /// of failing deserialization.
    pub width: i64,
    pub height: i64,
    /// Filename prefix handed to the sink node.
    pub output_prefix: String,
    #[serde(default)]
    pub sampling: SamplingParams,
}

fn default_negative_prompt() -> String {
    DEFAULT_NEGATIVE_PROMPT.to_string()
}

impl GenerationRequest {
    /// Build a request with the default negative prompt and sampling.
    pub fn new(
        prompt: impl Into<String>,
        width: i64,
        height: i64,
        output_prefix: impl Into<String>,
    ) -> Self {
        Self {
            prompt: prompt.into(),
            negative_prompt: default_negative_prompt(),
            width,
            height,
            output_prefix: output_prefix.into(),
            sampling: SamplingParams::default(),
        }
    }

    pub fn with_negative_prompt(mut self, negative: impl Into<String>) -> Self {
        self.negative_prompt = negative.into();
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.sampling.seed = Some(seed);
        self
    }

    /// Reject requests that would only fail later inside the service.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.prompt.trim().is_empty() {
            return Err(CoreError::Validation("Prompt must not be empty".to_string()));
        }
        if self.width <= 0 || self.height <= 0 {
            return Err(CoreError::Validation(format!(
                "Width and height must be positive, got {}x{}",
                self.width, self.height
            )));
        }
        if self.output_prefix.trim().is_empty() {
            return Err(CoreError::Validation(
                "Output prefix must not be empty".to_string(),
            ));
        }
        if self.sampling.steps == 0 {
            return Err(CoreError::Validation(
                "Step count must be at least 1".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.sampling.denoise) {
            return Err(CoreError::Validation(format!(
                "Denoise must be between 0.0 and 1.0, got {}",
                self.sampling.denoise
            )));
        }
        Ok(())
    }

    /// The explicit seed, or one derived from `now_millis`.
    pub fn resolve_seed(&self, now_millis: i64) -> u64 {
        match self.sampling.seed {
            Some(seed) => seed % SEED_MODULUS,
            None => seed_from_millis(now_millis),
        }
    }
}

/// Derive a seed from a Unix timestamp in milliseconds.
pub fn seed_from_millis(millis: i64) -> u64 {
    millis.unsigned_abs() % SEED_MODULUS
}

// ---------------------------------------------------------------------------
// Model set
// ---------------------------------------------------------------------------

/// Model files loaded by the pipeline. Fixed per deployment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSet {
    pub unet_name: String,
    pub weight_dtype: String,
    pub clip_name: String,
    pub clip_type: String,
    pub lora_name: String,
    pub lora_strength: f64,
    pub vae_name: String,
}

impl Default for ModelSet {
    fn default() -> Self {
        Self {
            unet_name: DEFAULT_UNET_NAME.to_string(),
            weight_dtype: DEFAULT_WEIGHT_DTYPE.to_string(),
            clip_name: DEFAULT_CLIP_NAME.to_string(),
            clip_type: DEFAULT_CLIP_TYPE.to_string(),
            lora_name: DEFAULT_LORA_NAME.to_string(),
            lora_strength: DEFAULT_LORA_STRENGTH,
            vae_name: DEFAULT_VAE_NAME.to_string(),
        }
    }
}
