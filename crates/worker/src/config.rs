//! Environment-driven worker configuration.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use icongen_comfyui::backoff::PollBackoff;
use icongen_comfyui::poller::PollConfig;
use icongen_core::generation::ModelSet;

/// Backoff multiplier used when `POLL_BACKOFF=exponential`.
const EXPONENTIAL_MULTIPLIER: f64 = 2.0;

/// Errors raised while reading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{key} has invalid value '{value}': {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// Worker configuration loaded from environment variables.
///
/// All fields have defaults matching a local ComfyUI install running the
/// Qwen-Image Lightning models.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// ComfyUI base URL (default: `http://127.0.0.1:8190`).
    pub comfyui_url: String,
    /// Timeout for a single HTTP call, not for a whole job.
    pub request_timeout: Duration,
    pub poll: PollConfig,
    pub models: ModelSet,
    /// JSON batch file. `None` runs the built-in batch.
    pub batch_file: Option<PathBuf>,
    /// Directory where ComfyUI writes its outputs, used to print full
    /// artifact paths. `None` prints bare filenames.
    pub output_dir: Option<PathBuf>,
}

impl WorkerConfig {
    /// Load configuration from the process environment.
    ///
    /// | Env Var               | Default                                   |
    /// |-----------------------|-------------------------------------------|
    /// | `COMFYUI_URL`         | `http://127.0.0.1:8190`                   |
    /// | `REQUEST_TIMEOUT_SECS`| `30`                                      |
    /// | `POLL_INTERVAL_MS`    | `1000`                                    |
    /// | `POLL_MAX_ATTEMPTS`   | `60`                                      |
    /// | `POLL_BACKOFF`        | `fixed` (or `exponential`)                |
    /// | `POLL_MAX_DELAY_MS`   | `10000` (exponential only)                |
    /// | `POLL_JITTER`         | `false` (exponential only)                |
    /// | `BATCH_FILE`          | unset                                     |
    /// | `OUTPUT_DIR`          | unset                                     |
    /// | `UNET_NAME`, `WEIGHT_DTYPE`, `CLIP_NAME`, `CLIP_TYPE`, `LORA_NAME`, `LORA_STRENGTH`, `VAE_NAME` | Qwen-Image defaults |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let vars = Vars(lookup);

        let comfyui_url = vars.string("COMFYUI_URL", "http://127.0.0.1:8190");
        let request_timeout = Duration::from_secs(vars.positive("REQUEST_TIMEOUT_SECS", 30)?);

        let interval = Duration::from_millis(vars.positive("POLL_INTERVAL_MS", 1000)?);
        let max_attempts = u32::try_from(vars.positive("POLL_MAX_ATTEMPTS", 60)?).map_err(|e| {
            ConfigError::Invalid {
                key: "POLL_MAX_ATTEMPTS",
                value: vars.string("POLL_MAX_ATTEMPTS", ""),
                reason: e.to_string(),
            }
        })?;

        let backoff = match vars.string("POLL_BACKOFF", "fixed").to_lowercase().as_str() {
            "fixed" => PollBackoff::Fixed,
            "exponential" => PollBackoff::Exponential {
                multiplier: EXPONENTIAL_MULTIPLIER,
                max_delay: Duration::from_millis(vars.positive("POLL_MAX_DELAY_MS", 10_000)?),
                jitter: vars.parse("POLL_JITTER", false)?,
            },
            other => {
                return Err(ConfigError::Invalid {
                    key: "POLL_BACKOFF",
                    value: other.to_string(),
                    reason: "expected 'fixed' or 'exponential'".into(),
                })
            }
        };

        let defaults = ModelSet::default();
        let models = ModelSet {
            unet_name: vars.string("UNET_NAME", &defaults.unet_name),
            weight_dtype: vars.string("WEIGHT_DTYPE", &defaults.weight_dtype),
            clip_name: vars.string("CLIP_NAME", &defaults.clip_name),
            clip_type: vars.string("CLIP_TYPE", &defaults.clip_type),
            lora_name: vars.string("LORA_NAME", &defaults.lora_name),
            lora_strength: vars.parse("LORA_STRENGTH", defaults.lora_strength)?,
            vae_name: vars.string("VAE_NAME", &defaults.vae_name),
        };

        Ok(Self {
            comfyui_url,
            request_timeout,
            poll: PollConfig {
                interval,
                max_attempts,
                backoff,
            },
            models,
            batch_file: vars.optional("BATCH_FILE").map(PathBuf::from),
            output_dir: vars.optional("OUTPUT_DIR").map(PathBuf::from),
        })
    }
}

/// Typed accessors over a key lookup. Empty values count as unset.
struct Vars<F>(F);

impl<F> Vars<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn optional(&self, key: &str) -> Option<String> {
        (self.0)(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn string(&self, key: &str, default: &str) -> String {
        self.optional(key).unwrap_or_else(|| default.to_string())
    }

    /// Like [`parse`](Self::parse) for counts and durations that must not be zero.
    fn positive(&self, key: &'static str, default: u64) -> Result<u64, ConfigError> {
        match self.parse(key, default)? {
            0 => Err(ConfigError::Invalid {
                key,
                value: "0".into(),
                reason: "must be at least 1".into(),
            }),
            n => Ok(n),
        }
    }

    fn parse<T>(&self, key: &'static str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match self.optional(key) {
            None => Ok(default),
            Some(value) => value.parse().map_err(|e: T::Err| ConfigError::Invalid {
                key,
                reason: e.to_string(),
                value,
            }),
        }
    }
}
