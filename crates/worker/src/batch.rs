//! Batch file loading and the built-in batch.
//!
//! A batch file is a JSON array of generation requests:
//!
//! ```json
//! [
//!   { "prompt": "cute shrimp icon", "width": 576, "height": 576, "output_prefix": "icon" },
//!   { "prompt": "ocean banner", "width": 1120, "height": 640, "output_prefix": "banner",
//!     "sampling": { "steps": 8, "seed": 42 } }
//! ]
//! ```
//!
//! Omitted fields take the request defaults. Requests are not validated
//! here; invalid entries fail individually when the batch runs.

use std::path::{Path, PathBuf};

use icongen_core::generation::GenerationRequest;

/// App icon prompt.
const ICON_PROMPT: &str = "emoji style shrimp icon, 🦐 cute cartoon shrimp character, deep ocean dark blue gradient background, cyan bioluminescent glow, neon teal border effect, glassmorphism, centered composition, app icon design, vibrant colors, clean simple design, no text";

/// Link-preview banner prompt.
const SNIPPET_PROMPT: &str = "emoji style banner with cute shrimp 🦐 character, deep ocean underwater scene, dark blue gradient, cyan bioluminescent particles floating, neon glow effects, glassmorphism cards, mystical fortune telling theme, wide cinematic composition, vibrant teal and burgundy accents, no text";

#[derive(Debug, thiserror::Error)]
pub enum BatchError {
    #[error("Failed to read batch file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Batch file {path} is not a JSON array of requests: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// The icon and link-preview snippet the worker generates by default.
pub fn default_batch() -> Vec<GenerationRequest> {
    vec![
        GenerationRequest::new(ICON_PROMPT, 576, 576, "krevetka_icon_576"),
        GenerationRequest::new(SNIPPET_PROMPT, 1120, 640, "krevetka_snippet"),
    ]
}

/// Read a JSON batch file.
pub fn load_batch(path: &Path) -> Result<Vec<GenerationRequest>, BatchError> {
    let text = std::fs::read_to_string(path).map_err(|source| BatchError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&text).map_err(|source| BatchError::Parse {
        path: path.to_path_buf(),
        source,
    })
}
