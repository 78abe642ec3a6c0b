//! Interpretation of `GET /history/{prompt_id}` responses.
//!
//! ComfyUI returns `{}` for prompts it has not finished (or never heard
//! of), and otherwise an object keyed by prompt ID:
//!
//! ```json
//! {
//!   "<prompt_id>": {
//!     "outputs": {
//!       "9": { "images": [{ "filename": "icon_00001_.png", "subfolder": "", "type": "output" }] }
//!     },
//!     "status": { "status_str": "success", "completed": true, "messages": [] }
//!   }
//! }
//! ```

use std::collections::HashMap;

use serde::Deserialize;

/// `status_str` value ComfyUI uses for a failed execution.
const STATUS_ERROR: &str = "error";

/// Message kind carrying the exception details of a failed execution.
const MSG_EXECUTION_ERROR: &str = "execution_error";

/// History record for one prompt.
#[derive(Debug, Clone, Deserialize)]
pub struct HistoryEntry {
    /// Per-node outputs, keyed by node ID.
    #[serde(default)]
    pub outputs: HashMap<String, NodeOutput>,
    #[serde(default)]
    pub status: Option<ExecutionStatus>,
}

/// Outputs produced by a single node.
#[derive(Debug, Clone, Deserialize)]
pub struct NodeOutput {
    #[serde(default)]
    pub images: Vec<ImageRef>,
}

/// Reference to an image file written by the server.
#[derive(Debug, Clone, Deserialize)]
pub struct ImageRef {
    pub filename: String,
}

/// Execution status block of a history entry.
#[derive(Debug, Clone, Deserialize)]
pub struct ExecutionStatus {
    #[serde(default)]
    pub status_str: String,
    /// `[kind, payload]` pairs recorded during execution.
    #[serde(default)]
    pub messages: Vec<(String, serde_json::Value)>,
}

/// What one history response says about a job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobProgress {
    /// The prompt ID is absent: queued, running, or unknown.
    Unknown,
    /// The prompt is present but the sink has no image yet.
    Pending,
    /// The sink produced this file.
    Complete { filename: String },
    /// The server recorded an execution error.
    Errored { message: String },
}

/// Classify a history response for `prompt_id`, looking for images on
/// `sink_node_id`.
///
/// Returns `Err` when the body does not have the history shape.
pub fn inspect(
    body: &serde_json::Value,
    prompt_id: &str,
    sink_node_id: &str,
) -> Result<JobProgress, serde_json::Error> {
    let Some(raw_entry) = body.get(prompt_id) else {
        return Ok(JobProgress::Unknown);
    };
    let entry = HistoryEntry::deserialize(raw_entry)?;

    if let Some(image) = entry
        .outputs
        .get(sink_node_id)
        .and_then(|output| output.images.first())
    {
        return Ok(JobProgress::Complete {
            filename: image.filename.clone(),
        });
    }

    if let Some(status) = &entry.status {
        if status.status_str == STATUS_ERROR {
            return Ok(JobProgress::Errored {
                message: error_message(status),
            });
        }
    }

    Ok(JobProgress::Pending)
}

/// Pull the exception message out of an errored status block.
fn error_message(status: &ExecutionStatus) -> String {
    status
        .messages
        .iter()
        .find(|(kind, _)| kind == MSG_EXECUTION_ERROR)
        .and_then(|(_, payload)| {
            let node = payload.get("node_id").and_then(|v| v.as_str());
            let message = payload.get("exception_message").and_then(|v| v.as_str())?;
            Some(match node {
                Some(node) => format!("node {node}: {}", message.trim()),
                None => message.trim().to_string(),
            })
        })
        .unwrap_or_else(|| "execution failed without details".to_string())
}
