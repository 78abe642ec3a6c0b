//! Job handles and terminal outcomes.

use std::fmt;

use serde::Serialize;

use crate::error::CoreError;

/// Correlation identifier returned by ComfyUI when a prompt is queued.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct JobHandle(String);

impl JobHandle {
    pub fn new(prompt_id: impl Into<String>) -> Self {
        Self(prompt_id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Why a request did not produce an artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FailureReason {
    /// Request parameters were rejected before any network call.
    #[error("invalid request: {message}")]
    Validation { message: String },

    /// A network call could not complete.
    #[error("transport error: {message}")]
    Transport { message: String },

    /// The service rejected the workflow.
    #[error("service rejected workflow ({status}): {body}")]
    Submission { status: u16, body: String },

    /// The service answered without a field we rely on.
    #[error("protocol error: {message}")]
    Protocol { message: String },

    /// The polling budget ran out before the sink produced output.
    #[error("timed out after {attempts} poll attempts")]
    Timeout { attempts: u32 },

    /// The graph could not be assembled from a valid request.
    #[error("internal error: {message}")]
    Internal { message: String },
}

/// Terminal outcome of one generation request. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum JobResult {
    /// The sink produced an artifact with this filename.
    Complete { artifact: String },
    Failed { reason: FailureReason },
}

impl JobResult {
    pub fn complete(artifact: impl Into<String>) -> Self {
        JobResult::Complete {
            artifact: artifact.into(),
        }
    }

    pub fn failed(reason: FailureReason) -> Self {
        JobResult::Failed { reason }
    }

    pub fn is_complete(&self) -> bool {
        matches!(self, JobResult::Complete { .. })
    }

    pub fn artifact(&self) -> Option<&str> {
        match self {
            JobResult::Complete { artifact } => Some(artifact),
            JobResult::Failed { .. } => None,
        }
    }

    pub fn failure(&self) -> Option<&FailureReason> {
        match self {
            JobResult::Complete { .. } => None,
            JobResult::Failed { reason } => Some(reason),
        }
    }
}

impl From<CoreError> for FailureReason {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Validation(message) => FailureReason::Validation { message },
            other => FailureReason::Internal {
                message: other.to_string(),
            },
        }
    }
}
