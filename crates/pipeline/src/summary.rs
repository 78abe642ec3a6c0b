//! Batch outcome summary and exit-status policy.

use std::fmt;

use icongen_core::job::JobResult;
use serde::Serialize;

/// Exit code when the batch succeeded at least partially.
pub const EXIT_OK: i32 = 0;
/// Exit code when every item in a non-empty batch failed.
pub const EXIT_ALL_FAILED: i32 = 1;

/// Counts of succeeded and failed items in a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
}

impl BatchSummary {
    pub fn from_results(results: &[JobResult]) -> Self {
        let succeeded = results.iter().filter(|r| r.is_complete()).count();
        Self {
            total: results.len(),
            succeeded,
            failed: results.len() - succeeded,
        }
    }

    /// True when there was work and none of it succeeded.
    pub fn all_failed(&self) -> bool {
        self.total > 0 && self.succeeded == 0
    }

    /// Individual failures are not fatal; only a fully failed batch is.
    pub fn exit_code(&self) -> i32 {
        if self.all_failed() {
            EXIT_ALL_FAILED
        } else {
            EXIT_OK
        }
    }
}

impl fmt::Display for BatchSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} of {} generated, {} failed",
            self.succeeded, self.total, self.failed
        )
    }
}
