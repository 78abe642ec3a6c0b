//! Batch orchestration: one workflow per requested image, processed in
//! order, with per-item outcomes and a batch summary.

pub mod orchestrator;
pub mod summary;
