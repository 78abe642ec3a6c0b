//! ComfyUI REST client: workflow submission and history polling.
//!
//! [`client::JobClient`] queues a [`WorkflowGraph`](icongen_core::workflow::WorkflowGraph)
//! and returns its job handle; [`poller::JobPoller`] polls the history
//! endpoint until the sink node produces an image or the attempt budget
//! runs out. Both talk to the server through the
//! [`service::GenerationService`] seam, implemented over HTTP by
//! [`api::ComfyUIApi`].

pub mod api;
pub mod backoff;
pub mod client;
pub mod clock;
pub mod history;
pub mod poller;
pub mod service;
