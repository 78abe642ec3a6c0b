//! Domain model for ComfyUI batch image generation.
//!
//! Holds the typed workflow graph, the generation request model, the
//! fixed-topology graph builder, and the terminal job outcome types.
//! Nothing in this crate performs I/O.

pub mod error;
pub mod generation;
pub mod graph_builder;
pub mod job;
pub mod workflow;
