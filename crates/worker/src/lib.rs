//! `icongen-worker` library crate.
//!
//! Re-exports configuration, batch loading, and report formatting for
//! integration testing. The binary entrypoint lives in `main.rs`.

pub mod batch;
pub mod config;
pub mod report;
