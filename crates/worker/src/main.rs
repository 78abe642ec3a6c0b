//! `icongen-worker` -- batch image generation against ComfyUI.
//!
//! Builds one workflow per request, submits them to ComfyUI one at a
//! time, waits for each to finish, and prints the produced filenames.
//! See [`WorkerConfig::from_env`] for the environment variables.
//!
//! Exit status: `0` when at least one image was produced (or the batch
//! was empty), `1` when every request failed, `2` on configuration or
//! batch-file errors.

use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use icongen_comfyui::api::ComfyUIApi;
use icongen_pipeline::orchestrator::Orchestrator;
use icongen_pipeline::summary::BatchSummary;
use icongen_worker::batch::{default_batch, load_batch};
use icongen_worker::config::WorkerConfig;
use icongen_worker::report;

/// Exit code for startup failures (bad configuration, unreadable batch).
const EXIT_STARTUP_ERROR: i32 = 2;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    init_tracing();

    let code = match run().await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!(error = %format!("{e:#}"), "Worker failed to start");
            EXIT_STARTUP_ERROR
        }
    };
    std::process::exit(code);
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        "icongen_worker=info,icongen_pipeline=info,icongen_comfyui=info".into()
    });
    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

async fn run() -> anyhow::Result<i32> {
    let config = WorkerConfig::from_env().context("invalid configuration")?;

    let requests = match &config.batch_file {
        Some(path) => load_batch(path)?,
        None => default_batch(),
    };

    tracing::info!(
        comfyui_url = %config.comfyui_url,
        requests = requests.len(),
        poll_interval_ms = config.poll.interval.as_millis() as u64,
        poll_max_attempts = config.poll.max_attempts,
        "Starting icongen-worker",
    );

    let api = ComfyUIApi::with_timeout(config.comfyui_url.clone(), config.request_timeout)
        .context("failed to build HTTP client")?;
    let orchestrator =
        Orchestrator::for_service(Arc::new(api), config.models.clone(), config.poll.clone());

    let results = orchestrator.run(&requests).await;

    for line in report::render(&requests, &results, config.output_dir.as_deref()) {
        println!("{line}");
    }

    let summary = BatchSummary::from_results(&results);
    tracing::info!(
        total = summary.total,
        succeeded = summary.succeeded,
        failed = summary.failed,
        "Batch finished",
    );
    Ok(summary.exit_code())
}
