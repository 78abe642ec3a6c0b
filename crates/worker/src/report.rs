//! Human-readable batch report.

use std::path::Path;

use icongen_core::generation::GenerationRequest;
use icongen_core::job::JobResult;
use icongen_pipeline::summary::BatchSummary;

/// One line per request, in request order, followed by the summary.
pub fn render(
    requests: &[GenerationRequest],
    results: &[JobResult],
    output_dir: Option<&Path>,
) -> Vec<String> {
    let total = results.len();
    let mut lines: Vec<String> = requests
        .iter()
        .zip(results)
        .enumerate()
        .map(|(i, (request, result))| {
            let label = format!("[{}/{total}] {}", i + 1, request.output_prefix);
            match result {
                JobResult::Complete { artifact } => {
                    format!("{label}: {}", artifact_location(output_dir, artifact))
                }
                JobResult::Failed { reason } => format!("{label}: FAILED ({reason})"),
            }
        })
        .collect();

    lines.push(format!("Summary: {}", BatchSummary::from_results(results)));
    lines
}

/// Where to find an artifact, given the server's output directory.
pub fn artifact_location(output_dir: Option<&Path>, artifact: &str) -> String {
    match output_dir {
        Some(dir) => dir.join(artifact).display().to_string(),
        None => artifact.to_string(),
    }
}
