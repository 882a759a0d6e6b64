//! The `run` command: starts a job and follows it to completion.

use std::time::Instant;

use zone_safety_cli_utils::{IndicatifProgress, MultiProgress};
use zone_safety_engine::ZoneSafetyEngine;
use zone_safety_etl::RunProgress;
use zone_safety_etl_models::{EtlJob, RunRequest};

/// Runs one job with progress bars and returns its final record.
///
/// # Errors
///
/// Returns an error if the job cannot be created or its record cannot be
/// saved. A job that fails is returned, not an error.
pub async fn run_job(
    engine: &ZoneSafetyEngine,
    multi: &MultiProgress,
    request: RunRequest,
) -> Result<EtlJob, Box<dyn std::error::Error>> {
    let progress = RunProgress {
        fetch: IndicatifProgress::records_bar(multi, "Fetching incidents"),
        zones: IndicatifProgress::zones_bar(multi, "Waiting for zones"),
    };

    let start = Instant::now();
    let handle = engine.run_with_progress(request, progress).await?;
    log::info!("Started job {} for {}", handle.id(), handle.as_of());

    let job = handle.wait().await?;
    let elapsed = start.elapsed();

    if job.is_skipped() {
        log::info!(
            "Scores for {} already exist, nothing to do (use --force to recompute)",
            job.as_of
        );
    } else {
        log::info!(
            "Job {} {} in {:.1}s: {} zone rows written, {}/{} zones",
            job.id,
            job.status,
            elapsed.as_secs_f64(),
            job.records_processed,
            job.zones_completed,
            job.zones_total,
        );
    }

    Ok(job)
}
