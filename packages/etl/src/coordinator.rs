//! Job lifecycle around [`run_pipeline`].

use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDate, Utc};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use uuid::Uuid;
use zone_safety_database::SafetyStore;
use zone_safety_etl_models::{EtlJob, RunRequest, SKIPPED_KEY, ZONES_KEY};
use zone_safety_source::progress::{ProgressCallback, null_progress};

use crate::EtlError;
use crate::pipeline::{Feeds, PipelineSettings, PipelineStats, RunContext, ZoneCounters, run_pipeline};

/// Observes job events. The query engine uses it to drop cached scores.
pub trait JobListener: Send + Sync {
    /// A forced refresh is about to recompute `as_of`.
    fn refresh_started(&self, _as_of: NaiveDate) {}

    /// A job reached a terminal state and was saved.
    fn job_finished(&self, _job: &EtlJob) {}
}

/// Progress sinks for one run.
#[derive(Clone)]
pub struct RunProgress {
    /// Incident records fetched.
    pub fetch: Arc<dyn ProgressCallback>,
    /// Zones scored.
    pub zones: Arc<dyn ProgressCallback>,
}

impl Default for RunProgress {
    fn default() -> Self {
        Self {
            fetch: null_progress(),
            zones: null_progress(),
        }
    }
}

/// A job running in the background.
pub struct JobHandle {
    id: Uuid,
    as_of: NaiveDate,
    counters: Arc<ZoneCounters>,
    task: JoinHandle<Result<EtlJob, EtlError>>,
}

impl JobHandle {
    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }

    #[must_use]
    pub const fn as_of(&self) -> NaiveDate {
        self.as_of
    }

    /// `(zones completed, zones total)` so far.
    #[must_use]
    pub fn progress(&self) -> (u64, u64) {
        self.counters.snapshot()
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Waits for the job to reach a terminal state.
    ///
    /// A pipeline failure still yields `Ok` with a `FAILED` job; `Err` means
    /// the job record itself could not be saved.
    ///
    /// # Errors
    ///
    /// Returns [`EtlError`] if the job task panicked or its record could
    /// not be persisted.
    pub async fn wait(self) -> Result<EtlJob, EtlError> {
        self.task.await?
    }
}

/// Runs jobs and reports their status.
#[derive(Clone)]
pub struct JobCoordinator {
    feeds: Feeds,
    store: Arc<dyn SafetyStore>,
    settings: Arc<PipelineSettings>,
    listeners: Vec<Arc<dyn JobListener>>,
}

impl JobCoordinator {
    #[must_use]
    pub fn new(feeds: Feeds, store: Arc<dyn SafetyStore>, settings: PipelineSettings) -> Self {
        Self {
            feeds,
            store,
            settings: Arc::new(settings),
            listeners: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_listener(mut self, listener: Arc<dyn JobListener>) -> Self {
        self.listeners.push(listener);
        self
    }

    #[must_use]
    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Starts a job without progress reporting.
    ///
    /// # Errors
    ///
    /// Returns [`EtlError::Db`] if the `PENDING` job cannot be saved.
    pub async fn run(&self, request: RunRequest) -> Result<JobHandle, EtlError> {
        self.run_with_progress(request, RunProgress::default()).await
    }

    /// Saves a `PENDING` job and starts it on a background task.
    ///
    /// # Errors
    ///
    /// Returns [`EtlError::Db`] if the `PENDING` job cannot be saved.
    pub async fn run_with_progress(
        &self,
        request: RunRequest,
        progress: RunProgress,
    ) -> Result<JobHandle, EtlError> {
        let now = Utc::now();
        let as_of = request.resolve_as_of(now.date_naive());
        let job = EtlJob::new(request.mode, as_of, now);
        self.store.save_job(&job)?;

        log::info!("Created {} job {} for {as_of}", job.mode, job.id);

        let id = job.id;
        let counters = Arc::new(ZoneCounters::default());
        let this = self.clone();
        let task_counters = counters.clone();
        let task = tokio::spawn(async move {
            this.execute(job, request, progress, task_counters).await
        });

        Ok(JobHandle {
            id,
            as_of,
            counters,
            task,
        })
    }

    /// Looks up a job's current record.
    ///
    /// # Errors
    ///
    /// Returns [`EtlError::Db`] if the lookup fails.
    pub fn status(&self, id: Uuid) -> Result<Option<EtlJob>, EtlError> {
        Ok(self.store.get_job(id)?)
    }

    async fn execute(
        &self,
        mut job: EtlJob,
        request: RunRequest,
        progress: RunProgress,
        counters: Arc<ZoneCounters>,
    ) -> Result<EtlJob, EtlError> {
        job.start(Utc::now())?;
        job.set_metadata("force_refresh", request.force_refresh);
        if let Some(zones) = &request.zones {
            job.set_metadata(ZONES_KEY, zones.clone());
        }
        self.store.save_job(&job)?;

        if request.force_refresh {
            for listener in &self.listeners {
                listener.refresh_started(job.as_of);
            }
        } else if let Some(cached) = self
            .store
            .succeeded_jobs(Some(job.as_of))?
            .into_iter()
            .find(|prior| prior.covers(request.zones.as_deref()))
        {
            log::info!(
                "Scores for {} already computed by job {}, skipping",
                job.as_of,
                cached.id
            );
            job.set_metadata(SKIPPED_KEY, true);
            job.set_metadata("cached_job_id", cached.id.to_string());
            job.succeed(Utc::now(), 0)?;
            return self.finish(job);
        }

        let secs = self.settings.etl.job_timeout_secs;
        let ctx = RunContext {
            feeds: self.feeds.clone(),
            store: self.store.clone(),
            settings: self.settings.clone(),
            job_id: job.id,
            as_of: job.as_of,
            request,
            progress,
            counters: counters.clone(),
            deadline: deadline_after(secs),
        };

        let outcome = run_pipeline(&ctx).await;

        let (completed, total) = counters.snapshot();
        job.zones_completed = completed;
        job.zones_total = total;
        job.set_metadata("zones_completed", completed);

        match outcome {
            Ok(stats) => {
                record_stats(&mut job, &stats);
                job.succeed(Utc::now(), stats.zones_scored)?;
            }
            Err(e) => {
                log::error!("Job {} failed: {e}", job.id);
                job.fail(Utc::now(), e.to_string())?;
            }
        }

        self.finish(job)
    }

    fn finish(&self, job: EtlJob) -> Result<EtlJob, EtlError> {
        self.store.save_job(&job)?;

        log::info!(
            "Job {} {}: {} zone rows written, {}/{} zones",
            job.id,
            job.status,
            job.records_processed,
            job.zones_completed,
            job.zones_total,
        );

        for listener in &self.listeners {
            listener.job_finished(&job);
        }
        Ok(job)
    }
}

/// `secs` from now, saturating far in the future.
fn deadline_after(secs: u64) -> Instant {
    let now = Instant::now();
    now.checked_add(Duration::from_secs(secs))
        .unwrap_or_else(|| now + Duration::from_secs(30 * 365 * 86_400))
}

fn record_stats(job: &mut EtlJob, stats: &PipelineStats) {
    job.set_metadata("fetched", stats.fetched);
    job.set_metadata("inserted_incidents", stats.inserted);
    job.set_metadata("skipped_total", stats.skipped.total());
    if let Ok(skipped) = serde_json::to_value(&stats.skipped) {
        job.set_metadata("skipped_records", skipped);
    }
    job.set_metadata("unattributed_incidents", stats.unattributed_incidents);
    job.set_metadata("excluded_incidents", stats.excluded_incidents);
    if let Some(window) = stats.window {
        job.set_metadata("window_start", window.start.to_rfc3339());
        job.set_metadata("window_end", window.end.to_rfc3339());
    }
}
