#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! ETL job records and run requests.
//!
//! An [`EtlJob`] moves `PENDING -> RUNNING -> {SUCCEEDED, FAILED}`. Every
//! other move is rejected with [`JobStateError`], so a finished job can
//! never be restarted or finished twice.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use strum_macros::{AsRefStr, Display, EnumString};
use uuid::Uuid;

/// Metadata key set on jobs that found fresh scores and wrote nothing.
pub const SKIPPED_KEY: &str = "skipped";

/// Metadata key holding the zone codes a restricted job was asked for.
pub const ZONES_KEY: &str = "zones";

/// Errors from job state changes.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum JobStateError {
    /// The requested move is not part of the job lifecycle.
    #[error("Illegal job transition from {from} to {to}")]
    IllegalTransition {
        /// Status the job was in.
        from: JobStatus,
        /// Status that was requested.
        to: JobStatus,
    },
}

/// Lifecycle state of an [`EtlJob`].
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
}

impl JobStatus {
    /// `SUCCEEDED` or `FAILED`.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }

    /// Whether `self -> next` is a legal move.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Running) | (Self::Running, Self::Succeeded | Self::Failed)
        )
    }
}

/// How much incident history a run fetches.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE", ascii_case_insensitive)]
pub enum RunMode {
    /// The full lookback window ending at the as-of date
    #[default]
    Batch,
    /// From the newest stored incident, minus a buffer
    Incremental,
}

/// One run of the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EtlJob {
    pub id: Uuid,
    pub mode: RunMode,
    pub status: JobStatus,
    /// Calculation date the job computes scores for.
    pub as_of: NaiveDate,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Zone score rows written by this run.
    pub records_processed: u64,
    pub zones_total: u64,
    pub zones_completed: u64,
    pub error: Option<String>,
    pub metadata: Map<String, Value>,
}

impl EtlJob {
    /// A new `PENDING` job with a random id.
    #[must_use]
    pub fn new(mode: RunMode, as_of: NaiveDate, created_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            mode,
            status: JobStatus::Pending,
            as_of,
            created_at,
            started_at: None,
            finished_at: None,
            records_processed: 0,
            zones_total: 0,
            zones_completed: 0,
            error: None,
            metadata: Map::new(),
        }
    }

    fn transition(&mut self, to: JobStatus) -> Result<(), JobStateError> {
        if !self.status.can_transition_to(to) {
            return Err(JobStateError::IllegalTransition {
                from: self.status,
                to,
            });
        }
        self.status = to;
        Ok(())
    }

    /// `PENDING -> RUNNING`, recording the start time.
    ///
    /// # Errors
    ///
    /// Returns [`JobStateError::IllegalTransition`] unless the job is
    /// pending.
    pub fn start(&mut self, now: DateTime<Utc>) -> Result<(), JobStateError> {
        self.transition(JobStatus::Running)?;
        self.started_at = Some(now);
        Ok(())
    }

    /// `RUNNING -> SUCCEEDED`, recording the end time and record count.
    ///
    /// # Errors
    ///
    /// Returns [`JobStateError::IllegalTransition`] unless the job is
    /// running.
    pub fn succeed(
        &mut self,
        now: DateTime<Utc>,
        records_processed: u64,
    ) -> Result<(), JobStateError> {
        self.transition(JobStatus::Succeeded)?;
        self.finished_at = Some(now);
        self.records_processed = records_processed;
        Ok(())
    }

    /// `RUNNING -> FAILED`, recording the end time and error detail.
    ///
    /// # Errors
    ///
    /// Returns [`JobStateError::IllegalTransition`] unless the job is
    /// running.
    pub fn fail(
        &mut self,
        now: DateTime<Utc>,
        error: impl Into<String>,
    ) -> Result<(), JobStateError> {
        self.transition(JobStatus::Failed)?;
        self.finished_at = Some(now);
        self.error = Some(error.into());
        Ok(())
    }

    pub fn set_metadata(&mut self, key: &str, value: impl Into<Value>) {
        self.metadata.insert(key.to_string(), value.into());
    }

    /// Whether the job was satisfied by scores already on disk.
    #[must_use]
    pub fn is_skipped(&self) -> bool {
        self.metadata.get(SKIPPED_KEY).and_then(Value::as_bool) == Some(true)
    }

    /// Zone codes the job was restricted to, or `None` if it scored the
    /// whole catalog. An unreadable list counts as restricted to nothing.
    #[must_use]
    pub fn zone_scope(&self) -> Option<Vec<String>> {
        let value = self.metadata.get(ZONES_KEY)?;
        Some(
            value
                .as_array()
                .map(|codes| {
                    codes
                        .iter()
                        .filter_map(|code| code.as_str().map(ToString::to_string))
                        .collect()
                })
                .unwrap_or_default(),
        )
    }

    /// Whether this job scored every zone in `requested` (`None` meaning
    /// the whole catalog).
    #[must_use]
    pub fn covers(&self, requested: Option<&[String]>) -> bool {
        match (self.zone_scope(), requested) {
            (None, _) => true,
            (Some(_), None) => false,
            (Some(scope), Some(requested)) => requested.iter().all(|code| scope.contains(code)),
        }
    }

    /// Wall-clock run time, once finished.
    #[must_use]
    pub fn duration(&self) -> Option<chrono::Duration> {
        Some(self.finished_at? - self.started_at?)
    }
}

/// Error returned for a date range that ends before it starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("Date range end {end} is before start {start}")]
pub struct InvalidDateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

/// Inclusive range of incident dates to fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "DateRangeRepr", into = "DateRangeRepr")]
pub struct DateRange {
    start: NaiveDate,
    end: NaiveDate,
}

#[derive(Serialize, Deserialize)]
struct DateRangeRepr {
    start: NaiveDate,
    end: NaiveDate,
}

impl TryFrom<DateRangeRepr> for DateRange {
    type Error = InvalidDateRange;

    fn try_from(repr: DateRangeRepr) -> Result<Self, Self::Error> {
        Self::new(repr.start, repr.end)
    }
}

impl From<DateRange> for DateRangeRepr {
    fn from(range: DateRange) -> Self {
        Self {
            start: range.start,
            end: range.end,
        }
    }
}

impl DateRange {
    /// # Errors
    ///
    /// Returns [`InvalidDateRange`] if `end` is before `start`.
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, InvalidDateRange> {
        if end < start {
            return Err(InvalidDateRange { start, end });
        }
        Ok(Self { start, end })
    }

    #[must_use]
    pub const fn start(&self) -> NaiveDate {
        self.start
    }

    #[must_use]
    pub const fn end(&self) -> NaiveDate {
        self.end
    }
}

/// Parameters for one pipeline run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RunRequest {
    pub mode: RunMode,
    /// Restrict scoring to these zone codes. `None` scores every zone.
    pub zones: Option<Vec<String>>,
    /// Recompute even if a succeeded job already covers the as-of date.
    pub force_refresh: bool,
    /// Fetch window. Its end becomes the as-of date.
    pub date_range: Option<DateRange>,
    /// Calculation date when no range is given. Defaults to today.
    pub as_of: Option<NaiveDate>,
}

impl RunRequest {
    #[must_use]
    pub fn incremental() -> Self {
        Self {
            mode: RunMode::Incremental,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_zones(mut self, zones: Vec<String>) -> Self {
        self.zones = Some(zones);
        self
    }

    #[must_use]
    pub const fn with_force_refresh(mut self, force_refresh: bool) -> Self {
        self.force_refresh = force_refresh;
        self
    }

    #[must_use]
    pub const fn with_date_range(mut self, range: DateRange) -> Self {
        self.date_range = Some(range);
        self
    }

    #[must_use]
    pub const fn with_as_of(mut self, as_of: NaiveDate) -> Self {
        self.as_of = Some(as_of);
        self
    }

    /// The calculation date this request computes for: the range end, then
    /// the explicit as-of date, then `today`.
    #[must_use]
    pub fn resolve_as_of(&self, today: NaiveDate) -> NaiveDate {
        self.date_range
            .map(|r| r.end())
            .or(self.as_of)
            .unwrap_or(today)
    }
}
