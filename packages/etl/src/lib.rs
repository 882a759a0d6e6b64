#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! ETL job coordinator.
//!
//! [`JobCoordinator::run`] creates an [`EtlJob`](zone_safety_etl_models::EtlJob)
//! and drives it through one pass of the pipeline on a background task:
//!
//! 1. load the zone catalog and infrastructure,
//! 2. fetch incidents for the run's window and store the new ones,
//! 3. attribute stored incidents and assets to zones,
//! 4. aggregate, score, and recommend each zone on blocking threads,
//! 5. upsert one score row per zone.
//!
//! A run whose as-of date already has a succeeded job is a cache hit and
//! writes nothing unless `force_refresh` is set.

pub mod coordinator;
pub mod pipeline;

use serde::{Deserialize, Serialize};
use zone_safety_database::DbError;
use zone_safety_etl_models::JobStateError;
use zone_safety_metrics::AggregateError;
use zone_safety_source::SourceError;

pub use coordinator::{JobCoordinator, JobHandle, JobListener, RunProgress};
pub use pipeline::{Feeds, PipelineSettings, PipelineStats, fetch_window};

/// Errors that can occur while running a job.
#[derive(Debug, thiserror::Error)]
pub enum EtlError {
    /// A feed could not be read.
    #[error("Source error: {0}")]
    Source(#[from] SourceError),

    /// Persistence failed.
    #[error("Database error: {0}")]
    Db(#[from] DbError),

    /// A zone could not be aggregated.
    #[error("Aggregation error: {0}")]
    Aggregate(#[from] AggregateError),

    /// The job record rejected a state change.
    #[error(transparent)]
    JobState(#[from] JobStateError),

    /// A worker task panicked or was cancelled.
    #[error("Task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    /// The request named zones the catalog does not contain.
    #[error("Unknown zones: {}", codes.join(", "))]
    UnknownZones {
        /// The unmatched codes.
        codes: Vec<String>,
    },

    /// The job ran past its deadline.
    #[error("Job timed out after {secs}s")]
    Timeout {
        /// The configured deadline.
        secs: u64,
    },
}

/// The `[etl]` config section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EtlConfig {
    /// Zones aggregated at once.
    pub concurrency: usize,
    pub job_timeout_secs: u64,
    /// Incremental runs refetch this many days before the newest stored
    /// incident.
    pub incremental_buffer_days: i64,
}

impl Default for EtlConfig {
    fn default() -> Self {
        Self {
            concurrency: 8,
            job_timeout_secs: 1_800,
            incremental_buffer_days: 7,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_etl_section() {
        let config: EtlConfig = toml::from_str("concurrency = 2").unwrap();
        assert_eq!(config.concurrency, 2);
        assert_eq!(config.job_timeout_secs, 1_800);
        assert_eq!(config.incremental_buffer_days, 7);
    }

    #[test]
    fn lists_unknown_zones() {
        let err = EtlError::UnknownZones {
            codes: vec!["99".to_string(), "98".to_string()],
        };
        assert_eq!(err.to_string(), "Unknown zones: 99, 98");
    }
}
