#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Zone safety engine.
//!
//! [`ZoneSafetyEngine`] ties the pieces together: it owns the store, runs
//! ETL jobs through a [`JobCoordinator`](zone_safety_etl::JobCoordinator),
//! and answers score and insight queries. Scores are served through a
//! read-through [`ScoreCache`] that forced refreshes invalidate, and the
//! zone catalog is swapped whole after each run that reloads it.
//!
//! Configuration comes from [`EngineConfig`], a TOML document with one
//! section per crate.

pub mod cache;
pub mod catalog;
pub mod config;
pub mod engine;
pub mod feeds;

use zone_safety_database::DbError;
use zone_safety_etl::EtlError;
use zone_safety_source::SourceError;
use zone_safety_zone_models::CatalogError;

pub use cache::ScoreCache;
pub use config::{ConfigError, EngineConfig};
pub use engine::{DataAvailability, ZoneOverview, ZoneQuery, ZoneSafetyEngine};

/// Errors returned by the engine.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Db(#[from] DbError),

    #[error(transparent)]
    Etl(#[from] EtlError),

    #[error("Source error: {0}")]
    Source(#[from] SourceError),

    /// The stored zones do not form a valid catalog.
    #[error("Invalid zone catalog: {0}")]
    Catalog(#[from] CatalogError),

    /// The zone is not in the current catalog.
    #[error("Unknown zone: {code}")]
    UnknownZone { code: String },
}
