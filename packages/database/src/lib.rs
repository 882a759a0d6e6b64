#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! `DuckDB` persistence for the zone safety engine.
//!
//! A single `DuckDB` file (by default `data/zone_safety.duckdb`) holds
//! incidents, the zone catalog, infrastructure assets, per-day zone safety
//! scores, and ETL job records. Each table lives in its own module as free
//! functions over a [`duckdb::Connection`]; [`DuckDbStore`] wraps a
//! connection behind the [`SafetyStore`] trait that the ETL coordinator
//! and query engine depend on.

pub mod convert;
pub mod incidents;
pub mod infrastructure;
pub mod jobs;
pub mod paths;
pub mod schema;
pub mod scores;
pub mod store;
pub mod zones;

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

pub use store::{DuckDbStore, SafetyStore};

/// Errors that can occur during database operations.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    /// `DuckDB` error.
    #[error("DuckDB error: {0}")]
    DuckDb(#[from] duckdb::Error),

    /// I/O error (creating the data directory).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A JSON column could not be encoded or decoded.
    #[error("JSON column error: {0}")]
    Json(#[from] serde_json::Error),

    /// A stored value could not be converted back into its model type.
    #[error("Conversion error: {message}")]
    Conversion {
        /// Description of what went wrong.
        message: String,
    },
}

/// The `[storage]` config section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Database file. `None` uses [`paths::default_db_path`].
    pub path: Option<PathBuf>,
    /// Keep everything in memory and discard it on exit.
    pub in_memory: bool,
    pub threads: u32,
    /// `DuckDB` memory limit, e.g. `"512MB"`.
    pub memory_limit: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: None,
            in_memory: false,
            threads: 4,
            memory_limit: "512MB".to_string(),
        }
    }
}

impl StorageConfig {
    /// The file this config resolves to, or `None` when in memory.
    #[must_use]
    pub fn resolved_path(&self) -> Option<PathBuf> {
        if self.in_memory {
            return None;
        }
        Some(self.path.clone().unwrap_or_else(paths::default_db_path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_storage_section() {
        let config: StorageConfig = toml::from_str(
            r#"
            path = "/tmp/zones.duckdb"
            threads = 2
            "#,
        )
        .unwrap();

        assert_eq!(config.resolved_path(), Some(PathBuf::from("/tmp/zones.duckdb")));
        assert_eq!(config.threads, 2);
        assert_eq!(config.memory_limit, "512MB");
    }

    #[test]
    fn in_memory_has_no_path() {
        let config = StorageConfig {
            in_memory: true,
            ..StorageConfig::default()
        };
        assert_eq!(config.resolved_path(), None);
    }
}
