#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Feeds that supply incidents, infrastructure, and zone boundaries.
//!
//! Each provider implements one of the [`IncidentFeed`],
//! [`InfrastructureFeed`], or [`ZoneCatalogLoader`] traits. Incident feeds
//! normalize their raw records through [`raw::normalize_all`], which skips
//! malformed records and counts them by [`SkipReason`] instead of failing
//! the fetch.

pub mod geojson_feed;
pub mod parsing;
pub mod progress;
pub mod raw;
pub mod retry;
pub mod socrata;
pub mod static_feed;
pub mod type_mapping;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use zone_safety_incident_models::{Incident, SkipReason};
use zone_safety_infrastructure_models::InfrastructureAsset;
use zone_safety_zone_models::{CatalogError, ZoneCatalog};

use crate::geojson_feed::{LaneLayerConfig, ParkingLayerConfig, ZoneLayerConfig};
use crate::progress::ProgressCallback;
use crate::raw::SkipCounts;
use crate::socrata::SocrataConfig;

/// Errors that can occur while fetching from a feed.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// HTTP request failed.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON parsing failed.
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error (file read).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// `GeoJSON` document could not be parsed.
    #[error("GeoJSON error: {0}")]
    GeoJson(#[from] geojson::Error),

    /// Loaded zones do not form a valid catalog.
    #[error("Invalid zone catalog: {0}")]
    Catalog(#[from] CatalogError),

    /// The feed returned data in an unexpected shape.
    #[error("Normalization error: {message}")]
    Normalization {
        /// Description of what went wrong.
        message: String,
    },
}

/// Inclusive time range to fetch incidents for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl FetchWindow {
    #[must_use]
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.start <= at && at <= self.end
    }
}

/// Normalized incidents plus the records that were dropped.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IncidentBatch {
    pub incidents: Vec<Incident>,
    pub skipped: SkipCounts,
}

impl IncidentBatch {
    /// Number of records dropped for `reason`.
    #[must_use]
    pub fn skipped_for(&self, reason: SkipReason) -> u64 {
        self.skipped.get(reason)
    }
}

/// A bulk source of geolocated incidents.
#[async_trait]
pub trait IncidentFeed: Send + Sync {
    /// Tag stored on every incident from this feed (e.g. `"SIEDCO"`).
    fn id(&self) -> &str;

    /// Fetches and normalizes every incident inside `window`.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError`] if the feed is unreachable or returns an
    /// unexpected document. Malformed individual records are skipped and
    /// counted, not returned as errors.
    async fn fetch(
        &self,
        window: &FetchWindow,
        progress: Arc<dyn ProgressCallback>,
    ) -> Result<IncidentBatch, SourceError>;
}

/// A source of lanes and parking spots.
#[async_trait]
pub trait InfrastructureFeed: Send + Sync {
    /// Fetches every asset the feed knows about.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError`] if the feed is unreachable or malformed.
    async fn fetch(&self) -> Result<Vec<InfrastructureAsset>, SourceError>;
}

/// A source of administrative zones.
#[async_trait]
pub trait ZoneCatalogLoader: Send + Sync {
    /// Loads and validates the full catalog.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError`] if a layer cannot be fetched or the zones do
    /// not form a valid tree.
    async fn load(&self) -> Result<ZoneCatalog, SourceError>;
}

/// The `[sources]` config section.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourcesConfig {
    pub incidents: SocrataConfig,
    pub lanes: LaneLayerConfig,
    pub parking: ParkingLayerConfig,
    /// Zone layers, parents before children.
    pub zones: Vec<ZoneLayerConfig>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone as _;

    #[test]
    fn window_is_inclusive() {
        let start = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2025, 1, 31, 0, 0, 0).unwrap();
        let window = FetchWindow { start, end };

        assert!(window.contains(start));
        assert!(window.contains(end));
        assert!(!window.contains(end + chrono::Duration::seconds(1)));
    }

    #[test]
    fn sources_section_parses_partially() {
        let config: SourcesConfig = toml::from_str(
            r#"
            [incidents]
            dataset = "abcd-1234"

            [[zones]]
            location = "data/districts.geojson"
            kind = "TOP_LEVEL"
            code_property = "code"
            name_property = "name"
            "#,
        )
        .unwrap();

        assert_eq!(config.incidents.dataset, "abcd-1234");
        assert_eq!(config.incidents.date_field, "fecha");
        assert_eq!(config.zones.len(), 1);
        assert!(config.zones[0].parent_property.is_none());
    }
}
