//! In-memory feeds for tests, replays, and offline runs.

use std::sync::Arc;

use async_trait::async_trait;
use zone_safety_incident_models::Incident;
use zone_safety_infrastructure_models::InfrastructureAsset;
use zone_safety_zone_models::{Zone, ZoneCatalog};

use crate::progress::ProgressCallback;
use crate::raw::{RawIncident, normalize_all};
use crate::{
    FetchWindow, IncidentBatch, IncidentFeed, InfrastructureFeed, SourceError, ZoneCatalogLoader,
};

/// Serves a fixed set of records, filtered to the requested window.
#[derive(Debug, Clone, Default)]
pub struct StaticIncidentFeed {
    id: String,
    incidents: Vec<Incident>,
    raw: Vec<RawIncident>,
}

impl StaticIncidentFeed {
    #[must_use]
    pub fn new(id: impl Into<String>, incidents: Vec<Incident>) -> Self {
        Self {
            id: id.into(),
            incidents,
            raw: Vec::new(),
        }
    }

    /// Feed whose records go through normalization on every fetch.
    #[must_use]
    pub fn from_raw(id: impl Into<String>, raw: Vec<RawIncident>) -> Self {
        Self {
            id: id.into(),
            incidents: Vec::new(),
            raw,
        }
    }
}

#[async_trait]
impl IncidentFeed for StaticIncidentFeed {
    fn id(&self) -> &str {
        &self.id
    }

    async fn fetch(
        &self,
        window: &FetchWindow,
        progress: Arc<dyn ProgressCallback>,
    ) -> Result<IncidentBatch, SourceError> {
        let (normalized, skipped) = normalize_all(&self.raw, &self.id);

        let incidents: Vec<Incident> = self
            .incidents
            .iter()
            .cloned()
            .chain(normalized)
            .filter(|i| window.contains(i.occurred_at))
            .collect();

        progress.inc(incidents.len() as u64);
        Ok(IncidentBatch { incidents, skipped })
    }
}

/// Serves a fixed asset list.
#[derive(Debug, Clone, Default)]
pub struct StaticInfrastructureFeed(pub Vec<InfrastructureAsset>);

#[async_trait]
impl InfrastructureFeed for StaticInfrastructureFeed {
    async fn fetch(&self) -> Result<Vec<InfrastructureAsset>, SourceError> {
        Ok(self.0.clone())
    }
}

/// Serves a fixed zone list, validated on each load.
#[derive(Debug, Clone, Default)]
pub struct StaticZoneLoader(pub Vec<Zone>);

#[async_trait]
impl ZoneCatalogLoader for StaticZoneLoader {
    async fn load(&self) -> Result<ZoneCatalog, SourceError> {
        Ok(ZoneCatalog::new(self.0.clone())?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::null_progress;
    use chrono::{TimeZone as _, Utc};
    use zone_safety_incident_models::SkipReason;
    use zone_safety_zone_models::ZoneKind;

    fn window() -> FetchWindow {
        FetchWindow {
            start: Utc.with_ymd_and_hms(2025, 5, 1, 0, 0, 0).unwrap(),
            end: Utc.with_ymd_and_hms(2025, 5, 31, 23, 59, 59).unwrap(),
        }
    }

    fn raw(date: &str) -> RawIncident {
        RawIncident {
            occurred_at: Some(date.to_string()),
            incident_type: Some("HURTO BICICLETAS".to_string()),
            zone_hint: None,
            latitude: Some("4.6".to_string()),
            longitude: Some("-74.1".to_string()),
            quantity: None,
        }
    }

    #[tokio::test]
    async fn filters_to_window_and_counts_skips() {
        let feed = StaticIncidentFeed::from_raw(
            "TEST",
            vec![
                raw("2025-05-10T10:00:00"),
                raw("2025-04-10T10:00:00"),
                RawIncident {
                    longitude: None,
                    ..raw("2025-05-11T10:00:00")
                },
            ],
        );

        let batch = feed.fetch(&window(), null_progress()).await.unwrap();
        assert_eq!(batch.incidents.len(), 1);
        assert_eq!(batch.incidents[0].source, "TEST");
        assert_eq!(batch.skipped_for(SkipReason::MissingCoordinates), 1);
    }

    #[tokio::test]
    async fn zone_loader_validates_catalog() {
        let orphan = Zone {
            code: "0801".to_string(),
            kind: ZoneKind::SubLevel,
            name: "Orphan".to_string(),
            parent_code: Some("08".to_string()),
            area_km2: 1.0,
            boundary_geojson: None,
            centroid: None,
        };

        let result = StaticZoneLoader(vec![orphan]).load().await;
        assert!(matches!(result, Err(SourceError::Catalog(_))));
    }
}
