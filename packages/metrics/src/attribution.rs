//! Assigns incidents and infrastructure assets to zones.

use std::collections::BTreeMap;

use chrono::{NaiveDate, Timelike as _};
use zone_safety_incident_models::Incident;
use zone_safety_infrastructure_models::InfrastructureAsset;
use zone_safety_spatial::ZoneIndex;
use zone_safety_zone_models::ZoneCatalog;

use crate::AggregationConfig;

/// The parts of an incident the aggregator needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IncidentStamp {
    pub date: NaiveDate,
    /// Hour of day as reported by the source (feeds publish local time).
    pub hour: u32,
}

/// Records bucketed by the zone they were attributed to.
#[derive(Debug, Clone, Default)]
pub struct AttributedData {
    incidents: BTreeMap<String, Vec<IncidentStamp>>,
    lane_km: BTreeMap<String, f64>,
    parking: BTreeMap<String, u32>,
    /// Incidents that matched no polygon and no known zone hint.
    pub unattributed_incidents: usize,
    /// Assets that matched no polygon and no known zone code.
    pub unattributed_assets: usize,
    /// Incidents outside the configured theft categories.
    pub excluded_incidents: usize,
}

impl AttributedData {
    /// Incidents attributed directly to a zone (not its descendants).
    #[must_use]
    pub fn incidents_for(&self, code: &str) -> &[IncidentStamp] {
        self.incidents.get(code).map_or(&[], Vec::as_slice)
    }

    /// Lane kilometres attributed directly to a zone.
    #[must_use]
    pub fn lane_km_for(&self, code: &str) -> f64 {
        self.lane_km.get(code).copied().unwrap_or(0.0)
    }

    /// Parking spots attributed directly to a zone.
    #[must_use]
    pub fn parking_for(&self, code: &str) -> u32 {
        self.parking.get(code).copied().unwrap_or(0)
    }

    /// Total attributed incidents.
    #[must_use]
    pub fn incident_count(&self) -> usize {
        self.incidents.values().map(Vec::len).sum()
    }
}

/// Attributes every incident and asset to a zone.
///
/// Incidents use polygon containment first and fall back to the source's
/// zone hint. Assets keep a zone code they already carry when the catalog
/// knows it; otherwise they go through the same lookup.
#[must_use]
pub fn attribute(
    index: &ZoneIndex,
    catalog: &ZoneCatalog,
    incidents: &[Incident],
    assets: &[InfrastructureAsset],
    config: &AggregationConfig,
) -> AttributedData {
    let mut data = AttributedData::default();

    for incident in incidents {
        if !config.theft_categories.contains(&incident.category()) {
            data.excluded_incidents += 1;
            continue;
        }

        let Some(code) = index.attribute(Some(incident.coordinates), incident.zone_hint.as_deref())
        else {
            data.unattributed_incidents += 1;
            continue;
        };

        data.incidents
            .entry(code.to_string())
            .or_default()
            .push(IncidentStamp {
                date: incident.occurred_at.date_naive(),
                hour: incident.occurred_at.hour(),
            });
    }

    for asset in assets {
        let code = match asset.zone_code() {
            Some(code) if catalog.contains(code) => Some(code),
            hint => index.attribute(asset.location(), hint),
        };

        let Some(code) = code else {
            data.unattributed_assets += 1;
            continue;
        };

        match asset {
            InfrastructureAsset::LaneSegment(lane) => {
                *data.lane_km.entry(code.to_string()).or_default() += lane.length_km;
            }
            InfrastructureAsset::ParkingSpot(_) => {
                *data.parking.entry(code.to_string()).or_default() += 1;
            }
        }
    }

    if data.unattributed_incidents > 0 || data.unattributed_assets > 0 {
        log::warn!(
            "{} incidents and {} assets could not be attributed to any zone",
            data.unattributed_incidents,
            data.unattributed_assets
        );
    }

    data
}
