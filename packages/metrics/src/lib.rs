#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Metrics aggregation.
//!
//! Turns raw incidents and infrastructure into [`ZoneMetrics`] in two
//! steps. [`attribute`] assigns every record to a zone once per run;
//! [`aggregate_zone`] then rolls up one zone (and optionally its
//! descendants) for a fixed as-of date. Both are pure: nothing here reads
//! the clock.

pub mod attribution;
pub mod trend;

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use zone_safety_incident_models::IncidentCategory;
use zone_safety_metrics_models::{
    HourHistogram, InfrastructureTotals, MetricsError, RollingCounts, ZoneMetrics,
};
use zone_safety_zone_models::ZoneCatalog;

pub use attribution::{AttributedData, IncidentStamp, attribute};
pub use trend::compute_trend;

/// Longest window any metric looks back over.
pub const LOOKBACK_DAYS: i64 = 90;

/// Errors from aggregating a zone.
#[derive(Debug, thiserror::Error)]
pub enum AggregateError {
    #[error("Unknown zone: {0}")]
    UnknownZone(String),

    #[error(transparent)]
    Metrics(#[from] MetricsError),
}

/// Tunables for the aggregator. Loaded from the `[aggregation]` config
/// section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct AggregationConfig {
    /// Categories that count as thefts.
    pub theft_categories: Vec<IncidentCategory>,
    /// Minimum absolute percentage change that counts as a trend.
    pub trend_threshold_pct: f64,
    /// Roll sub-zone incidents and assets up into their ancestors.
    pub include_descendants: bool,
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            theft_categories: vec![IncidentCategory::Theft, IncidentCategory::Robbery],
            trend_threshold_pct: 10.0,
            include_descendants: true,
        }
    }
}

/// Inclusive date range `[as_of - days, as_of]`.
fn within(date: NaiveDate, as_of: NaiveDate, days: i64) -> bool {
    date <= as_of && date >= as_of - Duration::days(days)
}

/// Computes metrics for one zone as of a date.
///
/// # Errors
///
/// Returns [`AggregateError::UnknownZone`] if the code is not in the
/// catalog, or [`AggregateError::Metrics`] if the zone's area or lane
/// coverage is invalid.
pub fn aggregate_zone(
    catalog: &ZoneCatalog,
    data: &AttributedData,
    zone_code: &str,
    as_of: NaiveDate,
    config: &AggregationConfig,
) -> Result<ZoneMetrics, AggregateError> {
    let zone = catalog
        .get(zone_code)
        .ok_or_else(|| AggregateError::UnknownZone(zone_code.to_string()))?;

    let codes = if config.include_descendants {
        catalog.subtree(zone_code)
    } else {
        vec![zone_code]
    };

    let mut counts = RollingCounts::default();
    let mut previous_30d = 0_u32;
    let mut hourly = HourHistogram::default();
    let mut lane_coverage_km = 0.0;
    let mut parking_spots = 0_u32;

    for code in &codes {
        for stamp in data.incidents_for(code) {
            if !within(stamp.date, as_of, LOOKBACK_DAYS) {
                continue;
            }
            counts.last_90d += 1;
            hourly.record(stamp.hour);
            if within(stamp.date, as_of, 30) {
                counts.last_30d += 1;
            }
            if within(stamp.date, as_of, 7) {
                counts.last_7d += 1;
            }
            if within(stamp.date, as_of - Duration::days(30), 30) {
                previous_30d += 1;
            }
        }
        lane_coverage_km += data.lane_km_for(code);
        parking_spots += data.parking_for(code);
    }

    let trend = compute_trend(counts.last_30d, previous_30d, config.trend_threshold_pct);

    log::debug!(
        "Zone {zone_code}: 7d={} 30d={} 90d={} lanes={lane_coverage_km:.2}km parking={parking_spots}",
        counts.last_7d,
        counts.last_30d,
        counts.last_90d,
    );

    Ok(ZoneMetrics::new(
        zone_code,
        as_of,
        zone.area_km2,
        counts,
        InfrastructureTotals {
            lane_coverage_km,
            parking_spots,
        },
        hourly,
        trend,
    )?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone as _, Utc};
    use zone_safety_incident_models::{Coordinates, Incident, IncidentSubcategory};
    use zone_safety_infrastructure_models::{
        AssetCondition, InfrastructureAsset, LaneSegment, ParkingSpot,
    };
    use zone_safety_metrics_models::TrendDirection;
    use zone_safety_spatial::ZoneIndex;
    use zone_safety_zone_models::{Zone, ZoneKind};

    fn zone(code: &str, parent: Option<&str>, area: f64) -> Zone {
        Zone {
            code: code.to_string(),
            kind: if parent.is_some() {
                ZoneKind::SubLevel
            } else {
                ZoneKind::TopLevel
            },
            name: code.to_string(),
            parent_code: parent.map(str::to_string),
            area_km2: area,
            boundary_geojson: None,
            centroid: None,
        }
    }

    fn catalog() -> ZoneCatalog {
        ZoneCatalog::new(vec![
            zone("01", None, 10.0),
            zone("01-A", Some("01"), 2.0),
            zone("02", None, 0.0),
        ])
        .unwrap()
    }

    fn as_of() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, 30).unwrap()
    }

    fn incident(zone: &str, days_ago: i64, hour: u32, sub: IncidentSubcategory) -> Incident {
        let date = as_of() - Duration::days(days_ago);
        Incident {
            occurred_at: Utc.from_utc_datetime(&date.and_hms_opt(hour, 0, 0).unwrap()),
            subcategory: sub,
            zone_hint: Some(zone.to_string()),
            coordinates: Coordinates::new(
                -74.0 - 0.0001 * f64::from(i32::try_from(days_ago).unwrap()),
                4.6,
            )
            .unwrap(),
            source: "test".to_string(),
        }
    }

    fn theft(zone: &str, days_ago: i64, hour: u32) -> Incident {
        incident(zone, days_ago, hour, IncidentSubcategory::BicycleTheft)
    }

    fn lane(zone: &str, km: f64) -> InfrastructureAsset {
        InfrastructureAsset::LaneSegment(LaneSegment {
            id: format!("lane-{zone}-{km}"),
            zone_code: Some(zone.to_string()),
            length_km: km,
            geometry_geojson: None,
            anchor: None,
            condition: AssetCondition::Unknown,
        })
    }

    fn parking(zone: &str, id: &str) -> InfrastructureAsset {
        InfrastructureAsset::ParkingSpot(ParkingSpot {
            id: id.to_string(),
            zone_code: Some(zone.to_string()),
            coordinates: Coordinates::new(-74.05, 4.65).unwrap(),
            name: id.to_string(),
            address: None,
            capacity: 10,
            public: true,
            condition: AssetCondition::Good,
        })
    }

    fn run(incidents: &[Incident], assets: &[InfrastructureAsset], code: &str) -> ZoneMetrics {
        let catalog = catalog();
        let index = ZoneIndex::from_catalog(&catalog);
        let config = AggregationConfig::default();
        let data = attribute(&index, &catalog, incidents, assets, &config);
        aggregate_zone(&catalog, &data, code, as_of(), &config).unwrap()
    }

    #[test]
    fn rolling_windows_are_inclusive() {
        let incidents = vec![
            theft("02", 0, 8),
            theft("02", 7, 8),
            theft("02", 8, 8),
            theft("02", 30, 8),
            theft("02", 31, 8),
            theft("02", 90, 8),
            theft("02", 91, 8),
        ];
        let m = run(&incidents, &[], "02");
        assert_eq!(m.counts.last_7d, 2);
        assert_eq!(m.counts.last_30d, 4);
        assert_eq!(m.counts.last_90d, 6);
    }

    #[test]
    fn future_incidents_are_ignored() {
        let m = run(&[theft("02", -1, 8)], &[], "02");
        assert_eq!(m.counts.last_90d, 0);
    }

    #[test]
    fn non_theft_categories_are_excluded() {
        let incidents = vec![
            theft("02", 1, 8),
            incident("02", 1, 9, IncidentSubcategory::ArmedRobbery),
            incident("02", 1, 10, IncidentSubcategory::PropertyDamage),
            incident("02", 1, 11, IncidentSubcategory::PersonalInjury),
        ];
        let m = run(&incidents, &[], "02");
        assert_eq!(m.counts.last_30d, 2);
    }

    #[test]
    fn parent_includes_descendants() {
        let incidents = vec![theft("01", 1, 8), theft("01-A", 2, 9), theft("01-A", 3, 9)];
        let assets = vec![lane("01", 1.0), lane("01-A", 3.0), parking("01-A", "p1")];

        let parent = run(&incidents, &assets, "01");
        assert_eq!(parent.counts.last_30d, 3);
        assert!((parent.lane_coverage_km - 4.0).abs() < f64::EPSILON);
        assert_eq!(parent.parking_spots, 1);
        assert!((parent.incident_density - 0.3).abs() < 1e-9);

        let child = run(&incidents, &assets, "01-A");
        assert_eq!(child.counts.last_30d, 2);
        assert!((child.lane_density - 1.5).abs() < f64::EPSILON);
        assert!((child.parking_density - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn zero_area_zone_has_zero_density() {
        let m = run(&[theft("02", 1, 8)], &[lane("02", 2.0)], "02");
        assert_eq!(m.counts.last_30d, 1);
        assert!(m.incident_density.abs() < f64::EPSILON);
        assert!(m.lane_density.abs() < f64::EPSILON);
    }

    #[test]
    fn trend_compares_consecutive_30_day_windows() {
        let mut incidents = Vec::new();
        for i in 0..4 {
            incidents.push(theft("02", 35 + i, 8));
        }
        incidents.push(theft("02", 2, 8));

        let m = run(&incidents, &[], "02");
        assert_eq!(m.trend.current, 1);
        assert_eq!(m.trend.previous, 4);
        assert_eq!(m.trend.direction, TrendDirection::Improving);
    }

    #[test]
    fn hourly_histogram_covers_90_days() {
        let incidents = vec![theft("02", 1, 7), theft("02", 60, 7), theft("02", 80, 22)];
        let m = run(&incidents, &[], "02");
        assert_eq!(m.hourly.0[7], 2);
        assert_eq!(m.hourly.0[22], 1);
        assert_eq!(m.hourly.total(), 3);
    }

    #[test]
    fn deterministic_for_same_inputs() {
        let incidents = vec![theft("01-A", 1, 8), theft("01", 12, 18)];
        let assets = vec![lane("01", 2.5)];
        assert_eq!(run(&incidents, &assets, "01"), run(&incidents, &assets, "01"));
    }

    #[test]
    fn unknown_zone_is_an_error() {
        let catalog = catalog();
        let index = ZoneIndex::from_catalog(&catalog);
        let config = AggregationConfig::default();
        let data = attribute(&index, &catalog, &[], &[], &config);
        let err = aggregate_zone(&catalog, &data, "99", as_of(), &config).unwrap_err();
        assert!(matches!(err, AggregateError::UnknownZone(_)));
    }
}
