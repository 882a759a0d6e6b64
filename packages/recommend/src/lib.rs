#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Rider recommendations.
//!
//! Pure function of a zone's metrics, its risk tier, and the parking
//! index. Reads the hour-of-day histogram the aggregator already built,
//! never raw incidents.

use serde::{Deserialize, Serialize};
use zone_safety_incident_models::Coordinates;
use zone_safety_metrics_models::{ParkingSuggestion, Recommendations, RiskTier, ZoneMetrics};
use zone_safety_spatial::{ParkingIndex, geometry, parse_geojson_to_multipolygon};
use zone_safety_zone_models::Zone;

/// Loaded from the `[recommendations]` config section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecommendationConfig {
    /// Below this many incidents in the histogram, `default_window` is
    /// suggested instead of data-driven windows.
    pub min_hour_samples: u32,
    pub default_window: String,
    pub window_hours: u32,
    pub max_windows: usize,
    /// Earliest window start hour considered.
    pub earliest_start_hour: u32,
    /// Latest window start hour considered.
    pub latest_start_hour: u32,
    /// Hour after which riding guidance turns to night-time cautions.
    pub nightfall_hour: u32,
    pub parking_suggestions: usize,
    /// Lane coverage above which routes favour the segregated network.
    pub segregated_lane_km: f64,
}

impl Default for RecommendationConfig {
    fn default() -> Self {
        Self {
            min_hour_samples: 20,
            default_window: "06:00 - 09:00".to_string(),
            window_hours: 2,
            max_windows: 3,
            earliest_start_hour: 5,
            latest_start_hour: 20,
            nightfall_hour: 18,
            parking_suggestions: 5,
            segregated_lane_km: 5.0,
        }
    }
}

/// Builds the recommendations for one zone.
#[must_use]
pub fn recommend(
    zone: &Zone,
    metrics: &ZoneMetrics,
    tier: RiskTier,
    parking: &ParkingIndex,
    config: &RecommendationConfig,
) -> Recommendations {
    Recommendations {
        best_hours: best_hours(metrics, config),
        safe_routes: safe_routes(metrics, config),
        avoid_areas: avoid_areas(tier, config),
        parking_locations: parking_locations(zone, parking, config),
    }
}

/// Up to `max_windows` non-overlapping windows with the fewest historical
/// incidents, in chronological order.
#[must_use]
pub fn best_hours(metrics: &ZoneMetrics, config: &RecommendationConfig) -> Vec<String> {
    if metrics.hourly.total() < config.min_hour_samples || config.window_hours == 0 {
        return vec![config.default_window.clone()];
    }

    let len = config.window_hours as usize;
    let last_start = config.latest_start_hour.min(23);
    let mut candidates: Vec<(u32, u32)> = (config.earliest_start_hour..=last_start)
        .map(|start| (metrics.hourly.window(start as usize, len), start))
        .collect();
    candidates.sort_unstable();

    let mut chosen: Vec<u32> = Vec::new();
    for (_, start) in candidates {
        if chosen.len() >= config.max_windows {
            break;
        }
        if chosen.iter().all(|c| c.abs_diff(start) >= config.window_hours) {
            chosen.push(start);
        }
    }
    chosen.sort_unstable();

    chosen
        .into_iter()
        .map(|start| {
            let end = (start + config.window_hours) % 24;
            format!("{start:02}:00 - {end:02}:00")
        })
        .collect()
}

#[must_use]
pub fn safe_routes(metrics: &ZoneMetrics, config: &RecommendationConfig) -> Vec<String> {
    if metrics.lane_coverage_km > config.segregated_lane_km {
        vec![
            format!(
                "Use the segregated bike lane network ({:.1} km in this zone)",
                metrics.lane_coverage_km
            ),
            "Main green corridors".to_string(),
            "Roads with cyclist traffic signals".to_string(),
        ]
    } else {
        vec![
            "Streets with low vehicle traffic".to_string(),
            "Routes with good visibility".to_string(),
            "Main roads with a wide shoulder".to_string(),
        ]
    }
}

#[must_use]
pub fn avoid_areas(tier: RiskTier, config: &RecommendationConfig) -> Vec<String> {
    let nightfall = config.nightfall_hour;
    match tier {
        RiskTier::VeryHigh => vec![
            format!("Poorly lit areas after {nightfall:02}:00"),
            "Streets without a dedicated bike lane".to_string(),
            "Industrial areas on weekends".to_string(),
            "Leaving a bicycle parked on the street overnight".to_string(),
        ],
        RiskTier::High => vec![
            format!("Poorly lit areas after {nightfall:02}:00"),
            "Streets without a dedicated bike lane".to_string(),
            "Industrial areas on weekends".to_string(),
        ],
        RiskTier::Medium => vec![format!("Isolated streets after {nightfall:02}:00")],
        RiskTier::Low | RiskTier::VeryLow => Vec::new(),
    }
}

/// The zone's stored centroid, or the centroid of its boundary.
#[must_use]
pub fn zone_origin(zone: &Zone) -> Option<Coordinates> {
    zone.centroid.or_else(|| {
        zone.boundary_geojson
            .as_deref()
            .and_then(parse_geojson_to_multipolygon)
            .and_then(|mp| geometry::centroid(&mp))
    })
}

#[must_use]
pub fn parking_locations(
    zone: &Zone,
    parking: &ParkingIndex,
    config: &RecommendationConfig,
) -> Vec<ParkingSuggestion> {
    let Some(origin) = zone_origin(zone) else {
        log::debug!("Zone {} has no centroid, skipping parking suggestions", zone.code);
        return Vec::new();
    };

    parking
        .nearest(origin, config.parking_suggestions)
        .into_iter()
        .map(|(spot, distance_km)| ParkingSuggestion {
            id: spot.id.clone(),
            name: spot.name.clone(),
            address: spot.address.clone(),
            capacity: spot.capacity,
            distance_km: (distance_km * 1000.0).round() / 1000.0,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use zone_safety_infrastructure_models::{AssetCondition, ParkingSpot};
    use zone_safety_metrics_models::{
        HourHistogram, InfrastructureTotals, RollingCounts, Trend,
    };
    use zone_safety_zone_models::ZoneKind;

    fn metrics(hourly: HourHistogram, lane_km: f64) -> ZoneMetrics {
        ZoneMetrics::new(
            "01",
            NaiveDate::from_ymd_opt(2025, 6, 1).unwrap(),
            1.0,
            RollingCounts::default(),
            InfrastructureTotals {
                lane_coverage_km: lane_km,
                parking_spots: 0,
            },
            hourly,
            Trend::default(),
        )
        .unwrap()
    }

    fn zone(centroid: Option<Coordinates>) -> Zone {
        Zone {
            code: "01".to_string(),
            kind: ZoneKind::TopLevel,
            name: "Usaquén".to_string(),
            parent_code: None,
            area_km2: 1.0,
            boundary_geojson: None,
            centroid,
        }
    }

    #[test]
    fn sparse_history_uses_default_window() {
        let mut hourly = HourHistogram::default();
        for _ in 0..19 {
            hourly.record(8);
        }
        let hours = best_hours(&metrics(hourly, 0.0), &RecommendationConfig::default());
        assert_eq!(hours, vec!["06:00 - 09:00".to_string()]);
    }

    #[test]
    fn picks_quietest_non_overlapping_windows() {
        // Busy everywhere except 10-11, 14-15, and 20-21.
        let mut buckets = [10_u32; 24];
        for quiet in [10, 11, 14, 15, 20, 21] {
            buckets[quiet] = 0;
        }
        let hours = best_hours(
            &metrics(HourHistogram(buckets), 0.0),
            &RecommendationConfig::default(),
        );
        assert_eq!(
            hours,
            vec![
                "10:00 - 12:00".to_string(),
                "14:00 - 16:00".to_string(),
                "20:00 - 22:00".to_string(),
            ]
        );
    }

    #[test]
    fn windows_never_overlap() {
        let mut buckets = [5_u32; 24];
        buckets[12] = 0;
        let hours = best_hours(
            &metrics(HourHistogram(buckets), 0.0),
            &RecommendationConfig::default(),
        );
        assert_eq!(hours.len(), 3);
        let starts: Vec<u32> = hours.iter().map(|h| h[..2].parse().unwrap()).collect();
        for pair in starts.windows(2) {
            assert!(pair[1] - pair[0] >= 2);
        }
    }

    #[test]
    fn avoid_areas_by_tier() {
        let config = RecommendationConfig::default();
        assert!(avoid_areas(RiskTier::VeryLow, &config).is_empty());
        assert!(avoid_areas(RiskTier::Low, &config).is_empty());
        assert_eq!(
            avoid_areas(RiskTier::Medium, &config),
            vec!["Isolated streets after 18:00".to_string()]
        );
        let high = avoid_areas(RiskTier::High, &config);
        assert_eq!(high.len(), 3);
        assert!(high[0].contains("18:00"));
        assert!(avoid_areas(RiskTier::VeryHigh, &config).len() > high.len());

        let late = RecommendationConfig {
            nightfall_hour: 19,
            ..RecommendationConfig::default()
        };
        assert!(avoid_areas(RiskTier::High, &late)[0].contains("19:00"));
    }

    #[test]
    fn safe_routes_depend_on_lane_coverage() {
        let config = RecommendationConfig::default();
        let lanes = safe_routes(&metrics(HourHistogram::default(), 12.0), &config);
        assert!(lanes[0].contains("segregated"));
        let streets = safe_routes(&metrics(HourHistogram::default(), 5.0), &config);
        assert!(streets[0].contains("low vehicle traffic"));
    }

    #[test]
    fn suggests_nearest_parking() {
        let spots = (0..8)
            .map(|i| ParkingSpot {
                id: format!("p{i}"),
                zone_code: None,
                coordinates: Coordinates::new(-74.05 - f64::from(i) * 0.001, 4.65).unwrap(),
                name: format!("Spot {i}"),
                address: None,
                capacity: 12,
                public: true,
                condition: AssetCondition::Good,
            })
            .collect();
        let index = ParkingIndex::new(spots);
        let config = RecommendationConfig::default();

        let origin = Coordinates::new(-74.05, 4.65).unwrap();
        let suggestions = parking_locations(&zone(Some(origin)), &index, &config);
        let ids: Vec<&str> = suggestions.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["p0", "p1", "p2", "p3", "p4"]);

        assert!(parking_locations(&zone(None), &index, &config).is_empty());
    }
}
