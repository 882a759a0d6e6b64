#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Unsupervised analyses over persisted zone safety scores.
//!
//! All analyses are read-only and deterministic for a given seed. Each one
//! degrades to an empty or [`Availability::NotAvailable`] result when the
//! data is too thin rather than failing:
//!
//! * [`detect_anomalies`]: isolation forest over one day's snapshot.
//! * [`cluster_zones`]: k-means segmentation of one day's snapshot.
//! * [`forecast`]: per-zone least-squares trend of the safety score.

pub mod anomalies;
pub mod clusters;
pub mod features;
pub mod forecast;
pub mod isolation_forest;
pub mod kmeans;

use serde::{Deserialize, Serialize};
use zone_safety_insights_models::{
    AnomalyReport, Availability, ClusterReport, ForecastOverview, Section,
};
use zone_safety_metrics_models::ZoneSafetyScore;

pub use anomalies::{AnomalyConfig, detect_anomalies};
pub use clusters::{ClusterCount, ClusteringConfig, cluster_zones};
pub use forecast::{ForecastConfig, forecast};

/// The `[insights]` config section.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InsightsConfig {
    pub anomaly: AnomalyConfig,
    pub clustering: ClusteringConfig,
    pub forecast: ForecastConfig,
}

/// Forecasts every zone in `zone_codes` and groups them by direction.
#[must_use]
pub fn forecast_overview(
    zone_codes: &[String],
    history: &[ZoneSafetyScore],
    config: &ForecastConfig,
) -> ForecastOverview {
    let mut overview = ForecastOverview::default();

    for code in zone_codes {
        match forecast(code, history, config) {
            Availability::Available(f) if f.direction.is_improving() => {
                overview.improving.push(code.clone());
            }
            Availability::Available(f) if f.direction.is_deteriorating() => {
                overview.deteriorating.push(code.clone());
            }
            Availability::Available(_) => overview.stable.push(code.clone()),
            Availability::NotAvailable { .. } => overview.not_available.push(code.clone()),
        }
    }

    overview
}

/// Short human-readable findings drawn from the individual sections.
///
/// Failed or unavailable sections contribute nothing.
#[must_use]
pub fn highlights(
    anomalies: &Section<AnomalyReport>,
    clusters: &Section<Availability<ClusterReport>>,
    forecasts: &Section<ForecastOverview>,
    config: &InsightsConfig,
) -> Vec<String> {
    let mut out = Vec::new();

    if let Section::Ok(report) = anomalies
        && !report.anomalies.is_empty()
    {
        out.push(format!(
            "{} zones show anomalous behavior and need immediate attention",
            report.anomalies.len()
        ));
    }

    if let Section::Ok(Availability::Available(report)) = clusters {
        let priority = report
            .clusters
            .iter()
            .filter(|c| c.mean_safety_score > config.clustering.safe_score)
            .count();
        if priority > 0 {
            out.push(format!(
                "{priority} zone groups identified as optimal for expansion"
            ));
        }
    }

    if let Section::Ok(overview) = forecasts {
        if !overview.improving.is_empty() {
            out.push(format!(
                "{} zones are improving: investment opportunity",
                overview.improving.len()
            ));
        }
        if !overview.deteriorating.is_empty() {
            out.push(format!(
                "{} zones show a negative trend: review security strategy",
                overview.deteriorating.len()
            ));
        }
    }

    out
}

#[cfg(test)]
pub(crate) mod test_support {
    use chrono::{Duration, NaiveDate};
    use zone_safety_metrics_models::{Recommendations, RiskTier, TrendDirection, ZoneSafetyScore};
    use zone_safety_zone_models::ZoneKind;

    pub fn base_date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, 1).unwrap()
    }

    /// Score row for `code` on `base_date() + day_offset`.
    pub fn score_row(
        code: &str,
        day_offset: i64,
        safety_score: f64,
        thefts_30d: u32,
        incident_density: f64,
        lane_density: f64,
        parking_density: f64,
    ) -> ZoneSafetyScore {
        ZoneSafetyScore {
            zone_code: code.to_string(),
            zone_name: format!("Zone {code}"),
            zone_kind: ZoneKind::TopLevel,
            calculation_date: base_date() + Duration::days(day_offset),
            safety_score,
            risk_tier: RiskTier::Medium,
            thefts_7d: thefts_30d / 4,
            thefts_30d,
            thefts_90d: thefts_30d * 3,
            incident_density,
            lane_coverage_km: lane_density * 2.0,
            lane_density,
            parking_spots: 0,
            parking_density,
            trend_direction: TrendDirection::Stable,
            trend_percentage: 0.0,
            recommendations: Recommendations::default(),
            job_id: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_support::score_row;
    use zone_safety_insights_models::{AnomalyAction, ZoneAnomaly};

    #[test]
    fn overview_groups_by_direction() {
        let mut history = Vec::new();
        for day in 0..5_i32 {
            let d = f64::from(day);
            history.push(score_row("UP", i64::from(day), 40.0 + d * 2.0, 10, 1.0, 0.0, 0.0));
            history.push(score_row("DOWN", i64::from(day), 60.0 - d * 2.0, 10, 1.0, 0.0, 0.0));
            history.push(score_row("FLAT", i64::from(day), 50.0, 10, 1.0, 0.0, 0.0));
        }
        history.push(score_row("NEW", 4, 50.0, 10, 1.0, 0.0, 0.0));

        let codes: Vec<String> = ["UP", "DOWN", "FLAT", "NEW"]
            .iter()
            .map(ToString::to_string)
            .collect();
        let overview = forecast_overview(&codes, &history, &ForecastConfig::default());

        assert_eq!(overview.improving, vec!["UP"]);
        assert_eq!(overview.deteriorating, vec!["DOWN"]);
        assert_eq!(overview.stable, vec!["FLAT"]);
        assert_eq!(overview.not_available, vec!["NEW"]);
    }

    #[test]
    fn highlights_skip_failed_sections() {
        let anomalies = Section::Ok(AnomalyReport {
            calculation_date: None,
            window_days: 30,
            zones_analyzed: 12,
            anomalies: vec![ZoneAnomaly {
                zone_code: "HOT".to_string(),
                zone_name: "Hot".to_string(),
                anomaly_score: 0.8,
                thefts: 200,
                incident_density: 40.0,
                lane_coverage_km: 0.0,
                parking_spots: 0,
                reason: "Unusual pattern detected".to_string(),
                action: AnomalyAction::Alert,
                advice: AnomalyAction::Alert.advice().to_string(),
            }],
        });
        let clusters = Section::Failed("store unavailable".to_string());
        let forecasts = Section::Ok(ForecastOverview {
            deteriorating: vec!["DOWN".to_string()],
            ..ForecastOverview::default()
        });

        let out = highlights(&anomalies, &clusters, &forecasts, &InsightsConfig::default());
        assert_eq!(out.len(), 2);
        assert!(out[0].starts_with("1 zones"));
        assert!(out[1].contains("negative trend"));
    }

    #[test]
    fn config_sections_default_independently() {
        let config: InsightsConfig = toml::from_str(
            r#"
            [clustering]
            k = "auto"

            [anomaly]
            min_zones = 5
            "#,
        )
        .unwrap();

        assert_eq!(config.clustering.k, ClusterCount::Auto);
        assert_eq!(config.clustering.restarts, 10);
        assert_eq!(config.anomaly.min_zones, 5);
        assert!((config.anomaly.contamination - 0.1).abs() < f64::EPSILON);
        assert_eq!(config.forecast, ForecastConfig::default());
    }
}
