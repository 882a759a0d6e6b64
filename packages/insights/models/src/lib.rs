#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Insight result types.
//!
//! Every analysis degrades to a typed result instead of an error when the
//! data is too thin: [`Availability::NotAvailable`] carries how much data
//! was required and how much was present.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// An analysis result, or the reason it could not be produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Availability<T> {
    Available(T),
    NotAvailable {
        /// Data points (zones or dates) the analysis needs.
        required: usize,
        /// Data points that were present.
        available: usize,
    },
}

impl<T> Availability<T> {
    #[must_use]
    pub const fn is_available(&self) -> bool {
        matches!(self, Self::Available(_))
    }

    /// Returns the value if available.
    #[must_use]
    pub fn available(self) -> Option<T> {
        match self {
            Self::Available(value) => Some(value),
            Self::NotAvailable { .. } => None,
        }
    }
}

/// Fixed action vocabulary for anomalous zones.
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
pub enum AnomalyAction {
    /// Theft volume is extreme
    Alert,
    /// Theft density is extreme
    Caution,
    /// Unusual but not extreme
    Monitor,
}

impl AnomalyAction {
    #[must_use]
    pub const fn advice(self) -> &'static str {
        match self {
            Self::Alert => "ALERT: requires additional insurance and restricted hours",
            Self::Caution => "CAUTION: make GPS tracking mandatory",
            Self::Monitor => "MONITOR: review the trend over the coming weeks",
        }
    }
}

/// A zone flagged by anomaly detection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ZoneAnomaly {
    pub zone_code: String,
    pub zone_name: String,
    /// Isolation score in `(0, 1]`; higher is more anomalous.
    pub anomaly_score: f64,
    pub thefts: u32,
    pub incident_density: f64,
    pub lane_coverage_km: f64,
    pub parking_spots: u32,
    pub reason: String,
    pub action: AnomalyAction,
    pub advice: String,
}

/// Anomaly detection output for one calculation date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnomalyReport {
    pub calculation_date: Option<NaiveDate>,
    pub window_days: u32,
    pub zones_analyzed: usize,
    /// Most anomalous first. Empty when too few zones were available.
    pub anomalies: Vec<ZoneAnomaly>,
}

/// One k-means cluster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterSummary {
    pub cluster_id: usize,
    /// Short label such as `"low-risk / high-infrastructure"`.
    pub label: String,
    pub description: String,
    pub strategy: String,
    pub zone_codes: Vec<String>,
    pub mean_safety_score: f64,
    pub mean_thefts_30d: f64,
    pub mean_incident_density: f64,
}

/// Clustering output for one calculation date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterReport {
    pub calculation_date: Option<NaiveDate>,
    pub k: usize,
    /// Elbow-method suggestion for `k`.
    pub suggested_k: usize,
    pub inertia: f64,
    /// Zone code -> cluster id.
    pub assignments: BTreeMap<String, usize>,
    pub clusters: Vec<ClusterSummary>,
}

/// Five-level direction of the projected safety score.
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
pub enum ForecastDirection {
    StronglyImproving,
    Improving,
    Stable,
    Deteriorating,
    StronglyDeteriorating,
}

impl ForecastDirection {
    #[must_use]
    pub const fn is_improving(self) -> bool {
        matches!(self, Self::Improving | Self::StronglyImproving)
    }

    #[must_use]
    pub const fn is_deteriorating(self) -> bool {
        matches!(self, Self::Deteriorating | Self::StronglyDeteriorating)
    }
}

/// How much history backs a forecast.
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
pub enum Confidence {
    Low,
    Medium,
    High,
}

/// Linear projection of a zone's safety score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrendForecast {
    pub zone_code: String,
    pub history_points: usize,
    pub first_date: NaiveDate,
    pub last_date: NaiveDate,
    pub current_score: f64,
    /// Score points per day.
    pub slope_per_day: f64,
    /// Projected score `horizon_days` after the last date, clamped to
    /// `[0, 100]`.
    pub projected_score: f64,
    pub current_thefts_30d: u32,
    /// Projected 30-day theft count, floored at zero.
    pub projected_thefts_30d: f64,
    pub horizon_days: i64,
    pub direction: ForecastDirection,
    pub confidence: Confidence,
    pub recommendation: String,
}

/// Result of one insight section, kept independent of its siblings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "value", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Section<T> {
    Ok(T),
    Failed(String),
}

impl<T, E: std::fmt::Display> From<Result<T, E>> for Section<T> {
    fn from(result: Result<T, E>) -> Self {
        match result {
            Ok(value) => Self::Ok(value),
            Err(e) => Self::Failed(e.to_string()),
        }
    }
}

/// Zones grouped by forecast direction.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForecastOverview {
    pub improving: Vec<String>,
    pub stable: Vec<String>,
    pub deteriorating: Vec<String>,
    /// Zones with too little history.
    pub not_available: Vec<String>,
}

/// Combined strategic summary across all analyses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StrategicInsights {
    pub calculation_date: Option<NaiveDate>,
    pub anomalies: Section<AnomalyReport>,
    pub clusters: Section<Availability<ClusterReport>>,
    pub forecasts: Section<ForecastOverview>,
    /// Human-readable highlights derived from the sections above.
    pub highlights: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn availability_serializes_with_status_tag() {
        let missing: Availability<TrendForecast> = Availability::NotAvailable {
            required: 3,
            available: 1,
        };
        let json = serde_json::to_value(&missing).unwrap();
        assert_eq!(json["status"], "NOT_AVAILABLE");
        assert_eq!(json["required"], 3);
        assert!(!missing.is_available());
    }

    #[test]
    fn section_from_result() {
        let ok: Section<u32> = Ok::<_, std::fmt::Error>(3).into();
        assert_eq!(ok, Section::Ok(3));

        let failed: Section<u32> = Err::<u32, _>(std::fmt::Error).into();
        assert!(matches!(failed, Section::Failed(_)));
    }

    #[test]
    fn action_vocabulary() {
        assert_eq!(AnomalyAction::Alert.as_ref(), "ALERT");
        assert!(AnomalyAction::Caution.advice().starts_with("CAUTION"));
    }
}
