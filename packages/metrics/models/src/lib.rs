#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Data types shared by the aggregator, scoring engine, recommendation
//! generator, and persistence layer.
//!
//! [`ZoneMetrics`] is the aggregator's output and the scoring engine's
//! input. [`ZoneSafetyScore`] is the persisted, per-day result for a zone.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use uuid::Uuid;
use zone_safety_zone_models::{Zone, ZoneKind};

/// Errors from constructing metrics.
#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    /// A measurement was negative.
    #[error("Metric {field} must be non-negative, got {value}")]
    Negative {
        /// Name of the rejected field.
        field: &'static str,
        /// The rejected value.
        value: f64,
    },

    /// A measurement was NaN or infinite.
    #[error("Metric {field} must be finite")]
    NonFinite {
        /// Name of the rejected field.
        field: &'static str,
    },
}

fn check(field: &'static str, value: f64) -> Result<f64, MetricsError> {
    if !value.is_finite() {
        return Err(MetricsError::NonFinite { field });
    }
    if value < 0.0 {
        return Err(MetricsError::Negative { field, value });
    }
    Ok(value)
}

/// Incident counts over the trailing windows ending at the as-of date.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RollingCounts {
    pub last_7d: u32,
    pub last_30d: u32,
    pub last_90d: u32,
}

impl RollingCounts {
    /// Picks the window that best matches a requested number of days:
    /// up to 7 uses the 7-day count, up to 30 the 30-day count, anything
    /// longer the 90-day count.
    #[must_use]
    pub const fn for_window(&self, window_days: u32) -> u32 {
        if window_days <= 7 {
            self.last_7d
        } else if window_days <= 30 {
            self.last_30d
        } else {
            self.last_90d
        }
    }
}

/// Infrastructure totals attributed to a zone.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InfrastructureTotals {
    pub lane_coverage_km: f64,
    pub parking_spots: u32,
}

/// Incident counts bucketed by local hour of day.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HourHistogram(pub [u32; 24]);

impl HourHistogram {
    /// Records one incident at the given hour (`0..24`). Out-of-range
    /// hours are ignored.
    pub fn record(&mut self, hour: u32) {
        if let Some(bucket) = self.0.get_mut(hour as usize) {
            *bucket += 1;
        }
    }

    /// Total number of recorded incidents.
    #[must_use]
    pub fn total(&self) -> u32 {
        self.0.iter().sum()
    }

    /// Sum of `len` consecutive buckets starting at `start`, wrapping past
    /// midnight.
    #[must_use]
    pub fn window(&self, start: usize, len: usize) -> u32 {
        (start..start + len).map(|h| self.0[h % 24]).sum()
    }

    /// Adds another histogram bucket-wise.
    pub fn merge(&mut self, other: &Self) {
        for (a, b) in self.0.iter_mut().zip(other.0.iter()) {
            *a += b;
        }
    }
}

/// Direction of the 30-day incident trend.
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
pub enum TrendDirection {
    /// Incidents fell by at least the threshold
    Improving,
    /// Change within the threshold
    Stable,
    /// Incidents rose by at least the threshold
    Worsening,
}

/// Current 30-day count compared with the preceding 30 days.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Trend {
    pub direction: TrendDirection,
    /// `(current - previous) / max(previous, 1) * 100`
    pub percentage: f64,
    pub current: u32,
    pub previous: u32,
}

impl Default for Trend {
    fn default() -> Self {
        Self {
            direction: TrendDirection::Stable,
            percentage: 0.0,
            current: 0,
            previous: 0,
        }
    }
}

/// Aggregated view of one zone as of one date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ZoneMetrics {
    pub zone_code: String,
    pub as_of: NaiveDate,
    pub area_km2: f64,
    pub counts: RollingCounts,
    /// 30-day count per km².
    pub incident_density: f64,
    pub lane_coverage_km: f64,
    /// Lane km per km².
    pub lane_density: f64,
    pub parking_spots: u32,
    /// Parking spots per km².
    pub parking_density: f64,
    /// Incidents by hour over the 90-day window.
    pub hourly: HourHistogram,
    pub trend: Trend,
}

impl ZoneMetrics {
    /// Builds metrics and derives the densities. A zero area yields zero
    /// densities.
    ///
    /// # Errors
    ///
    /// Returns [`MetricsError`] if the area or lane coverage is negative or
    /// not finite.
    pub fn new(
        zone_code: impl Into<String>,
        as_of: NaiveDate,
        area_km2: f64,
        counts: RollingCounts,
        infrastructure: InfrastructureTotals,
        hourly: HourHistogram,
        trend: Trend,
    ) -> Result<Self, MetricsError> {
        let area_km2 = check("area_km2", area_km2)?;
        let lane_coverage_km = check("lane_coverage_km", infrastructure.lane_coverage_km)?;
        check("trend_percentage", trend.percentage.abs())?;

        let per_area = |value: f64| {
            if area_km2 > 0.0 {
                value / area_km2
            } else {
                0.0
            }
        };

        Ok(Self {
            zone_code: zone_code.into(),
            as_of,
            area_km2,
            counts,
            incident_density: per_area(f64::from(counts.last_30d)),
            lane_coverage_km,
            lane_density: per_area(lane_coverage_km),
            parking_spots: infrastructure.parking_spots,
            parking_density: per_area(f64::from(infrastructure.parking_spots)),
            hourly,
            trend,
        })
    }
}

/// Five-level risk classification derived from the safety score.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskTier {
    VeryLow,
    Low,
    Medium,
    High,
    VeryHigh,
}

impl RiskTier {
    /// `HIGH` or `VERY_HIGH`.
    #[must_use]
    pub const fn is_elevated(self) -> bool {
        matches!(self, Self::High | Self::VeryHigh)
    }

    /// `LOW` or `VERY_LOW`.
    #[must_use]
    pub const fn is_low(self) -> bool {
        matches!(self, Self::Low | Self::VeryLow)
    }

    /// Returns all variants from safest to riskiest.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[
            Self::VeryLow,
            Self::Low,
            Self::Medium,
            Self::High,
            Self::VeryHigh,
        ]
    }
}

/// A nearby parking location suggested to riders.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParkingSuggestion {
    pub id: String,
    pub name: String,
    pub address: Option<String>,
    pub capacity: u32,
    pub distance_km: f64,
}

/// Advice attached to a zone's score.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recommendations {
    pub best_hours: Vec<String>,
    pub safe_routes: Vec<String>,
    pub avoid_areas: Vec<String>,
    pub parking_locations: Vec<ParkingSuggestion>,
}

/// Persisted safety score for one zone on one calculation date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ZoneSafetyScore {
    pub zone_code: String,
    pub zone_name: String,
    pub zone_kind: ZoneKind,
    pub calculation_date: NaiveDate,
    pub safety_score: f64,
    pub risk_tier: RiskTier,
    pub thefts_7d: u32,
    pub thefts_30d: u32,
    pub thefts_90d: u32,
    pub incident_density: f64,
    pub lane_coverage_km: f64,
    pub lane_density: f64,
    pub parking_spots: u32,
    pub parking_density: f64,
    pub trend_direction: TrendDirection,
    pub trend_percentage: f64,
    pub recommendations: Recommendations,
    /// Job that produced this row.
    pub job_id: Option<Uuid>,
}

impl ZoneSafetyScore {
    /// Assembles a score row from a zone, its metrics, and scoring output.
    #[must_use]
    pub fn assemble(
        zone: &Zone,
        metrics: &ZoneMetrics,
        safety_score: f64,
        risk_tier: RiskTier,
        recommendations: Recommendations,
        job_id: Option<Uuid>,
    ) -> Self {
        Self {
            zone_code: zone.code.clone(),
            zone_name: zone.name.clone(),
            zone_kind: zone.kind,
            calculation_date: metrics.as_of,
            safety_score,
            risk_tier,
            thefts_7d: metrics.counts.last_7d,
            thefts_30d: metrics.counts.last_30d,
            thefts_90d: metrics.counts.last_90d,
            incident_density: metrics.incident_density,
            lane_coverage_km: metrics.lane_coverage_km,
            lane_density: metrics.lane_density,
            parking_spots: metrics.parking_spots,
            parking_density: metrics.parking_density,
            trend_direction: metrics.trend.direction,
            trend_percentage: metrics.trend.percentage,
            recommendations,
            job_id,
        }
    }

    /// Rolling count matching a requested window, see
    /// [`RollingCounts::for_window`].
    #[must_use]
    pub const fn thefts_for_window(&self, window_days: u32) -> u32 {
        RollingCounts {
            last_7d: self.thefts_7d,
            last_30d: self.thefts_30d,
            last_90d: self.thefts_90d,
        }
        .for_window(window_days)
    }
}
