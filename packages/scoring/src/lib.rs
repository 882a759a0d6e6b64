#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Safety scoring.
//!
//! A zone starts at 100 and loses points for recent thefts and theft
//! density, then gains points for parking and lane density. Every
//! multiplier and cap lives in [`ScoringConfig`]:
//!
//! ```text
//! score = 100
//!       - min(thefts_30d * theft_weight, theft_cap)
//!       - min(density * density_weight, density_cap)
//!       + min(parking_density * parking_weight, parking_cap)
//!       + min(lane_density * lane_weight, lane_cap)
//! ```
//!
//! The result is clamped to `[0, 100]` and rounded to two decimals, then
//! mapped onto a five-level [`RiskTier`] by [`TierBounds`].

use serde::{Deserialize, Serialize};
use zone_safety_metrics_models::{RiskTier, ZoneMetrics};

/// Upper (exclusive) score bounds of each tier except `VERY_LOW`, which
/// takes everything from `low_below` up to 100.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TierBounds {
    pub very_high_below: f64,
    pub high_below: f64,
    pub medium_below: f64,
    pub low_below: f64,
}

impl Default for TierBounds {
    /// Even quintiles.
    fn default() -> Self {
        Self {
            very_high_below: 20.0,
            high_below: 40.0,
            medium_below: 60.0,
            low_below: 80.0,
        }
    }
}

/// Scoring constants. Loaded from the `[scoring]` config section.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub base_score: f64,
    /// Points lost per theft in the last 30 days.
    pub theft_weight: f64,
    pub theft_cap: f64,
    /// Points lost per theft/km².
    pub density_weight: f64,
    pub density_cap: f64,
    /// Points gained per parking spot/km².
    pub parking_weight: f64,
    pub parking_cap: f64,
    /// Points gained per lane km/km².
    pub lane_weight: f64,
    pub lane_cap: f64,
    pub tiers: TierBounds,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            base_score: 100.0,
            theft_weight: 2.0,
            theft_cap: 50.0,
            density_weight: 5.0,
            density_cap: 20.0,
            parking_weight: 3.0,
            parking_cap: 15.0,
            lane_weight: 3.0,
            lane_cap: 15.0,
            tiers: TierBounds::default(),
        }
    }
}

/// Output of [`score`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Assessment {
    pub score: f64,
    pub tier: RiskTier,
}

/// Scores a zone.
#[must_use]
pub fn score(metrics: &ZoneMetrics, config: &ScoringConfig) -> Assessment {
    let theft_penalty = (f64::from(metrics.counts.last_30d) * config.theft_weight).min(config.theft_cap);
    let density_penalty = (metrics.incident_density * config.density_weight).min(config.density_cap);
    let parking_bonus = (metrics.parking_density * config.parking_weight).min(config.parking_cap);
    let lane_bonus = (metrics.lane_density * config.lane_weight).min(config.lane_cap);

    let raw = config.base_score - theft_penalty - density_penalty + parking_bonus + lane_bonus;
    let score = round2(raw.clamp(0.0, 100.0));

    Assessment {
        score,
        tier: classify(score, &config.tiers),
    }
}

/// Maps a score onto a risk tier.
#[must_use]
pub fn classify(score: f64, bounds: &TierBounds) -> RiskTier {
    if score < bounds.very_high_below {
        RiskTier::VeryHigh
    } else if score < bounds.high_below {
        RiskTier::High
    } else if score < bounds.medium_below {
        RiskTier::Medium
    } else if score < bounds.low_below {
        RiskTier::Low
    } else {
        RiskTier::VeryLow
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use zone_safety_metrics_models::{
        HourHistogram, InfrastructureTotals, RollingCounts, Trend,
    };

    fn metrics(thefts_30d: u32, density: f64, parking_density: f64, lane_density: f64) -> ZoneMetrics {
        let mut m = ZoneMetrics::new(
            "01",
            NaiveDate::from_ymd_opt(2025, 6, 1).unwrap(),
            10.0,
            RollingCounts {
                last_7d: 0,
                last_30d: thefts_30d,
                last_90d: thefts_30d,
            },
            InfrastructureTotals::default(),
            HourHistogram::default(),
            Trend::default(),
        )
        .unwrap();
        m.incident_density = density;
        m.parking_density = parking_density;
        m.lane_density = lane_density;
        m
    }

    #[test]
    fn concrete_scenario_scores_54_medium() {
        let a = score(&metrics(20, 3.0, 2.0, 1.0), &ScoringConfig::default());
        assert!((a.score - 54.0).abs() < f64::EPSILON);
        assert_eq!(a.tier, RiskTier::Medium);
    }

    #[test]
    fn clamped_to_range() {
        let worst = score(&metrics(1_000, 1_000.0, 0.0, 0.0), &ScoringConfig::default());
        assert!((worst.score - 30.0).abs() < f64::EPSILON);

        let best = score(&metrics(0, 0.0, 100.0, 100.0), &ScoringConfig::default());
        assert!((best.score - 100.0).abs() < f64::EPSILON);
        assert_eq!(best.tier, RiskTier::VeryLow);

        let harsh = ScoringConfig {
            theft_cap: 200.0,
            ..ScoringConfig::default()
        };
        let floor = score(&metrics(1_000, 0.0, 0.0, 0.0), &harsh);
        assert!(floor.score.abs() < f64::EPSILON);
        assert_eq!(floor.tier, RiskTier::VeryHigh);
    }

    #[test]
    fn deterministic() {
        let m = metrics(7, 1.3, 0.4, 2.2);
        let config = ScoringConfig::default();
        assert_eq!(score(&m, &config), score(&m, &config));
    }

    #[test]
    fn monotonic_in_thefts_and_infrastructure() {
        let config = ScoringConfig::default();
        let mut previous = f64::INFINITY;
        for thefts in 0..40 {
            let s = score(&metrics(thefts, 1.0, 1.0, 1.0), &config).score;
            assert!(s <= previous);
            previous = s;
        }

        let mut previous = f64::NEG_INFINITY;
        for step in 0..40 {
            let density = f64::from(step) * 0.25;
            let parking = score(&metrics(10, 1.0, density, 0.0), &config).score;
            let lanes = score(&metrics(10, 1.0, 0.0, density), &config).score;
            assert!(parking >= previous);
            assert!((parking - lanes).abs() < f64::EPSILON);
            previous = parking;
        }
    }

    #[test]
    fn tier_edges() {
        let bounds = TierBounds::default();
        assert_eq!(classify(0.0, &bounds), RiskTier::VeryHigh);
        assert_eq!(classify(19.99, &bounds), RiskTier::VeryHigh);
        assert_eq!(classify(20.0, &bounds), RiskTier::High);
        assert_eq!(classify(39.0, &bounds), RiskTier::High);
        assert_eq!(classify(39.99, &bounds), RiskTier::High);
        assert_eq!(classify(40.0, &bounds), RiskTier::Medium);
        assert_eq!(classify(59.0, &bounds), RiskTier::Medium);
        assert_eq!(classify(60.0, &bounds), RiskTier::Low);
        assert_eq!(classify(79.99, &bounds), RiskTier::Low);
        assert_eq!(classify(80.0, &bounds), RiskTier::VeryLow);
        assert_eq!(classify(100.0, &bounds), RiskTier::VeryLow);
    }

    #[test]
    fn rounds_to_two_decimals() {
        let a = score(&metrics(0, 0.333_333, 0.0, 0.0), &ScoringConfig::default());
        assert!((a.score - 98.33).abs() < 1e-9);
    }
}
