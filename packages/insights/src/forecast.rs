//! Per-zone linear trend forecasting.

use serde::{Deserialize, Serialize};
use zone_safety_insights_models::{Availability, Confidence, ForecastDirection, TrendForecast};
use zone_safety_metrics_models::ZoneSafetyScore;

/// Loaded from the `[insights.forecast]` config section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForecastConfig {
    /// Fewer calculation dates than this yields `NOT_AVAILABLE`.
    pub min_history: usize,
    /// Only the most recent dates are used.
    pub max_history: usize,
    pub horizon_days: i64,
    /// Slope (score points/day) beyond which the trend is not stable.
    pub mild_slope: f64,
    /// Slope beyond which the trend is strong.
    pub strong_slope: f64,
    pub high_confidence_points: usize,
    pub medium_confidence_points: usize,
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            min_history: 3,
            max_history: 30,
            horizon_days: 30,
            mild_slope: 0.1,
            strong_slope: 0.5,
            high_confidence_points: 12,
            medium_confidence_points: 6,
        }
    }
}

/// Ordinary least squares fit `y = slope * x + intercept`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearFit {
    pub slope: f64,
    pub intercept: f64,
}

impl LinearFit {
    #[must_use]
    pub fn at(&self, x: f64) -> f64 {
        self.slope.mul_add(x, self.intercept)
    }
}

/// Fits a line through `(x, y)` points. A degenerate `x` spread yields a
/// flat line through the mean.
#[must_use]
pub fn least_squares(points: &[(f64, f64)]) -> LinearFit {
    if points.is_empty() {
        return LinearFit {
            slope: 0.0,
            intercept: 0.0,
        };
    }

    #[allow(clippy::cast_precision_loss)]
    let n = points.len() as f64;
    let x_mean = points.iter().map(|p| p.0).sum::<f64>() / n;
    let y_mean = points.iter().map(|p| p.1).sum::<f64>() / n;

    let numerator: f64 = points.iter().map(|(x, y)| (x - x_mean) * (y - y_mean)).sum();
    let denominator: f64 = points.iter().map(|(x, _)| (x - x_mean).powi(2)).sum();

    let slope = if denominator == 0.0 {
        0.0
    } else {
        numerator / denominator
    };

    LinearFit {
        slope,
        intercept: slope.mul_add(-x_mean, y_mean),
    }
}

/// Forecasts a zone's safety score from its history.
///
/// `history` may be in any order and may contain other zones' rows; only
/// `zone_code`'s rows are used.
#[must_use]
pub fn forecast(
    zone_code: &str,
    history: &[ZoneSafetyScore],
    config: &ForecastConfig,
) -> Availability<TrendForecast> {
    let mut rows: Vec<&ZoneSafetyScore> = history.iter().filter(|s| s.zone_code == zone_code).collect();
    rows.sort_by_key(|s| s.calculation_date);
    rows.dedup_by_key(|s| s.calculation_date);

    if rows.len() > config.max_history {
        rows.drain(..rows.len() - config.max_history);
    }

    let required = config.min_history.max(2);
    let (Some(first), Some(last)) = (rows.first().copied(), rows.last().copied()) else {
        return Availability::NotAvailable {
            required,
            available: 0,
        };
    };
    if rows.len() < required {
        return Availability::NotAvailable {
            required,
            available: rows.len(),
        };
    }

    #[allow(clippy::cast_precision_loss)]
    let day = |s: &ZoneSafetyScore| (s.calculation_date - first.calculation_date).num_days() as f64;

    let score_fit = least_squares(
        &rows
            .iter()
            .map(|&s| (day(s), s.safety_score))
            .collect::<Vec<_>>(),
    );
    let theft_fit = least_squares(
        &rows
            .iter()
            .map(|&s| (day(s), f64::from(s.thefts_30d)))
            .collect::<Vec<_>>(),
    );

    #[allow(clippy::cast_precision_loss)]
    let target = day(last) + config.horizon_days as f64;

    let direction = classify_slope(score_fit.slope, config);
    let confidence = if rows.len() >= config.high_confidence_points {
        Confidence::High
    } else if rows.len() >= config.medium_confidence_points {
        Confidence::Medium
    } else {
        Confidence::Low
    };

    Availability::Available(TrendForecast {
        zone_code: zone_code.to_string(),
        history_points: rows.len(),
        first_date: first.calculation_date,
        last_date: last.calculation_date,
        current_score: last.safety_score,
        slope_per_day: round4(score_fit.slope),
        projected_score: round2(score_fit.at(target).clamp(0.0, 100.0)),
        current_thefts_30d: last.thefts_30d,
        projected_thefts_30d: round2(theft_fit.at(target).max(0.0)),
        horizon_days: config.horizon_days,
        direction,
        confidence,
        recommendation: recommendation(direction).to_string(),
    })
}

/// Rising scores mean a safer zone.
#[must_use]
pub fn classify_slope(slope: f64, config: &ForecastConfig) -> ForecastDirection {
    if slope > config.strong_slope {
        ForecastDirection::StronglyImproving
    } else if slope > config.mild_slope {
        ForecastDirection::Improving
    } else if slope < -config.strong_slope {
        ForecastDirection::StronglyDeteriorating
    } else if slope < -config.mild_slope {
        ForecastDirection::Deteriorating
    } else {
        ForecastDirection::Stable
    }
}

const fn recommendation(direction: ForecastDirection) -> &'static str {
    match direction {
        ForecastDirection::StronglyImproving | ForecastDirection::Improving => {
            "Expansion opportunity: zone is improving"
        }
        ForecastDirection::StronglyDeteriorating => "Alert: consider suspending operations",
        ForecastDirection::Deteriorating => "Caution: increase security measures",
        ForecastDirection::Stable => "Maintain current operation",
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::score_row;

    fn history(scores: &[f64]) -> Vec<ZoneSafetyScore> {
        scores
            .iter()
            .enumerate()
            .map(|(i, s)| score_row("01", i64::try_from(i).unwrap(), *s, 10, 1.0, 0.0, 0.0))
            .collect()
    }

    #[test]
    fn needs_minimum_history() {
        let result = forecast("01", &history(&[50.0, 52.0]), &ForecastConfig::default());
        assert_eq!(
            result,
            Availability::NotAvailable {
                required: 3,
                available: 2
            }
        );

        let empty = forecast("01", &[], &ForecastConfig::default());
        assert!(!empty.is_available());
    }

    #[test]
    fn fits_rising_scores() {
        let result = forecast("01", &history(&[50.0, 51.0, 52.0, 53.0]), &ForecastConfig::default())
            .available()
            .unwrap();

        assert!((result.slope_per_day - 1.0).abs() < 1e-9);
        // Last point is day 3; 30 days later the line reaches 83.
        assert!((result.projected_score - 83.0).abs() < 1e-9);
        assert_eq!(result.direction, ForecastDirection::StronglyImproving);
        assert_eq!(result.confidence, Confidence::Low);
    }

    #[test]
    fn projection_is_clamped() {
        let result = forecast("01", &history(&[30.0, 20.0, 10.0]), &ForecastConfig::default())
            .available()
            .unwrap();
        assert!(result.projected_score.abs() < f64::EPSILON);
        assert_eq!(result.direction, ForecastDirection::StronglyDeteriorating);
    }

    #[test]
    fn uses_only_most_recent_dates() {
        let mut scores = vec![0.0; 10];
        scores.extend(std::iter::repeat_n(60.0, 30));
        let result = forecast("01", &history(&scores), &ForecastConfig::default())
            .available()
            .unwrap();
        assert_eq!(result.history_points, 30);
        assert!(result.slope_per_day.abs() < f64::EPSILON);
        assert_eq!(result.direction, ForecastDirection::Stable);
        assert_eq!(result.confidence, Confidence::High);
    }

    #[test]
    fn ignores_other_zones() {
        let mut rows = history(&[50.0, 50.0, 50.0]);
        rows.push(score_row("02", 0, 10.0, 10, 1.0, 0.0, 0.0));
        let result = forecast("02", &rows, &ForecastConfig::default());
        assert!(!result.is_available());
    }

    #[test]
    fn slope_thresholds() {
        let config = ForecastConfig::default();
        assert_eq!(classify_slope(0.6, &config), ForecastDirection::StronglyImproving);
        assert_eq!(classify_slope(0.2, &config), ForecastDirection::Improving);
        assert_eq!(classify_slope(0.1, &config), ForecastDirection::Stable);
        assert_eq!(classify_slope(-0.1, &config), ForecastDirection::Stable);
        assert_eq!(classify_slope(-0.2, &config), ForecastDirection::Deteriorating);
        assert_eq!(classify_slope(-0.6, &config), ForecastDirection::StronglyDeteriorating);
    }
}
