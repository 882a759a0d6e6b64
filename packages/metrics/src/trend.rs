//! 30-day trend classification.

use zone_safety_metrics_models::{Trend, TrendDirection};

/// Compares the current 30-day count with the preceding one.
///
/// `pct = (current - previous) / max(previous, 1) * 100`, rounded to two
/// decimals. At or below `-threshold_pct` is improving, at or above
/// `+threshold_pct` is worsening.
#[must_use]
pub fn compute_trend(current: u32, previous: u32, threshold_pct: f64) -> Trend {
    let delta = f64::from(current) - f64::from(previous);
    let percentage = (delta / f64::from(previous.max(1)) * 100.0 * 100.0).round() / 100.0;

    let direction = if percentage <= -threshold_pct {
        TrendDirection::Improving
    } else if percentage >= threshold_pct {
        TrendDirection::Worsening
    } else {
        TrendDirection::Stable
    };

    Trend {
        direction,
        percentage,
        current,
        previous,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unchanged_is_stable() {
        let t = compute_trend(100, 100, 10.0);
        assert_eq!(t.direction, TrendDirection::Stable);
        assert!(t.percentage.abs() < f64::EPSILON);
    }

    #[test]
    fn doubling_is_worsening() {
        let t = compute_trend(100, 50, 10.0);
        assert_eq!(t.direction, TrendDirection::Worsening);
        assert!((t.percentage - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn twenty_percent_drop_is_improving() {
        let t = compute_trend(80, 100, 10.0);
        assert_eq!(t.direction, TrendDirection::Improving);
        assert!((t.percentage + 20.0).abs() < f64::EPSILON);
    }

    #[test]
    fn threshold_is_inclusive() {
        assert_eq!(compute_trend(110, 100, 10.0).direction, TrendDirection::Worsening);
        assert_eq!(compute_trend(90, 100, 10.0).direction, TrendDirection::Improving);
        assert_eq!(compute_trend(109, 100, 10.0).direction, TrendDirection::Stable);
    }

    #[test]
    fn zero_previous_uses_one_as_denominator() {
        let t = compute_trend(3, 0, 10.0);
        assert!((t.percentage - 300.0).abs() < f64::EPSILON);
        assert_eq!(compute_trend(0, 0, 10.0).direction, TrendDirection::Stable);
    }
}
