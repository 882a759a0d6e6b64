//! Anomaly detection over one day's zone scores.

use serde::{Deserialize, Serialize};
use zone_safety_insights_models::{AnomalyAction, ZoneAnomaly};
use zone_safety_metrics_models::ZoneSafetyScore;

use crate::features::{Row, Scaler, median};
use crate::isolation_forest::{IsolationForest, percentile};

const FEATURE_NAMES: [&str; 4] = ["theft count", "theft density", "lane coverage", "parking spots"];

/// Loaded from the `[insights.anomaly]` config section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnomalyConfig {
    /// Fewer zones than this yields an empty list.
    pub min_zones: usize,
    /// Expected share of anomalous zones.
    pub contamination: f64,
    pub trees: usize,
    pub max_samples: usize,
    pub seed: u64,
    /// Theft count above which the action is `ALERT`.
    pub alert_thefts: u32,
    /// Density above which the action is `CAUTION`.
    pub caution_density: f64,
    /// Lane coverage below which high theft counts are attributed to
    /// missing infrastructure.
    pub low_lane_km: f64,
}

impl Default for AnomalyConfig {
    fn default() -> Self {
        Self {
            min_zones: 10,
            contamination: 0.1,
            trees: 100,
            max_samples: 256,
            seed: 42,
            alert_thefts: 50,
            caution_density: 10.0,
            low_lane_km: 5.0,
        }
    }
}

fn features(score: &ZoneSafetyScore, window_days: u32) -> Row {
    [
        f64::from(score.thefts_for_window(window_days)),
        score.incident_density,
        score.lane_coverage_km,
        f64::from(score.parking_spots),
    ]
}

/// Flags zones whose metrics stand out from the rest, most anomalous
/// first.
///
/// `window_days` selects which rolling theft count feeds the model.
/// Returns an empty list when fewer than `min_zones` zones are given.
#[must_use]
pub fn detect_anomalies(
    scores: &[ZoneSafetyScore],
    window_days: u32,
    config: &AnomalyConfig,
) -> Vec<ZoneAnomaly> {
    if scores.len() < config.min_zones.max(2) {
        log::debug!(
            "Skipping anomaly detection: {} zones, need {}",
            scores.len(),
            config.min_zones
        );
        return Vec::new();
    }

    let raw: Vec<Row> = scores.iter().map(|s| features(s, window_days)).collect();
    let scaler = Scaler::fit(&raw);
    let scaled: Vec<Row> = raw.iter().map(|r| scaler.transform(r)).collect();

    let forest = IsolationForest::fit(&scaled, config.trees, config.max_samples, config.seed);
    let isolation: Vec<f64> = scaled.iter().map(|r| forest.score(r)).collect();
    let threshold = percentile(&isolation, 1.0 - config.contamination);

    let thefts: Vec<f64> = raw.iter().map(|r| r[0]).collect();
    let densities: Vec<f64> = raw.iter().map(|r| r[1]).collect();
    let medians = Medians {
        thefts: median(&thefts),
        density: median(&densities),
    };

    let mut anomalies: Vec<ZoneAnomaly> = scores
        .iter()
        .zip(raw.iter().zip(scaled.iter()))
        .zip(isolation.iter())
        .filter(|(_, s)| **s > threshold)
        .map(|((score, (row, z)), s)| {
            let action = action(row, config);
            ZoneAnomaly {
                zone_code: score.zone_code.clone(),
                zone_name: score.zone_name.clone(),
                anomaly_score: (s * 10_000.0).round() / 10_000.0,
                thefts: score.thefts_for_window(window_days),
                incident_density: score.incident_density,
                lane_coverage_km: score.lane_coverage_km,
                parking_spots: score.parking_spots,
                reason: reason(row, z, &medians, config),
                action,
                advice: action.advice().to_string(),
            }
        })
        .collect();

    anomalies.sort_by(|a, b| {
        b.anomaly_score
            .total_cmp(&a.anomaly_score)
            .then_with(|| a.zone_code.cmp(&b.zone_code))
    });

    log::info!(
        "Detected {} anomalous zones out of {}",
        anomalies.len(),
        scores.len()
    );

    anomalies
}

struct Medians {
    thefts: f64,
    density: f64,
}

fn reason(row: &Row, z: &Row, medians: &Medians, config: &AnomalyConfig) -> String {
    let mut reasons = Vec::new();

    if let Some((feature, value)) = z
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.abs().total_cmp(&b.1.abs()))
        && value.abs() > 0.0
    {
        let side = if *value > 0.0 { "above" } else { "below" };
        reasons.push(format!(
            "{} is {:.1} standard deviations {side} the mean",
            FEATURE_NAMES[feature],
            value.abs()
        ));
    }

    if row[0] > medians.thefts * 2.0 {
        reasons.push(format!(
            "Excessive thefts: {:.0} vs median {:.0}",
            row[0], medians.thefts
        ));
    }
    if row[1] > medians.density * 2.0 {
        reasons.push(format!("High theft density: {:.1}/km²", row[1]));
    }
    if row[2] < config.low_lane_km && row[0] > medians.thefts {
        reasons.push("High crime with little cycling infrastructure".to_string());
    }

    if reasons.is_empty() {
        "Unusual pattern detected".to_string()
    } else {
        reasons.join(" | ")
    }
}

fn action(row: &Row, config: &AnomalyConfig) -> AnomalyAction {
    if row[0] > f64::from(config.alert_thefts) {
        AnomalyAction::Alert
    } else if row[1] > config.caution_density {
        AnomalyAction::Caution
    } else {
        AnomalyAction::Monitor
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::score_row;

    fn city() -> Vec<ZoneSafetyScore> {
        let mut zones: Vec<ZoneSafetyScore> = (0..11)
            .map(|i| {
                let code = format!("Z{i:02}");
                let jitter = f64::from(i % 4);
                score_row(&code, 0, 70.0, 4 + i % 3, 1.0 + jitter * 0.1, 1.0, 0.5)
            })
            .collect();
        zones.push(score_row("HOT", 0, 5.0, 200, 40.0, 0.0, 0.0));
        zones
    }

    #[test]
    fn single_zone_yields_empty_list() {
        let one = vec![score_row("01", 0, 50.0, 10, 1.0, 1.0, 1.0)];
        assert!(detect_anomalies(&one, 30, &AnomalyConfig::default()).is_empty());
    }

    #[test]
    fn below_minimum_yields_empty_list() {
        let zones: Vec<_> = city().into_iter().take(9).collect();
        assert!(detect_anomalies(&zones, 30, &AnomalyConfig::default()).is_empty());
    }

    #[test]
    fn flags_hot_zone_first() {
        let anomalies = detect_anomalies(&city(), 30, &AnomalyConfig::default());
        assert!(!anomalies.is_empty());

        let top = &anomalies[0];
        assert_eq!(top.zone_code, "HOT");
        assert_eq!(top.action, AnomalyAction::Alert);
        assert!(top.reason.contains("Excessive thefts"));
        assert!(top.advice.starts_with("ALERT"));
    }

    #[test]
    fn ranked_by_descending_score() {
        let anomalies = detect_anomalies(&city(), 7, &AnomalyConfig::default());
        for pair in anomalies.windows(2) {
            assert!(pair[0].anomaly_score >= pair[1].anomaly_score);
        }
    }

    #[test]
    fn action_vocabulary_thresholds() {
        let config = AnomalyConfig::default();
        assert_eq!(action(&[51.0, 0.0, 0.0, 0.0], &config), AnomalyAction::Alert);
        assert_eq!(action(&[50.0, 10.5, 0.0, 0.0], &config), AnomalyAction::Caution);
        assert_eq!(action(&[50.0, 10.0, 0.0, 0.0], &config), AnomalyAction::Monitor);
    }
}
