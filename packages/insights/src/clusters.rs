//! Zone segmentation by k-means over score and infrastructure features.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use zone_safety_insights_models::{Availability, ClusterReport, ClusterSummary};
use zone_safety_metrics_models::ZoneSafetyScore;

use crate::features::{Row, standardize};
use crate::kmeans::{kmeans, suggest_k};

/// Number of clusters: a fixed count or `"auto"` for the elbow method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "ClusterCountRepr", into = "ClusterCountRepr")]
pub enum ClusterCount {
    Fixed(usize),
    Auto,
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum ClusterCountRepr {
    Fixed(usize),
    Named(String),
}

impl TryFrom<ClusterCountRepr> for ClusterCount {
    type Error = String;

    fn try_from(value: ClusterCountRepr) -> Result<Self, Self::Error> {
        match value {
            ClusterCountRepr::Fixed(0) => Err("Cluster count must be positive".to_string()),
            ClusterCountRepr::Fixed(k) => Ok(Self::Fixed(k)),
            ClusterCountRepr::Named(name) if name.eq_ignore_ascii_case("auto") => Ok(Self::Auto),
            ClusterCountRepr::Named(name) => {
                Err(format!("Invalid cluster count '{name}', expected a number or \"auto\""))
            }
        }
    }
}

impl From<ClusterCount> for ClusterCountRepr {
    fn from(value: ClusterCount) -> Self {
        match value {
            ClusterCount::Fixed(k) => Self::Fixed(k),
            ClusterCount::Auto => Self::Named("auto".to_string()),
        }
    }
}

/// Loaded from the `[insights.clustering]` config section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusteringConfig {
    pub k: ClusterCount,
    pub restarts: usize,
    pub seed: u64,
    /// Mean score above which a cluster is considered safe.
    pub safe_score: f64,
    pub moderate_score: f64,
    pub limited_score: f64,
    /// Mean 30-day thefts above which a low-scoring cluster is high-risk.
    pub high_theft: f64,
}

impl Default for ClusteringConfig {
    fn default() -> Self {
        Self {
            k: ClusterCount::Fixed(4),
            restarts: 10,
            seed: 42,
            safe_score: 70.0,
            moderate_score: 50.0,
            limited_score: 30.0,
            high_theft: 100.0,
        }
    }
}

fn features(score: &ZoneSafetyScore) -> Row {
    [
        score.safety_score,
        score.incident_density,
        score.lane_density,
        score.parking_density,
    ]
}

/// Groups zones into clusters, numbered from the highest mean score.
///
/// Yields [`Availability::NotAvailable`] when there are fewer zones than
/// clusters.
#[must_use]
pub fn cluster_zones(
    scores: &[ZoneSafetyScore],
    config: &ClusteringConfig,
) -> Availability<ClusterReport> {
    let raw: Vec<Row> = scores.iter().map(features).collect();
    let scaled = standardize(&raw);

    let suggested_k = suggest_k(&scaled, config.restarts, config.seed);
    let k = match config.k {
        ClusterCount::Fixed(k) => k,
        ClusterCount::Auto => suggested_k,
    };

    let Some(fit) = kmeans(&scaled, k, config.restarts, config.seed) else {
        log::debug!("Skipping clustering: {} zones, need {k}", scores.len());
        return Availability::NotAvailable {
            required: k.max(1),
            available: scores.len(),
        };
    };

    let mut members: Vec<Vec<usize>> = vec![Vec::new(); k];
    for (i, &cluster) in fit.assignments.iter().enumerate() {
        members[cluster].push(i);
    }

    let mean = |indices: &[usize], value: fn(&ZoneSafetyScore) -> f64| mean_of(scores, indices, value);

    let mut order: Vec<usize> = (0..k).collect();
    let mean_scores: Vec<f64> = members.iter().map(|m| mean(m, |s| s.safety_score)).collect();
    order.sort_by(|a, b| mean_scores[*b].total_cmp(&mean_scores[*a]).then(a.cmp(b)));

    let mut relabel = vec![0; k];
    for (new_id, &old_id) in order.iter().enumerate() {
        relabel[old_id] = new_id;
    }

    let clusters: Vec<ClusterSummary> = order
        .iter()
        .enumerate()
        .map(|(new_id, &old_id)| {
            let indices = &members[old_id];
            let mean_safety_score = mean_scores[old_id];
            let mean_thefts_30d = mean(indices, |s| f64::from(s.thefts_30d));
            let centroid = fit.centroids[old_id];

            ClusterSummary {
                cluster_id: new_id,
                label: label(mean_safety_score, &centroid, config),
                description: describe(mean_safety_score, mean_thefts_30d, config).to_string(),
                strategy: strategy(mean_safety_score, config).to_string(),
                zone_codes: indices.iter().map(|&i| scores[i].zone_code.clone()).collect(),
                mean_safety_score: round2(mean_safety_score),
                mean_thefts_30d: round2(mean_thefts_30d),
                mean_incident_density: round2(mean(indices, |s| s.incident_density)),
            }
        })
        .collect();

    let assignments: BTreeMap<String, usize> = scores
        .iter()
        .zip(fit.assignments.iter())
        .map(|(s, &c)| (s.zone_code.clone(), relabel[c]))
        .collect();

    log::info!("Clustered {} zones into {k} groups", scores.len());

    Availability::Available(ClusterReport {
        calculation_date: scores.first().map(|s| s.calculation_date),
        k,
        suggested_k,
        inertia: round2(fit.inertia),
        assignments,
        clusters,
    })
}

fn label(mean_score: f64, centroid: &Row, config: &ClusteringConfig) -> String {
    let risk = if mean_score > config.safe_score {
        "low-risk"
    } else if mean_score > config.moderate_score {
        "moderate-risk"
    } else {
        "high-risk"
    };
    // Centroid is in z-space: above zero means above the city average.
    let infrastructure = if centroid[2] + centroid[3] >= 0.0 {
        "high-infrastructure"
    } else {
        "low-infrastructure"
    };
    format!("{risk} / {infrastructure}")
}

fn describe(mean_score: f64, mean_thefts: f64, config: &ClusteringConfig) -> &'static str {
    if mean_score > config.safe_score {
        "Safe zones with good infrastructure"
    } else if mean_score > config.moderate_score {
        "Moderate-risk zones"
    } else if mean_thefts > config.high_theft {
        "High-risk zones with heavy theft activity"
    } else {
        "Developing zones"
    }
}

fn strategy(mean_score: f64, config: &ClusteringConfig) -> &'static str {
    if mean_score > config.safe_score {
        "Aggressive expansion: priority zone"
    } else if mean_score > config.moderate_score {
        "Standard operation with monitoring"
    } else if mean_score > config.limited_score {
        "Limited operation with restricted hours"
    } else {
        "Do not operate without special intervention"
    }
}

#[allow(clippy::cast_precision_loss)]
fn mean_of(
    scores: &[ZoneSafetyScore],
    indices: &[usize],
    value: fn(&ZoneSafetyScore) -> f64,
) -> f64 {
    if indices.is_empty() {
        return 0.0;
    }
    indices.iter().map(|&i| value(&scores[i])).sum::<f64>() / indices.len() as f64
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
