//! k-means with k-means++ seeding and seeded restarts.

use rand::{Rng, SeedableRng as _};
use rand_pcg::Pcg64Mcg;

use crate::features::{FEATURES, Row};

const MAX_ITERATIONS: usize = 300;

/// Below this many rows the elbow search is skipped.
const ELBOW_MIN_ROWS: usize = 10;
/// Suggested `k` when there are too few rows for an elbow search.
const ELBOW_FALLBACK_K: usize = 3;
/// Elbow search tries `k` below this bound.
const ELBOW_MAX_K: usize = 8;

/// Best fit over all restarts.
#[derive(Debug, Clone, PartialEq)]
pub struct KMeansFit {
    pub assignments: Vec<usize>,
    pub centroids: Vec<Row>,
    /// Sum of squared distances to assigned centroids.
    pub inertia: f64,
}

fn distance_sq(a: &Row, b: &Row) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y).powi(2)).sum()
}

fn nearest(row: &Row, centroids: &[Row]) -> (usize, f64) {
    centroids
        .iter()
        .enumerate()
        .map(|(i, c)| (i, distance_sq(row, c)))
        .fold((0, f64::INFINITY), |best, cur| if cur.1 < best.1 { cur } else { best })
}

fn seed_centroids(rows: &[Row], k: usize, rng: &mut Pcg64Mcg) -> Vec<Row> {
    let mut centroids = Vec::with_capacity(k);
    centroids.push(rows[rng.gen_range(0..rows.len())]);

    while centroids.len() < k {
        let weights: Vec<f64> = rows.iter().map(|r| nearest(r, &centroids).1).collect();
        let total: f64 = weights.iter().sum();

        let next = if total > 0.0 {
            let mut target = rng.gen_range(0.0..total);
            let mut chosen = rows.len() - 1;
            for (i, w) in weights.iter().enumerate() {
                if target < *w {
                    chosen = i;
                    break;
                }
                target -= w;
            }
            chosen
        } else {
            rng.gen_range(0..rows.len())
        };
        centroids.push(rows[next]);
    }

    centroids
}

fn lloyd(rows: &[Row], mut centroids: Vec<Row>) -> KMeansFit {
    let k = centroids.len();
    let mut assignments = vec![usize::MAX; rows.len()];

    for _ in 0..MAX_ITERATIONS {
        let mut changed = false;
        for (row, assignment) in rows.iter().zip(assignments.iter_mut()) {
            let (best, _) = nearest(row, &centroids);
            if *assignment != best {
                *assignment = best;
                changed = true;
            }
        }
        if !changed {
            break;
        }

        let mut sums = vec![[0.0; FEATURES]; k];
        let mut counts = vec![0_usize; k];
        for (row, &cluster) in rows.iter().zip(assignments.iter()) {
            counts[cluster] += 1;
            for f in 0..FEATURES {
                sums[cluster][f] += row[f];
            }
        }
        for c in 0..k {
            // Empty clusters keep their previous centroid.
            if counts[c] > 0 {
                #[allow(clippy::cast_precision_loss)]
                let n = counts[c] as f64;
                for f in 0..FEATURES {
                    centroids[c][f] = sums[c][f] / n;
                }
            }
        }
    }

    let inertia = rows
        .iter()
        .zip(assignments.iter())
        .map(|(row, &c)| distance_sq(row, &centroids[c]))
        .sum();

    KMeansFit {
        assignments,
        centroids,
        inertia,
    }
}

/// Runs k-means `restarts` times and keeps the lowest-inertia fit.
///
/// Returns `None` if `k` is zero or larger than the number of rows.
#[must_use]
pub fn kmeans(rows: &[Row], k: usize, restarts: usize, seed: u64) -> Option<KMeansFit> {
    if k == 0 || k > rows.len() {
        return None;
    }

    let mut rng = Pcg64Mcg::seed_from_u64(seed);
    let mut best: Option<KMeansFit> = None;

    for _ in 0..restarts.max(1) {
        let fit = lloyd(rows, seed_centroids(rows, k, &mut rng));
        if best.as_ref().is_none_or(|b| fit.inertia < b.inertia) {
            best = Some(fit);
        }
    }

    best
}

/// Suggests `k` by the elbow method: fit `k = 1..=min(8, n)` and pick the
/// `k` where the inertia curve bends hardest (largest second difference).
#[must_use]
pub fn suggest_k(rows: &[Row], restarts: usize, seed: u64) -> usize {
    if rows.len() < ELBOW_MIN_ROWS {
        return ELBOW_FALLBACK_K;
    }

    let inertias: Vec<f64> = (1..=ELBOW_MAX_K.min(rows.len()))
        .filter_map(|k| kmeans(rows, k, restarts, seed).map(|fit| fit.inertia))
        .collect();

    if inertias.len() < 3 {
        return ELBOW_FALLBACK_K;
    }

    // second[i] is centered on inertias[i + 1], which is k = i + 2.
    let second: Vec<f64> = inertias
        .windows(3)
        .map(|w| (w[2] - w[1]) - (w[1] - w[0]))
        .collect();

    second
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.total_cmp(b.1))
        .map_or(ELBOW_FALLBACK_K, |(i, _)| i + 2)
}
