//! Isolation forest.
//!
//! Each tree recursively splits a random subsample on a random feature at
//! a random threshold until points are isolated. Anomalies isolate in
//! fewer splits, so their average path length is short. Scores follow
//! Liu et al.: `s(x) = 2^(-E[h(x)] / c(psi))`, in `(0, 1]`, higher meaning
//! more anomalous.

use rand::seq::index::sample;
use rand::{Rng, SeedableRng as _};
use rand_pcg::Pcg64Mcg;

use crate::features::{FEATURES, Row};

const EULER_GAMMA: f64 = 0.577_215_664_901_532_9;

enum Node {
    Leaf {
        size: usize,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: Box<Node>,
        right: Box<Node>,
    },
}

/// A fitted forest.
pub struct IsolationForest {
    trees: Vec<Node>,
    sample_size: usize,
}

/// Average path length of an unsuccessful binary search tree lookup over
/// `n` points.
#[allow(clippy::cast_precision_loss)]
fn average_path_length(n: usize) -> f64 {
    match n {
        0 | 1 => 0.0,
        2 => 1.0,
        _ => {
            let n = n as f64;
            2.0 * ((n - 1.0).ln() + EULER_GAMMA) - 2.0 * (n - 1.0) / n
        }
    }
}

impl IsolationForest {
    /// Fits `n_trees` trees, each on a subsample of at most `max_samples`
    /// rows drawn without replacement.
    #[must_use]
    pub fn fit(rows: &[Row], n_trees: usize, max_samples: usize, seed: u64) -> Self {
        let mut rng = Pcg64Mcg::seed_from_u64(seed);
        let sample_size = max_samples.min(rows.len());

        #[allow(
            clippy::cast_possible_truncation,
            clippy::cast_sign_loss,
            clippy::cast_precision_loss
        )]
        let height_limit = (sample_size.max(2) as f64).log2().ceil() as usize;

        let trees = (0..n_trees)
            .map(|_| {
                let mut indices: Vec<usize> = sample(&mut rng, rows.len(), sample_size).into_vec();
                grow(rows, &mut indices, 0, height_limit, &mut rng)
            })
            .collect();

        Self { trees, sample_size }
    }

    /// Anomaly score of one row.
    #[must_use]
    pub fn score(&self, row: &Row) -> f64 {
        let normalizer = average_path_length(self.sample_size);
        if self.trees.is_empty() || normalizer <= 0.0 {
            return 0.5;
        }

        #[allow(clippy::cast_precision_loss)]
        let mean_path = self
            .trees
            .iter()
            .map(|tree| path_length(tree, row, 0))
            .sum::<f64>()
            / self.trees.len() as f64;

        2.0_f64.powf(-mean_path / normalizer)
    }
}

fn grow(rows: &[Row], indices: &mut [usize], depth: usize, limit: usize, rng: &mut Pcg64Mcg) -> Node {
    if depth >= limit || indices.len() <= 1 {
        return Node::Leaf {
            size: indices.len(),
        };
    }

    let splittable: Vec<(usize, f64, f64)> = (0..FEATURES)
        .filter_map(|f| {
            let (lo, hi) = indices.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &i| {
                (lo.min(rows[i][f]), hi.max(rows[i][f]))
            });
            (hi > lo).then_some((f, lo, hi))
        })
        .collect();

    if splittable.is_empty() {
        return Node::Leaf {
            size: indices.len(),
        };
    }

    let (feature, lo, hi) = splittable[rng.gen_range(0..splittable.len())];
    let threshold = rng.gen_range(lo..hi);

    let mut boundary = 0;
    for i in 0..indices.len() {
        if rows[indices[i]][feature] < threshold {
            indices.swap(i, boundary);
            boundary += 1;
        }
    }

    let (left, right) = indices.split_at_mut(boundary);
    Node::Split {
        feature,
        threshold,
        left: Box::new(grow(rows, left, depth + 1, limit, rng)),
        right: Box::new(grow(rows, right, depth + 1, limit, rng)),
    }
}

#[allow(clippy::cast_precision_loss)]
fn path_length(node: &Node, row: &Row, depth: usize) -> f64 {
    match node {
        Node::Leaf { size } => depth as f64 + average_path_length(*size),
        Node::Split {
            feature,
            threshold,
            left,
            right,
        } => {
            if row[*feature] < *threshold {
                path_length(left, row, depth + 1)
            } else {
                path_length(right, row, depth + 1)
            }
        }
    }
}

/// Linear-interpolated percentile (`q` in `[0, 1]`) of a slice.
#[must_use]
pub fn percentile(values: &[f64], q: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);

    #[allow(clippy::cast_precision_loss)]
    let position = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let lower = position.floor() as usize;
    let upper = (lower + 1).min(sorted.len() - 1);

    #[allow(clippy::cast_precision_loss)]
    let fraction = position - lower as f64;
    sorted[lower] + (sorted[upper] - sorted[lower]) * fraction
}
