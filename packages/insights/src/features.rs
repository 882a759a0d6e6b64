//! Feature matrices and z-score standardization.

/// Number of features every analysis uses.
pub const FEATURES: usize = 4;

/// One observation.
pub type Row = [f64; FEATURES];

/// Column means and population standard deviations.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Scaler {
    pub mean: Row,
    pub std: Row,
}

impl Scaler {
    /// Fits the scaler to a matrix. An empty matrix yields zero means and
    /// unit deviations.
    #[must_use]
    pub fn fit(rows: &[Row]) -> Self {
        let mut mean = [0.0; FEATURES];
        let mut std = [1.0; FEATURES];
        if rows.is_empty() {
            return Self { mean, std };
        }

        #[allow(clippy::cast_precision_loss)]
        let n = rows.len() as f64;

        for (f, m) in mean.iter_mut().enumerate() {
            *m = rows.iter().map(|r| r[f]).sum::<f64>() / n;
        }
        for (f, s) in std.iter_mut().enumerate() {
            let var = rows.iter().map(|r| (r[f] - mean[f]).powi(2)).sum::<f64>() / n;
            *s = var.sqrt();
        }

        Self { mean, std }
    }

    /// Z-scores of one row. Constant columns map to zero.
    #[must_use]
    pub fn transform(&self, row: &Row) -> Row {
        let mut out = [0.0; FEATURES];
        for f in 0..FEATURES {
            out[f] = if self.std[f] > 0.0 {
                (row[f] - self.mean[f]) / self.std[f]
            } else {
                0.0
            };
        }
        out
    }
}

/// Standardizes every column to zero mean and unit variance.
#[must_use]
pub fn standardize(rows: &[Row]) -> Vec<Row> {
    let scaler = Scaler::fit(rows);
    rows.iter().map(|r| scaler.transform(r)).collect()
}

/// Median of a slice; zero when empty.
#[must_use]
pub fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        f64::midpoint(sorted[mid - 1], sorted[mid])
    } else {
        sorted[mid]
    }
}
