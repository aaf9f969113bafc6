use crate::features::N_FEATURES;
use serde::Serialize;

/// Per-feature standardisation fitted on the training rows.
///
/// Uses the population standard deviation; a feature with zero spread keeps
/// a scale of 1 so it passes through centred but unscaled.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct StandardScaler {
    mean: [f64; N_FEATURES],
    scale: [f64; N_FEATURES],
}

impl StandardScaler {
    pub fn fit(rows: &[[f64; N_FEATURES]]) -> Self {
        let n = rows.len().max(1) as f64;
        let mut mean = [0.0; N_FEATURES];
        for row in rows {
            for (m, v) in mean.iter_mut().zip(row) {
                *m += v / n;
            }
        }
        let mut scale = [0.0; N_FEATURES];
        for row in rows {
            for i in 0..N_FEATURES {
                scale[i] += (row[i] - mean[i]).powi(2) / n;
            }
        }
        for s in scale.iter_mut() {
            *s = s.sqrt();
            if *s == 0.0 || !s.is_finite() {
                *s = 1.0;
            }
        }
        Self { mean, scale }
    }

    pub fn transform(&self, row: &[f64; N_FEATURES]) -> Vec<f64> {
        (0..N_FEATURES)
            .map(|i| (row[i] - self.mean[i]) / self.scale[i])
            .collect()
    }

    /// Map a standardised value of feature `i` back to raw units.
    pub fn inverse(&self, i: usize, value: f64) -> f64 {
        value * self.scale[i] + self.mean[i]
    }

    pub fn mean(&self) -> &[f64; N_FEATURES] {
        &self.mean
    }

    pub fn scale(&self) -> &[f64; N_FEATURES] {
        &self.scale
    }
}
