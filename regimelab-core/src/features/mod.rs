//! Feature extraction for regime detection.
//!
//! Three features per bar: log return, intrabar range relative to close,
//! and the rolling sample standard deviation of log returns. Rows that are
//! not fully defined are `None` and take no part in training or prediction.

use crate::domain::Bar;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Number of features per row.
pub const N_FEATURES: usize = 3;

/// Default rolling window for return volatility.
pub const DEFAULT_VOLATILITY_WINDOW: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    pub log_return: f64,
    pub range_pct: f64,
    pub volume_volatility: f64,
}

impl FeatureVector {
    pub fn as_array(&self) -> [f64; N_FEATURES] {
        [self.log_return, self.range_pct, self.volume_volatility]
    }

    pub fn is_finite(&self) -> bool {
        self.as_array().iter().all(|v| v.is_finite())
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum FeatureError {
    #[error("need at least {needed} bars to build features, got {got}")]
    InsufficientData { needed: usize, got: usize },
}

/// Builds the per-bar feature rows, aligned 1:1 with the input bars.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeatureBuilder {
    window: usize,
}

impl Default for FeatureBuilder {
    fn default() -> Self {
        Self::new(DEFAULT_VOLATILITY_WINDOW)
    }
}

impl FeatureBuilder {
    pub fn new(window: usize) -> Self {
        assert!(window >= 2, "volatility window must be >= 2");
        Self { window }
    }

    pub fn window(&self) -> usize {
        self.window
    }

    /// Bars needed before the first defined row exists: `window + 1`.
    pub fn lookback(&self) -> usize {
        self.window + 1
    }

    pub fn build(&self, bars: &[Bar]) -> Result<Vec<Option<FeatureVector>>, FeatureError> {
        if bars.len() < self.lookback() {
            return Err(FeatureError::InsufficientData {
                needed: self.lookback(),
                got: bars.len(),
            });
        }

        let returns = log_returns(bars);
        let volatility = rolling_sample_std(&returns, self.window);

        let rows = bars
            .iter()
            .enumerate()
            .map(|(t, bar)| {
                let row = FeatureVector {
                    log_return: returns[t],
                    range_pct: (bar.high - bar.low) / bar.close,
                    volume_volatility: volatility[t],
                };
                row.is_finite().then_some(row)
            })
            .collect();
        Ok(rows)
    }
}

/// Index and feature array of every defined row, in order.
pub fn valid_rows(rows: &[Option<FeatureVector>]) -> (Vec<usize>, Vec<[f64; N_FEATURES]>) {
    rows.iter()
        .enumerate()
        .filter_map(|(i, r)| r.map(|f| (i, f.as_array())))
        .unzip()
}

/// `ln(close[t] / close[t-1])`, `NaN` at t = 0.
pub fn log_returns(bars: &[Bar]) -> Vec<f64> {
    let mut out = Vec::with_capacity(bars.len());
    if !bars.is_empty() {
        out.push(f64::NAN);
    }
    out.extend(bars.windows(2).map(|w| (w[1].close / w[0].close).ln()));
    out
}

/// Rolling sample standard deviation (n - 1 denominator).
///
/// A window containing any `NaN` yields `NaN`.
pub fn rolling_sample_std(values: &[f64], window: usize) -> Vec<f64> {
    let mut out = vec![f64::NAN; values.len()];
    if window < 2 {
        return out;
    }
    for (i, w) in values.windows(window).enumerate() {
        if w.iter().any(|v| v.is_nan()) {
            continue;
        }
        let mean = w.iter().sum::<f64>() / window as f64;
        let ss: f64 = w.iter().map(|v| (v - mean).powi(2)).sum();
        out[i + window - 1] = (ss / (window - 1) as f64).sqrt();
    }
    out
}
