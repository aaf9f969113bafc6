//! Simple moving average of volume.
//!
//! VolumeSMA[t] = mean(volume[t-period+1..=t]). Lookback: period - 1.

use super::Indicator;
use crate::domain::Bar;

#[derive(Debug, Clone)]
pub struct VolumeSma {
    period: usize,
    name: String,
}

impl VolumeSma {
    pub fn new(period: usize) -> Self {
        assert!(period >= 1, "volume SMA period must be >= 1");
        Self {
            period,
            name: format!("volume_sma_{period}"),
        }
    }
}

impl Indicator for VolumeSma {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        self.period - 1
    }

    fn compute(&self, bars: &[Bar]) -> Vec<f64> {
        let volumes: Vec<f64> = bars.iter().map(|b| b.volume).collect();
        sma_of_series(&volumes, self.period)
    }
}

/// Rolling mean over a fixed window. Any `NaN` in the window yields `NaN`.
pub fn sma_of_series(values: &[f64], period: usize) -> Vec<f64> {
    let mut result = vec![f64::NAN; values.len()];
    if period == 0 {
        return result;
    }
    for (i, window) in values.windows(period).enumerate() {
        if window.iter().any(|v| v.is_nan()) {
            continue;
        }
        result[i + period - 1] = window.iter().sum::<f64>() / period as f64;
    }
    result
}
