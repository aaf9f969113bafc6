//! Momentum as percentage change over a lookback.
//!
//! momentum_pct[t] = (close[t] - close[t-period]) / close[t-period] * 100.
//! Lookback: period.

use super::Indicator;
use crate::domain::Bar;

#[derive(Debug, Clone)]
pub struct MomentumPct {
    period: usize,
    name: String,
}

impl MomentumPct {
    pub fn new(period: usize) -> Self {
        assert!(period >= 1, "momentum period must be >= 1");
        Self {
            period,
            name: format!("momentum_pct_{period}"),
        }
    }
}

impl Indicator for MomentumPct {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        self.period
    }

    fn compute(&self, bars: &[Bar]) -> Vec<f64> {
        let mut result = vec![f64::NAN; bars.len()];
        for i in self.period..bars.len() {
            let prev = bars[i - self.period].close;
            if prev != 0.0 {
                result[i] = (bars[i].close - prev) / prev * 100.0;
            }
        }
        result
    }
}
