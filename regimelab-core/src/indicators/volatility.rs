//! Rolling volatility of log returns, in percent.
//!
//! volatility_pct[t] = sample_std(ln(close[i]/close[i-1]) for i in t-period+1..=t) * 100.
//! Lookback: period (the first return exists at bar 1).

use super::Indicator;
use crate::domain::Bar;
use crate::features::{log_returns, rolling_sample_std};

#[derive(Debug, Clone)]
pub struct VolatilityPct {
    period: usize,
    name: String,
}

impl VolatilityPct {
    pub fn new(period: usize) -> Self {
        assert!(period >= 2, "volatility period must be >= 2");
        Self {
            period,
            name: format!("volatility_pct_{period}"),
        }
    }
}

impl Indicator for VolatilityPct {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        self.period
    }

    fn compute(&self, bars: &[Bar]) -> Vec<f64> {
        rolling_sample_std(&log_returns(bars), self.period)
            .into_iter()
            .map(|v| v * 100.0)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::{assert_approx, make_bars};

    #[test]
    fn constant_growth_has_zero_volatility() {
        let closes: Vec<f64> = (0..10).map(|i| 100.0 * 1.01f64.powi(i)).collect();
        let result = VolatilityPct::new(3).compute(&make_bars(&closes));
        assert!(result[2].is_nan());
        assert_approx(result[3], 0.0, 1e-9);
    }

    #[test]
    fn alternating_returns() {
        // Returns +ln2, -ln2: sample std of [a, -a] = a * sqrt(2)
        let bars = make_bars(&[100.0, 200.0, 100.0]);
        let result = VolatilityPct::new(2).compute(&bars);
        assert_approx(result[2], 2f64.ln() * 2f64.sqrt() * 100.0, 1e-9);
    }
}
