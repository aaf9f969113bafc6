//! Technical indicators feeding the entry-condition vote.
//!
//! Every indicator implements [`Indicator`]: a pure function from the bar
//! history to a series of the same length, `NaN` during warm-up. They are
//! computed once per run and bundled per bar into an [`IndicatorSnapshot`].
//!
//! MACD has two outputs and is exposed as one named instance per band,
//! keeping the single-series trait unchanged.

pub mod adx;
pub mod atr;
pub mod ema;
pub mod macd;
pub mod momentum;
pub mod rsi;
pub mod sma;
pub mod snapshot;
pub mod volatility;

pub use adx::Adx;
pub use ema::Ema;
pub use macd::{Macd, MacdBand};
pub use momentum::MomentumPct;
pub use rsi::Rsi;
pub use sma::VolumeSma;
pub use snapshot::{compute_snapshots, warmup_bars, IndicatorParams, IndicatorSnapshot};
pub use volatility::VolatilityPct;

use crate::domain::Bar;

/// Trait for indicators.
///
/// # Look-ahead guard
/// No value at bar t may depend on bars after t. Each implementation is
/// tested by computing on a truncated series and comparing prefixes.
pub trait Indicator: Send + Sync {
    /// Human-readable name (e.g., "ema_50", "rsi_14").
    fn name(&self) -> &str;

    /// Number of leading bars that are `NaN` in the output.
    fn lookback(&self) -> usize;

    /// Compute the indicator for the whole series. Output length == `bars.len()`.
    fn compute(&self, bars: &[Bar]) -> Vec<f64>;
}

/// Create synthetic hourly bars from close prices for testing.
///
/// open = prev_close (or close for the first bar), high/low = ±1.0 around
/// the body, volume = 1000.
#[cfg(test)]
pub fn make_bars(closes: &[f64]) -> Vec<Bar> {
    use chrono::TimeZone;
    let base = chrono::Utc
        .with_ymd_and_hms(2024, 1, 2, 9, 0, 0)
        .unwrap();
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| {
            let open = if i == 0 { close } else { closes[i - 1] };
            Bar {
                timestamp: base + chrono::Duration::hours(i as i64),
                open,
                high: open.max(close) + 1.0,
                low: open.min(close) - 1.0,
                close,
                volume: 1000.0,
            }
        })
        .collect()
}

/// Assert two f64 values are approximately equal (within epsilon).
#[cfg(test)]
pub fn assert_approx(actual: f64, expected: f64, epsilon: f64) {
    assert!(
        (actual - expected).abs() < epsilon,
        "assert_approx failed: actual={actual}, expected={expected}, diff={}, epsilon={epsilon}",
        (actual - expected).abs()
    );
}

/// Default epsilon for indicator tests.
#[cfg(test)]
pub const DEFAULT_EPSILON: f64 = 1e-10;

/// Shared look-ahead check: values on a truncated series must equal the
/// prefix of the full-series output.
#[cfg(test)]
pub fn assert_no_lookahead(indicator: &dyn Indicator, bars: &[Bar], cut: usize) {
    let full = indicator.compute(bars);
    let truncated = indicator.compute(&bars[..cut]);
    for (i, (&a, &b)) in truncated.iter().zip(full.iter()).enumerate() {
        if a.is_nan() {
            assert!(b.is_nan(), "{} diverges at bar {i}", indicator.name());
        } else {
            assert_approx(a, b, 1e-9);
        }
    }
}
