//! Per-bar indicator bundle consumed by the condition vote.

use super::{Adx, Ema, Indicator, Macd, MacdBand, MomentumPct, Rsi, VolatilityPct, VolumeSma};
use crate::domain::Bar;
use serde::{Deserialize, Serialize};

/// Indicator periods. Defaults follow the hourly strategy setup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndicatorParams {
    pub rsi: usize,
    pub macd_fast: usize,
    pub macd_slow: usize,
    pub macd_signal: usize,
    pub adx: usize,
    pub ema_fast: usize,
    pub ema_slow: usize,
    pub volume_sma: usize,
    pub momentum: usize,
    pub volatility: usize,
}

impl Default for IndicatorParams {
    fn default() -> Self {
        Self {
            rsi: 14,
            macd_fast: 12,
            macd_slow: 26,
            macd_signal: 9,
            adx: 14,
            ema_fast: 50,
            ema_slow: 200,
            volume_sma: 20,
            momentum: 14,
            volatility: 20,
        }
    }
}

/// Snapshot field an indicator series is written to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Column {
    Rsi,
    Macd,
    MacdSignal,
    Adx,
    EmaFast,
    EmaSlow,
    Momentum,
    Volatility,
    VolumeSma,
}

impl IndicatorParams {
    /// Every indicator the vote reads, paired with its snapshot column.
    /// Warm-up and snapshots are both derived from this list.
    fn columns(&self) -> Vec<(Column, Box<dyn Indicator>)> {
        let (fast, slow, sig) = (self.macd_fast, self.macd_slow, self.macd_signal);
        vec![
            (Column::Rsi, Box::new(Rsi::new(self.rsi))),
            (Column::Macd, Box::new(Macd::new(fast, slow, sig, MacdBand::Line))),
            (Column::MacdSignal, Box::new(Macd::new(fast, slow, sig, MacdBand::Signal))),
            (Column::Adx, Box::new(Adx::new(self.adx))),
            (Column::EmaFast, Box::new(Ema::new(self.ema_fast))),
            (Column::EmaSlow, Box::new(Ema::new(self.ema_slow))),
            (Column::Momentum, Box::new(MomentumPct::new(self.momentum))),
            (Column::Volatility, Box::new(VolatilityPct::new(self.volatility))),
            (Column::VolumeSma, Box::new(VolumeSma::new(self.volume_sma))),
        ]
    }
}

/// Indicator values at one bar. `NaN` marks a value that is not available.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IndicatorSnapshot {
    pub rsi: f64,
    pub macd: f64,
    pub macd_signal: f64,
    pub adx: f64,
    pub ema_50: f64,
    pub ema_200: f64,
    pub momentum_pct: f64,
    pub volatility_pct: f64,
    pub volume: f64,
    pub volume_sma_20: f64,
}

impl IndicatorSnapshot {
    /// Snapshot with every indicator missing.
    pub fn empty(volume: f64) -> Self {
        Self {
            rsi: f64::NAN,
            macd: f64::NAN,
            macd_signal: f64::NAN,
            adx: f64::NAN,
            ema_50: f64::NAN,
            ema_200: f64::NAN,
            momentum_pct: f64::NAN,
            volatility_pct: f64::NAN,
            volume,
            volume_sma_20: f64::NAN,
        }
    }

    fn set(&mut self, column: Column, value: f64) {
        let slot = match column {
            Column::Rsi => &mut self.rsi,
            Column::Macd => &mut self.macd,
            Column::MacdSignal => &mut self.macd_signal,
            Column::Adx => &mut self.adx,
            Column::EmaFast => &mut self.ema_50,
            Column::EmaSlow => &mut self.ema_200,
            Column::Momentum => &mut self.momentum_pct,
            Column::Volatility => &mut self.volatility_pct,
            Column::VolumeSma => &mut self.volume_sma_20,
        };
        *slot = value;
    }
}

/// First bar index at which every indicator is defined.
pub fn warmup_bars(params: &IndicatorParams) -> usize {
    params
        .columns()
        .iter()
        .map(|(_, ind)| ind.lookback())
        .max()
        .unwrap_or(0)
}

/// Compute all indicators once and bundle them per bar.
pub fn compute_snapshots(bars: &[Bar], params: &IndicatorParams) -> Vec<IndicatorSnapshot> {
    let mut snapshots: Vec<IndicatorSnapshot> =
        bars.iter().map(|b| IndicatorSnapshot::empty(b.volume)).collect();
    for (column, indicator) in params.columns() {
        let series = indicator.compute(bars);
        for (snap, value) in snapshots.iter_mut().zip(series) {
            snap.set(column, value);
        }
    }
    snapshots
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::make_bars;

    fn all_finite(s: &IndicatorSnapshot) -> bool {
        [
            s.rsi,
            s.macd,
            s.macd_signal,
            s.adx,
            s.ema_50,
            s.ema_200,
            s.momentum_pct,
            s.volatility_pct,
            s.volume,
            s.volume_sma_20,
        ]
        .iter()
        .all(|v| v.is_finite())
    }

    #[test]
    fn default_warmup_is_slow_ema() {
        assert_eq!(warmup_bars(&IndicatorParams::default()), 199);
    }

    #[test]
    fn snapshots_complete_exactly_at_warmup() {
        let params = IndicatorParams {
            ema_slow: 30,
            ..IndicatorParams::default()
        };
        let closes: Vec<f64> = (0..80).map(|i| 100.0 + (i as f64 * 0.5).sin() * 2.0 + i as f64 * 0.05).collect();
        let snaps = compute_snapshots(&make_bars(&closes), &params);
        let warmup = warmup_bars(&params);
        assert_eq!(warmup, 33); // MACD signal: 25 + 8
        assert!(!all_finite(&snaps[warmup - 1]));
        assert!(snaps[warmup..].iter().all(all_finite));
    }

    #[test]
    fn warmup_matches_first_complete_snapshot_for_any_periods() {
        let closes: Vec<f64> = (0..120).map(|i| 50.0 + (i as f64 * 0.3).cos() * 3.0 + i as f64 * 0.1).collect();
        let bars = make_bars(&closes);
        for params in [
            IndicatorParams { ema_slow: 20, macd_slow: 40, ..IndicatorParams::default() },
            IndicatorParams { ema_slow: 20, adx: 40, ..IndicatorParams::default() },
            IndicatorParams { ema_slow: 20, volume_sma: 60, ..IndicatorParams::default() },
        ] {
            let snaps = compute_snapshots(&bars, &params);
            let first = snaps.iter().position(all_finite).unwrap();
            assert_eq!(first, warmup_bars(&params), "{params:?}");
        }
    }

    #[test]
    fn params_deserialize_partial() {
        let p: IndicatorParams = serde_json::from_str(r#"{"rsi": 7}"#).unwrap();
        assert_eq!(p.rsi, 7);
        assert_eq!(p.ema_slow, 200);
    }
}
