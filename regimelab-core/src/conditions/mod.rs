//! Entry-condition vote.
//!
//! Eight independent predicates over the bar's close and indicator snapshot,
//! folded into an unweighted count in `0..=8`. The count is recomputed from
//! scratch every bar.

use crate::indicators::IndicatorSnapshot;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Number of conditions in the vote.
pub const CONDITION_COUNT: u8 = 8;

/// Thresholds for the vote. Immutable once a run starts.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConditionThresholds {
    pub rsi_max: f64,
    pub momentum_min_pct: f64,
    pub volatility_max_pct: f64,
    pub volume_multiplier: f64,
    pub adx_min: f64,
}

impl Default for ConditionThresholds {
    fn default() -> Self {
        Self {
            rsi_max: 90.0,
            momentum_min_pct: 1.0,
            volatility_max_pct: 6.0,
            volume_multiplier: 1.0,
            adx_min: 25.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Condition {
    RsiBelowMax,
    MomentumAboveMin,
    VolatilityBelowMax,
    VolumeAboveAverage,
    AdxAboveMin,
    CloseAboveEmaFast,
    CloseAboveEmaSlow,
    MacdAboveSignal,
}

impl Condition {
    pub const ALL: [Condition; CONDITION_COUNT as usize] = [
        Condition::RsiBelowMax,
        Condition::MomentumAboveMin,
        Condition::VolatilityBelowMax,
        Condition::VolumeAboveAverage,
        Condition::AdxAboveMin,
        Condition::CloseAboveEmaFast,
        Condition::CloseAboveEmaSlow,
        Condition::MacdAboveSignal,
    ];

    /// Inputs this condition reads, by name, with their values.
    fn inputs(self, close: f64, s: &IndicatorSnapshot) -> [Option<(&'static str, f64)>; 2] {
        match self {
            Condition::RsiBelowMax => [Some(("rsi", s.rsi)), None],
            Condition::MomentumAboveMin => [Some(("momentum_pct", s.momentum_pct)), None],
            Condition::VolatilityBelowMax => [Some(("volatility_pct", s.volatility_pct)), None],
            Condition::VolumeAboveAverage => {
                [Some(("volume", s.volume)), Some(("volume_sma_20", s.volume_sma_20))]
            }
            Condition::AdxAboveMin => [Some(("adx", s.adx)), None],
            Condition::CloseAboveEmaFast => [Some(("close", close)), Some(("ema_50", s.ema_50))],
            Condition::CloseAboveEmaSlow => [Some(("close", close)), Some(("ema_200", s.ema_200))],
            Condition::MacdAboveSignal => [Some(("macd", s.macd)), Some(("macd_signal", s.macd_signal))],
        }
    }

    /// Evaluate the predicate. Comparisons against `NaN` are false.
    pub fn holds(self, close: f64, s: &IndicatorSnapshot, t: &ConditionThresholds) -> bool {
        match self {
            Condition::RsiBelowMax => s.rsi < t.rsi_max,
            Condition::MomentumAboveMin => s.momentum_pct > t.momentum_min_pct,
            Condition::VolatilityBelowMax => s.volatility_pct < t.volatility_max_pct,
            Condition::VolumeAboveAverage => s.volume > t.volume_multiplier * s.volume_sma_20,
            Condition::AdxAboveMin => s.adx > t.adx_min,
            Condition::CloseAboveEmaFast => close > s.ema_50,
            Condition::CloseAboveEmaSlow => close > s.ema_200,
            Condition::MacdAboveSignal => s.macd > s.macd_signal,
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Condition::RsiBelowMax => "rsi_below_max",
            Condition::MomentumAboveMin => "momentum_above_min",
            Condition::VolatilityBelowMax => "volatility_below_max",
            Condition::VolumeAboveAverage => "volume_above_average",
            Condition::AdxAboveMin => "adx_above_min",
            Condition::CloseAboveEmaFast => "close_above_ema_fast",
            Condition::CloseAboveEmaSlow => "close_above_ema_slow",
            Condition::MacdAboveSignal => "macd_above_signal",
        };
        f.write_str(name)
    }
}

/// An indicator input was not a finite number.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("indicator `{indicator}` is missing for condition {condition}")]
pub struct MissingIndicatorError {
    pub condition: Condition,
    pub indicator: &'static str,
}

/// Count of satisfied conditions. Missing inputs simply fail their check.
pub fn evaluate(close: f64, snapshot: &IndicatorSnapshot, thresholds: &ConditionThresholds) -> u8 {
    Condition::ALL
        .iter()
        .filter(|c| c.holds(close, snapshot, thresholds))
        .count() as u8
}

/// Like [`evaluate`], but refuses to vote when any input is not finite.
pub fn try_evaluate(
    close: f64,
    snapshot: &IndicatorSnapshot,
    thresholds: &ConditionThresholds,
) -> Result<u8, MissingIndicatorError> {
    for condition in Condition::ALL {
        if let Some((indicator, _)) = condition
            .inputs(close, snapshot)
            .into_iter()
            .flatten()
            .find(|(_, v)| !v.is_finite())
        {
            return Err(MissingIndicatorError {
                condition,
                indicator,
            });
        }
    }
    Ok(evaluate(close, snapshot, thresholds))
}

/// Per-condition breakdown for one bar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionReport {
    pub results: Vec<(Condition, bool)>,
}

impl ConditionReport {
    pub fn new(close: f64, snapshot: &IndicatorSnapshot, thresholds: &ConditionThresholds) -> Self {
        Self {
            results: Condition::ALL
                .iter()
                .map(|&c| (c, c.holds(close, snapshot, thresholds)))
                .collect(),
        }
    }

    pub fn met(&self) -> u8 {
        self.results.iter().filter(|(_, ok)| *ok).count() as u8
    }

    pub fn failed(&self) -> impl Iterator<Item = Condition> + '_ {
        self.results.iter().filter(|(_, ok)| !ok).map(|(c, _)| *c)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn passing() -> IndicatorSnapshot {
        IndicatorSnapshot {
            rsi: 55.0,
            macd: 1.2,
            macd_signal: 0.8,
            adx: 32.0,
            ema_50: 98.0,
            ema_200: 95.0,
            momentum_pct: 2.5,
            volatility_pct: 1.5,
            volume: 12_000.0,
            volume_sma_20: 10_000.0,
        }
    }

    fn failing() -> IndicatorSnapshot {
        IndicatorSnapshot {
            rsi: 95.0,
            macd: 0.1,
            macd_signal: 0.5,
            adx: 10.0,
            ema_50: 105.0,
            ema_200: 110.0,
            momentum_pct: -3.0,
            volatility_pct: 9.0,
            volume: 5_000.0,
            volume_sma_20: 10_000.0,
        }
    }

    #[test]
    fn all_pass_is_eight() {
        assert_eq!(evaluate(100.0, &passing(), &ConditionThresholds::default()), 8);
    }

    #[test]
    fn all_fail_is_zero() {
        assert_eq!(evaluate(100.0, &failing(), &ConditionThresholds::default()), 0);
    }

    #[test]
    fn thresholds_are_strict() {
        let mut s = passing();
        s.rsi = 90.0;
        s.adx = 25.0;
        s.volume = 10_000.0;
        assert_eq!(evaluate(100.0, &s, &ConditionThresholds::default()), 5);
    }

    #[test]
    fn thresholds_are_configurable() {
        let t = ConditionThresholds {
            rsi_max: 50.0,
            ..ConditionThresholds::default()
        };
        assert_eq!(evaluate(100.0, &passing(), &t), 7);
    }

    #[test]
    fn nan_input_fails_its_check_only() {
        let mut s = passing();
        s.ema_200 = f64::NAN;
        assert_eq!(evaluate(100.0, &s, &ConditionThresholds::default()), 7);
    }

    #[test]
    fn try_evaluate_names_first_missing_input() {
        let mut s = passing();
        s.volume_sma_20 = f64::NAN;
        s.macd_signal = f64::INFINITY;
        let err = try_evaluate(100.0, &s, &ConditionThresholds::default()).unwrap_err();
        assert_eq!(err.condition, Condition::VolumeAboveAverage);
        assert_eq!(err.indicator, "volume_sma_20");
    }

    #[test]
    fn try_evaluate_ok_when_complete() {
        let t = ConditionThresholds::default();
        assert_eq!(try_evaluate(100.0, &failing(), &t), Ok(0));
    }

    #[test]
    fn report_matches_count() {
        let mut s = passing();
        s.rsi = 99.0;
        let report = ConditionReport::new(100.0, &s, &ConditionThresholds::default());
        assert_eq!(report.met(), 7);
        assert_eq!(report.failed().collect::<Vec<_>>(), vec![Condition::RsiBelowMax]);
    }
}
