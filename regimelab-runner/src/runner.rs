//! Backtest runner: wires features, regime model, condition vote and
//! simulator together and summarises the outcome.
//!
//! Two entry points:
//! - `run_backtest()`: pre-loaded bars, no I/O. Used by batch runs and tests.
//! - `run_csv_backtest()`: loads a CSV file first. Used by the CLI.
//!
//! Model-setup failures abort before any bar is simulated. A failed HMM fit
//! is handled by the configured [`ConvergenceFallback`].

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use regimelab_core::conditions::try_evaluate;
use regimelab_core::domain::{validate_series, Bar, BarError, EquityPoint, RegimeLabel, Trade};
use regimelab_core::engine::{simulate, BarSignal, OpenPosition, RegimeGate, SimulationError};
use regimelab_core::features::{FeatureBuilder, FeatureError, FeatureVector};
use regimelab_core::indicators::compute_snapshots;
use regimelab_core::regime::{RegimeDetector, RegimeDiagnostics, RegimeError};

use crate::config::{BacktestConfig, ConfigError, ConvergenceFallback};
use crate::data_loader::{dataset_hash, load_bars_csv, LoadError};
use crate::metrics::PerformanceSummary;

/// Errors from the runner.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("data error: {0}")]
    Data(#[from] LoadError),
    #[error("bar series error: {0}")]
    Bars(#[from] BarError),
    #[error("feature error: {0}")]
    Features(#[from] FeatureError),
    #[error("regime model error: {0}")]
    Regime(#[from] RegimeError),
    #[error("simulation error: {0}")]
    Simulation(#[from] SimulationError),
}

/// Current schema version for persisted artifacts.
pub const SCHEMA_VERSION: u32 = 1;

/// Regime and vote attached to one bar.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegimePoint {
    pub timestamp: DateTime<Utc>,
    pub regime: Option<RegimeLabel>,
    /// `None` where an indicator input was missing.
    pub conditions_met: Option<u8>,
}

/// Complete result of a single backtest run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestResult {
    /// Schema version for forward-compatible deserialization.
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    pub run_id: String,
    pub symbol: String,
    pub dataset_hash: String,
    pub config: BacktestConfig,
    pub summary: PerformanceSummary,
    pub trades: Vec<Trade>,
    pub equity: Vec<EquityPoint>,
    /// One entry per input bar.
    pub regimes: Vec<RegimePoint>,
    /// `None` when the run fell back to an all-Neutral regime stream.
    pub model: Option<RegimeDiagnostics>,
    /// True when the regime model could not be fitted and the run used
    /// the Neutral fallback with the regime gate disabled.
    pub regime_fallback: bool,
    pub fallback_reason: Option<String>,
    pub bar_count: usize,
    pub start_index: usize,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub missing_indicator_bars: Vec<usize>,
    pub open_position: Option<OpenPosition>,
}

/// Default schema version for serde deserialization of older JSON without the field.
fn default_schema_version() -> u32 {
    SCHEMA_VERSION
}

/// Regime stream plus how it was produced.
struct RegimeStream {
    labels: Vec<Option<RegimeLabel>>,
    model: Option<RegimeDiagnostics>,
    gate: RegimeGate,
    fallback_reason: Option<String>,
}

/// Load `path` and run it. The symbol is the upper-cased file stem unless given.
pub fn run_csv_backtest(
    path: &Path,
    symbol: Option<&str>,
    config: &BacktestConfig,
) -> Result<BacktestResult, RunError> {
    let loaded = load_bars_csv(path)?;
    let symbol = symbol.map(str::to_string).unwrap_or(loaded.symbol);
    run_backtest(&symbol, &loaded.bars, config)
}

/// Run one backtest on pre-loaded bars. No I/O.
pub fn run_backtest(
    symbol: &str,
    bars: &[Bar],
    config: &BacktestConfig,
) -> Result<BacktestResult, RunError> {
    config.validate()?;
    validate_series(bars)?;
    let run_id = config.run_id()?;

    let features = FeatureBuilder::new(config.regime.volatility_window).build(bars)?;
    let stream = regime_stream(symbol, &features, config)?;

    let snapshots = compute_snapshots(bars, &config.indicators);
    let thresholds = config.strategy.thresholds;
    let sim_config = config.simulation_config(stream.gate);
    let votes: Vec<Option<u8>> = bars
        .iter()
        .zip(&snapshots)
        .enumerate()
        .map(|(i, (bar, snapshot))| match try_evaluate(bar.close, snapshot, &thresholds) {
            Ok(met) => Some(met),
            Err(e) => {
                if i >= sim_config.warmup_bars {
                    tracing::debug!(symbol, bar = i, error = %e, "indicator missing, vote counted as 0");
                }
                None
            }
        })
        .collect();

    let signals: Vec<BarSignal> = stream
        .labels
        .iter()
        .zip(&votes)
        .map(|(&regime, &conditions_met)| BarSignal {
            regime,
            conditions_met,
        })
        .collect();

    let result = simulate(bars, &signals, &sim_config)?;
    let summary = PerformanceSummary::compute(&result, bars);

    tracing::info!(
        symbol,
        trades = summary.trade_count,
        total_return_pct = summary.total_return_pct,
        buy_and_hold_pct = summary.buy_and_hold_pct,
        max_drawdown_pct = summary.max_drawdown_pct,
        regime_fallback = stream.fallback_reason.is_some(),
        "backtest complete"
    );

    let regimes = bars
        .iter()
        .zip(&signals)
        .map(|(bar, s)| RegimePoint {
            timestamp: bar.timestamp,
            regime: s.regime,
            conditions_met: s.conditions_met,
        })
        .collect();

    Ok(BacktestResult {
        schema_version: SCHEMA_VERSION,
        run_id,
        symbol: symbol.to_string(),
        dataset_hash: dataset_hash(bars),
        config: *config,
        summary,
        trades: result.trades,
        equity: result.equity,
        regimes,
        model: stream.model,
        regime_fallback: stream.fallback_reason.is_some(),
        fallback_reason: stream.fallback_reason,
        bar_count: bars.len(),
        start_index: result.start_index,
        start_time: bars[result.start_index].timestamp,
        end_time: bars[bars.len() - 1].timestamp,
        missing_indicator_bars: result.missing_indicator_bars,
        open_position: result.open_position,
    })
}

fn regime_stream(
    symbol: &str,
    features: &[Option<FeatureVector>],
    config: &BacktestConfig,
) -> Result<RegimeStream, RunError> {
    let rows: Vec<FeatureVector> = features.iter().flatten().copied().collect();
    let detector = RegimeDetector::new(config.detector_config());

    match detector.train(&rows) {
        Ok(model) => Ok(RegimeStream {
            labels: model.label_series(features, config.regime.inference),
            model: Some(model.diagnostics()),
            gate: RegimeGate::Required,
            fallback_reason: None,
        }),
        Err(e) => fallback_stream(symbol, features, config.regime.on_convergence_failure, e),
    }
}

/// Only a failed fit can fall back; insufficient data is always fatal.
fn fallback_stream(
    symbol: &str,
    features: &[Option<FeatureVector>],
    policy: ConvergenceFallback,
    error: RegimeError,
) -> Result<RegimeStream, RunError> {
    match (policy, error) {
        (ConvergenceFallback::NeutralRegime, RegimeError::Convergence(e)) => {
            tracing::warn!(
                symbol,
                error = %e,
                "regime model failed to fit; using Neutral regime with the gate disabled"
            );
            Ok(RegimeStream {
                labels: features
                    .iter()
                    .map(|f| f.map(|_| RegimeLabel::Neutral))
                    .collect(),
                model: None,
                gate: RegimeGate::Disabled,
                fallback_reason: Some(e.to_string()),
            })
        }
        (_, e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use regimelab_core::hmm::HmmError;

    fn features() -> Vec<Option<FeatureVector>> {
        let row = FeatureVector {
            log_return: 0.001,
            range_pct: 0.01,
            volume_volatility: 100.0,
        };
        vec![None, None, Some(row), Some(row)]
    }

    fn fit_failure() -> RegimeError {
        RegimeError::Convergence(HmmError::NonFiniteLikelihood { iteration: 3 })
    }

    #[test]
    fn neutral_fallback_disables_gate() {
        let stream =
            fallback_stream("TEST", &features(), ConvergenceFallback::NeutralRegime, fit_failure())
                .unwrap();
        assert_eq!(
            stream.labels,
            vec![None, None, Some(RegimeLabel::Neutral), Some(RegimeLabel::Neutral)]
        );
        assert_eq!(stream.gate, RegimeGate::Disabled);
        assert!(stream.model.is_none());
        assert!(stream.fallback_reason.is_some());
    }

    #[test]
    fn abort_policy_propagates_fit_failure() {
        let err = fallback_stream("TEST", &features(), ConvergenceFallback::Abort, fit_failure())
            .err()
            .unwrap();
        assert!(matches!(err, RunError::Regime(RegimeError::Convergence(_))));
    }

    #[test]
    fn insufficient_data_never_falls_back() {
        let err = fallback_stream(
            "TEST",
            &features(),
            ConvergenceFallback::NeutralRegime,
            RegimeError::InsufficientData { needed: 100, got: 2 },
        )
        .err()
        .unwrap();
        assert!(matches!(err, RunError::Regime(RegimeError::InsufficientData { .. })));
    }
}
