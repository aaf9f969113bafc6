//! Bar-by-bar backtest simulation.
//!
//! Per bar:
//! 1. Resolve the regime label and condition count (missing → 0, recorded)
//! 2. Step the position state machine; apply entry/exit cash flows
//! 3. Mark to market and append an equity point
//!
//! [`SimulationSession`] is the streaming form; [`simulate`] drives a session
//! over a whole series and yields the same ledger and equity curve.

use super::position::{OpenPosition, PositionState, RegimeGate, StepInput, Transition, TransitionRules};
use crate::domain::{validate_series, Bar, BarError, EquityPoint, ExitReason, RegimeLabel, Trade};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SimulationError {
    #[error("invalid bar series: {0}")]
    Bars(#[from] BarError),

    #[error("signal stream has {signals} entries but there are {bars} bars")]
    LengthMismatch { bars: usize, signals: usize },

    #[error("invalid simulation config: {0}")]
    InvalidConfig(String),

    #[error("no tradable bar: every bar is inside warm-up or lacks a regime")]
    NoTradableBars,

    #[error("bar at {timestamp} is not after the previous simulated bar")]
    OutOfOrder { timestamp: DateTime<Utc> },
}

/// Simulation parameters. Immutable for the length of a run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SimulationConfig {
    pub initial_capital: f64,
    pub leverage: f64,
    pub cooldown_hours: u32,
    pub min_conditions: u8,
    /// Close any open position at the last bar instead of only marking it.
    pub liquidate_at_end: bool,
    pub regime_gate: RegimeGate,
    /// Bars before this index are indicator warm-up and never traded.
    pub warmup_bars: usize,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            initial_capital: 2000.0,
            leverage: 2.5,
            cooldown_hours: 48,
            min_conditions: 7,
            liquidate_at_end: false,
            regime_gate: RegimeGate::Required,
            warmup_bars: 0,
        }
    }
}

impl SimulationConfig {
    pub fn validate(&self) -> Result<(), SimulationError> {
        if !(self.initial_capital.is_finite() && self.initial_capital > 0.0) {
            return Err(SimulationError::InvalidConfig(format!(
                "initial_capital must be positive, got {}",
                self.initial_capital
            )));
        }
        if !(self.leverage.is_finite() && self.leverage >= 1.0) {
            return Err(SimulationError::InvalidConfig(format!(
                "leverage must be >= 1, got {}",
                self.leverage
            )));
        }
        if self.min_conditions > crate::conditions::CONDITION_COUNT {
            return Err(SimulationError::InvalidConfig(format!(
                "min_conditions must be <= {}, got {}",
                crate::conditions::CONDITION_COUNT,
                self.min_conditions
            )));
        }
        Ok(())
    }

    fn rules(&self) -> TransitionRules {
        TransitionRules {
            min_conditions: self.min_conditions,
            leverage: self.leverage,
            cooldown: Duration::hours(i64::from(self.cooldown_hours)),
            regime_gate: self.regime_gate,
        }
    }
}

/// Per-bar inputs besides prices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BarSignal {
    pub regime: Option<RegimeLabel>,
    /// `None` when an indicator input was missing at this bar.
    pub conditions_met: Option<u8>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimulationResult {
    pub trades: Vec<Trade>,
    pub equity: Vec<EquityPoint>,
    /// Bars whose condition vote was missing and counted as 0.
    pub missing_indicator_bars: Vec<usize>,
    pub start_index: usize,
    /// Position still held after the last bar (never set when liquidating).
    pub open_position: Option<OpenPosition>,
    pub initial_capital: f64,
}

impl SimulationResult {
    pub fn final_equity(&self) -> f64 {
        self.equity
            .last()
            .map(|p| p.total_equity)
            .unwrap_or(self.initial_capital)
    }
}

/// First bar index the loop may trade: never bar 0, never inside
/// indicator warm-up, never before the first labelled bar.
pub fn simulation_start(signals: &[BarSignal], warmup_bars: usize) -> Option<usize> {
    let first_labelled = signals.iter().position(|s| s.regime.is_some())?;
    let start = first_labelled.max(warmup_bars).max(1);
    (start < signals.len()).then_some(start)
}

/// Streaming simulator. Feed bars in order with [`SimulationSession::step`];
/// call [`SimulationSession::finish`] to collect the result. A session can be
/// dropped between bars without side effects.
#[derive(Debug, Clone)]
pub struct SimulationSession {
    config: SimulationConfig,
    rules: TransitionRules,
    state: PositionState,
    cash: f64,
    next_index: usize,
    start_index: usize,
    last: Option<(DateTime<Utc>, f64, Option<RegimeLabel>)>,
    trades: Vec<Trade>,
    equity: Vec<EquityPoint>,
    missing: Vec<usize>,
}

impl SimulationSession {
    /// Start a session whose first stepped bar has index `first_index`.
    pub fn new(config: SimulationConfig, first_index: usize) -> Result<Self, SimulationError> {
        config.validate()?;
        Ok(Self {
            rules: config.rules(),
            cash: config.initial_capital,
            config,
            state: PositionState::default(),
            next_index: first_index,
            start_index: first_index,
            last: None,
            trades: Vec::new(),
            equity: Vec::new(),
            missing: Vec::new(),
        })
    }

    pub fn state(&self) -> &PositionState {
        &self.state
    }

    pub fn cash(&self) -> f64 {
        self.cash
    }

    pub fn trades(&self) -> &[Trade] {
        &self.trades
    }

    pub fn equity(&self) -> &[EquityPoint] {
        &self.equity
    }

    /// Process one bar and return its equity point.
    pub fn step(&mut self, bar: &Bar, signal: &BarSignal) -> Result<EquityPoint, SimulationError> {
        if let Some((prev, _, _)) = self.last {
            if bar.timestamp <= prev {
                return Err(SimulationError::OutOfOrder {
                    timestamp: bar.timestamp,
                });
            }
        }
        let bar_index = self.next_index;

        // ─── Inputs ───
        let conditions_met = match signal.conditions_met {
            Some(n) => n,
            None => {
                tracing::debug!(bar = bar_index, "indicator missing; condition count treated as 0");
                self.missing.push(bar_index);
                0
            }
        };
        let input = StepInput {
            bar_index,
            timestamp: bar.timestamp,
            close: bar.close,
            regime: signal.regime,
            conditions_met,
            cash: self.cash,
        };

        // ─── Transition ───
        let state = std::mem::take(&mut self.state);
        let (next, transition) = state.step(&input, &self.rules);
        self.state = next;
        match transition {
            Transition::Hold => {}
            Transition::Entered(pos) => {
                self.cash -= pos.market_value(pos.entry_price);
                tracing::debug!(
                    bar = bar_index,
                    price = pos.entry_price,
                    size = pos.size,
                    conditions = pos.conditions_at_entry,
                    "entry"
                );
            }
            Transition::Exited(trade) => {
                self.cash += trade.size * trade.exit_price;
                tracing::debug!(bar = bar_index, price = trade.exit_price, pnl = trade.pnl, "exit");
                self.trades.push(trade);
            }
        }

        // ─── Mark to market ───
        let position_value = self
            .state
            .open_position()
            .map_or(0.0, |pos| pos.market_value(bar.close));
        let point = EquityPoint::new(bar.timestamp, self.cash, position_value);
        self.equity.push(point.clone());

        self.last = Some((bar.timestamp, bar.close, signal.regime));
        self.next_index += 1;
        Ok(point)
    }

    /// End the run. An open position stays open (marked to market in the
    /// last equity point) unless `liquidate_at_end` is set.
    pub fn finish(mut self) -> SimulationResult {
        let mut open_position = None;
        if let PositionState::Open(pos) = std::mem::take(&mut self.state) {
            match self.last {
                Some((timestamp, close, regime)) if self.config.liquidate_at_end => {
                    let trade = pos.close(
                        self.next_index - 1,
                        timestamp,
                        close,
                        ExitReason::EndOfRun,
                        regime.unwrap_or(RegimeLabel::Neutral),
                    );
                    self.cash += trade.size * trade.exit_price;
                    if let Some(point) = self.equity.last_mut() {
                        *point = EquityPoint::new(timestamp, self.cash, 0.0);
                    }
                    self.trades.push(trade);
                }
                _ => open_position = Some(pos),
            }
        }

        SimulationResult {
            trades: self.trades,
            equity: self.equity,
            missing_indicator_bars: self.missing,
            start_index: self.start_index,
            open_position,
            initial_capital: self.config.initial_capital,
        }
    }
}

/// Run the whole series. Inputs are validated before the first bar.
pub fn simulate(
    bars: &[Bar],
    signals: &[BarSignal],
    config: &SimulationConfig,
) -> Result<SimulationResult, SimulationError> {
    validate_series(bars)?;
    if signals.len() != bars.len() {
        return Err(SimulationError::LengthMismatch {
            bars: bars.len(),
            signals: signals.len(),
        });
    }
    let start = simulation_start(signals, config.warmup_bars).ok_or(SimulationError::NoTradableBars)?;

    let mut session = SimulationSession::new(*config, start)?;
    for (bar, signal) in bars[start..].iter().zip(&signals[start..]) {
        session.step(bar, signal)?;
    }
    let result = session.finish();

    tracing::debug!(
        start,
        bars = bars.len() - start,
        trades = result.trades.len(),
        final_equity = result.final_equity(),
        "simulation finished"
    );
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::make_bars;

    fn signals(regimes: &[RegimeLabel], met: u8) -> Vec<BarSignal> {
        regimes
            .iter()
            .map(|&r| BarSignal {
                regime: Some(r),
                conditions_met: Some(met),
            })
            .collect()
    }

    #[test]
    fn equity_identity_holds_every_bar() {
        use RegimeLabel::*;
        let bars = make_bars(&[100.0, 101.0, 103.0, 99.0, 98.0, 102.0]);
        let sig = signals(&[Bull, Bull, Bull, Neutral, Bear, Bull], 8);
        let result = simulate(&bars, &sig, &SimulationConfig::default()).unwrap();
        assert_eq!(result.equity.len(), 5);
        for p in &result.equity {
            assert!((p.total_equity - (p.cash + p.position_value)).abs() < 1e-9);
        }
    }

    #[test]
    fn leveraged_cash_goes_negative_while_open() {
        use RegimeLabel::*;
        let bars = make_bars(&[100.0, 100.0, 110.0]);
        let sig = signals(&[Bull, Bull, Neutral], 8);
        let result = simulate(&bars, &sig, &SimulationConfig::default()).unwrap();
        // size = 2000 * 2.5 / 100 = 50; cash = 2000 - 5000
        assert!((result.equity[0].cash + 3000.0).abs() < 1e-9);
        assert!((result.final_equity() - 2500.0).abs() < 1e-9);
        assert!(result.open_position.is_some());
        assert!(result.trades.is_empty());
    }

    #[test]
    fn liquidation_at_end_closes_position() {
        use RegimeLabel::*;
        let bars = make_bars(&[100.0, 100.0, 110.0]);
        let sig = signals(&[Bull, Bull, Neutral], 8);
        let config = SimulationConfig {
            liquidate_at_end: true,
            ..SimulationConfig::default()
        };
        let result = simulate(&bars, &sig, &config).unwrap();
        assert_eq!(result.trades.len(), 1);
        let trade = &result.trades[0];
        assert_eq!(trade.exit_reason, ExitReason::EndOfRun);
        assert_eq!(trade.exit_bar, 2);
        assert!((trade.pnl - 500.0).abs() < 1e-9);
        let last = result.equity.last().unwrap();
        assert!((last.cash - 2500.0).abs() < 1e-9);
        assert_eq!(last.position_value, 0.0);
        assert!(result.open_position.is_none());
    }

    #[test]
    fn missing_conditions_are_recorded_and_count_as_zero() {
        use RegimeLabel::*;
        let bars = make_bars(&[100.0, 101.0, 102.0]);
        let mut sig = signals(&[Bull, Bull, Bull], 8);
        sig[1].conditions_met = None;
        let result = simulate(&bars, &sig, &SimulationConfig::default()).unwrap();
        assert_eq!(result.missing_indicator_bars, vec![1]);
        assert_eq!(result.open_position.as_ref().map(|p| p.entry_bar), Some(2));
    }

    #[test]
    fn start_respects_warmup_and_labels() {
        let mut sig = vec![BarSignal::default(); 10];
        for s in sig.iter_mut().skip(3) {
            s.regime = Some(RegimeLabel::Neutral);
        }
        assert_eq!(simulation_start(&sig, 0), Some(3));
        assert_eq!(simulation_start(&sig, 6), Some(6));
        assert_eq!(simulation_start(&sig, 10), None);
        assert_eq!(simulation_start(&[BarSignal::default(); 4], 0), None);
    }

    #[test]
    fn bar_zero_is_never_traded() {
        let bars = make_bars(&[100.0, 101.0]);
        let sig = signals(&[RegimeLabel::Bull, RegimeLabel::Bull], 8);
        let result = simulate(&bars, &sig, &SimulationConfig::default()).unwrap();
        assert_eq!(result.start_index, 1);
        assert_eq!(result.open_position.map(|p| p.entry_bar), Some(1));
    }

    #[test]
    fn rejects_mismatched_streams() {
        let bars = make_bars(&[100.0, 101.0, 102.0]);
        let sig = signals(&[RegimeLabel::Bull], 8);
        assert_eq!(
            simulate(&bars, &sig, &SimulationConfig::default()).unwrap_err(),
            SimulationError::LengthMismatch { bars: 3, signals: 1 }
        );
    }

    #[test]
    fn rejects_unordered_bars() {
        let mut bars = make_bars(&[100.0, 101.0, 102.0]);
        bars.swap(1, 2);
        let sig = signals(&[RegimeLabel::Bull; 3], 8);
        assert!(matches!(
            simulate(&bars, &sig, &SimulationConfig::default()),
            Err(SimulationError::Bars(BarError::NonMonotonic { .. }))
        ));
    }

    #[test]
    fn session_rejects_repeated_timestamp() {
        let bars = make_bars(&[100.0, 101.0]);
        let mut session = SimulationSession::new(SimulationConfig::default(), 1).unwrap();
        session.step(&bars[1], &BarSignal::default()).unwrap();
        assert!(matches!(
            session.step(&bars[1], &BarSignal::default()),
            Err(SimulationError::OutOfOrder { .. })
        ));
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = SimulationConfig {
            leverage: 0.5,
            ..SimulationConfig::default()
        };
        assert!(matches!(
            SimulationSession::new(config, 1),
            Err(SimulationError::InvalidConfig(_))
        ));
    }
}
