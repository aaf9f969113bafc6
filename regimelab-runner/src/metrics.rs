//! Performance summary: pure functions over the equity curve and ledger.
//!
//! All percentages are in percent (`12.5` means 12.5%).

use regimelab_core::domain::{Bar, Trade};
use regimelab_core::engine::SimulationResult;
use serde::{Deserialize, Serialize};

/// Aggregate statistics for one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceSummary {
    pub initial_capital: f64,
    pub final_equity: f64,
    pub total_return_pct: f64,
    /// Buy-and-hold over the simulated window (first to last close).
    pub buy_and_hold_pct: f64,
    pub alpha_pct: f64,
    /// `None` when there were no trades.
    pub win_rate_pct: Option<f64>,
    /// In [-100, 0].
    pub max_drawdown_pct: f64,
    pub trade_count: usize,
    pub winners: usize,
    pub losers: usize,
    pub avg_trade_duration_hours: Option<f64>,
    pub missing_indicator_bars: usize,
    pub bars_simulated: usize,
}

impl PerformanceSummary {
    /// `bars` is the full series passed to the simulator.
    pub fn compute(result: &SimulationResult, bars: &[Bar]) -> Self {
        let window = bars.get(result.start_index..).unwrap_or(&[]);
        let equity: Vec<f64> = result.equity.iter().map(|p| p.total_equity).collect();
        let final_equity = result.final_equity();

        let total = total_return_pct(result.initial_capital, final_equity);
        let buy_hold = match (window.first(), window.last()) {
            (Some(first), Some(last)) => buy_and_hold_pct(first.close, last.close),
            _ => 0.0,
        };
        let winners = result.trades.iter().filter(|t| t.is_winner()).count();

        Self {
            initial_capital: result.initial_capital,
            final_equity,
            total_return_pct: total,
            buy_and_hold_pct: buy_hold,
            alpha_pct: total - buy_hold,
            win_rate_pct: win_rate_pct(&result.trades),
            max_drawdown_pct: max_drawdown_pct(result.initial_capital, &equity),
            trade_count: result.trades.len(),
            winners,
            losers: result.trades.len() - winners,
            avg_trade_duration_hours: avg_duration_hours(&result.trades),
            missing_indicator_bars: result.missing_indicator_bars.len(),
            bars_simulated: result.equity.len(),
        }
    }
}

// ─── Individual metric functions ────────────────────────────────────

pub fn total_return_pct(initial: f64, final_equity: f64) -> f64 {
    if initial <= 0.0 {
        return 0.0;
    }
    (final_equity - initial) / initial * 100.0
}

pub fn buy_and_hold_pct(first_close: f64, last_close: f64) -> f64 {
    if first_close <= 0.0 {
        return 0.0;
    }
    (last_close - first_close) / first_close * 100.0
}

/// Percentage of trades with positive pnl, `None` without trades.
pub fn win_rate_pct(trades: &[Trade]) -> Option<f64> {
    if trades.is_empty() {
        return None;
    }
    let winners = trades.iter().filter(|t| t.is_winner()).count();
    Some(winners as f64 / trades.len() as f64 * 100.0)
}

/// Largest peak-to-trough decline, as a negative percentage.
///
/// The running peak starts at the initial capital. Equity at or below zero
/// is a total loss and counts as -100%.
pub fn max_drawdown_pct(initial_capital: f64, equity_curve: &[f64]) -> f64 {
    let mut peak = initial_capital;
    let mut max_dd = 0.0_f64;

    for &eq in equity_curve {
        if eq > peak {
            peak = eq;
        }
        let dd = if eq <= 0.0 {
            -100.0
        } else if peak > 0.0 {
            (eq - peak) / peak * 100.0
        } else {
            0.0
        };
        max_dd = max_dd.min(dd);
    }
    max_dd.clamp(-100.0, 0.0)
}

pub fn avg_duration_hours(trades: &[Trade]) -> Option<f64> {
    if trades.is_empty() {
        return None;
    }
    Some(trades.iter().map(Trade::duration_hours).sum::<f64>() / trades.len() as f64)
}
