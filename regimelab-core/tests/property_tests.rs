//! Property tests for engine invariants.
//!
//! Uses proptest to verify:
//! 1. Cooldown: no entry before `exit_time + cooldown_hours`
//! 2. Single position: trades never overlap and are time-ordered
//! 3. Accounting: equity identity and pnl = size × (exit − entry)
//! 4. Condition vote: count always in 0..=8

use chrono::{Duration, TimeZone, Utc};
use proptest::prelude::*;
use regimelab_core::conditions::{evaluate, ConditionThresholds};
use regimelab_core::domain::{Bar, RegimeLabel};
use regimelab_core::engine::{simulate, BarSignal, SimulationConfig};
use regimelab_core::indicators::IndicatorSnapshot;

// ── Strategies (proptest) ────────────────────────────────────────────

fn arb_regime() -> impl Strategy<Value = RegimeLabel> {
    prop_oneof![
        3 => Just(RegimeLabel::Bull),
        2 => Just(RegimeLabel::Neutral),
        1 => Just(RegimeLabel::Bear),
    ]
}

/// Closes as a bounded random walk, plus per-bar regime and vote.
fn arb_run(max_len: usize) -> impl Strategy<Value = (Vec<Bar>, Vec<BarSignal>)> {
    (5..max_len).prop_flat_map(|n| {
        (
            prop::collection::vec(-0.03..0.03_f64, n),
            prop::collection::vec(arb_regime(), n),
            prop::collection::vec(prop::option::weighted(0.95, 0u8..=8), n),
        )
            .prop_map(|(steps, regimes, votes)| {
                let base = Utc.with_ymd_and_hms(2023, 6, 1, 0, 0, 0).unwrap();
                let mut close = 100.0;
                let bars = steps
                    .iter()
                    .enumerate()
                    .map(|(i, r)| {
                        close *= 1.0 + r;
                        Bar {
                            timestamp: base + Duration::hours(i as i64),
                            open: close,
                            high: close * 1.01,
                            low: close * 0.99,
                            close,
                            volume: 1_000.0,
                        }
                    })
                    .collect();
                let signals = regimes
                    .into_iter()
                    .zip(votes)
                    .map(|(regime, conditions_met)| BarSignal {
                        regime: Some(regime),
                        conditions_met,
                    })
                    .collect();
                (bars, signals)
            })
    })
}

fn arb_config() -> impl Strategy<Value = SimulationConfig> {
    (0u32..72, 1.0..4.0_f64, 0u8..=8).prop_map(|(cooldown_hours, leverage, min_conditions)| {
        SimulationConfig {
            cooldown_hours,
            leverage,
            min_conditions,
            ..SimulationConfig::default()
        }
    })
}

fn arb_indicator() -> impl Strategy<Value = f64> {
    prop_oneof![8 => -200.0..200.0_f64, 1 => Just(f64::NAN)]
}

// ── 1. Cooldown ──────────────────────────────────────────────────────

proptest! {
    #[test]
    fn cooldown_never_violated((bars, signals) in arb_run(150), config in arb_config()) {
        let result = simulate(&bars, &signals, &config).unwrap();
        let cooldown = Duration::hours(i64::from(config.cooldown_hours));

        let mut entries: Vec<_> = result.trades.iter().map(|t| t.entry_time).collect();
        if let Some(pos) = &result.open_position {
            entries.push(pos.entry_time);
        }
        for (trade, next_entry) in result.trades.iter().zip(entries.iter().skip(1)) {
            prop_assert!(*next_entry >= trade.exit_time + cooldown);
        }
    }
}

// ── 2. Single Position ───────────────────────────────────────────────

proptest! {
    #[test]
    fn trades_do_not_overlap((bars, signals) in arb_run(150), config in arb_config()) {
        let result = simulate(&bars, &signals, &config).unwrap();
        for trade in &result.trades {
            prop_assert!(trade.entry_bar < trade.exit_bar);
        }
        for pair in result.trades.windows(2) {
            prop_assert!(pair[0].exit_bar < pair[1].entry_bar);
        }
        if let (Some(last), Some(open)) = (result.trades.last(), &result.open_position) {
            prop_assert!(last.exit_bar < open.entry_bar);
        }
    }

    #[test]
    fn exits_happen_only_in_bear((bars, signals) in arb_run(120), config in arb_config()) {
        let result = simulate(&bars, &signals, &config).unwrap();
        for trade in &result.trades {
            prop_assert_eq!(signals[trade.exit_bar].regime, Some(RegimeLabel::Bear));
            prop_assert_eq!(signals[trade.entry_bar].regime, Some(RegimeLabel::Bull));
        }
    }
}

// ── 3. Accounting ────────────────────────────────────────────────────

proptest! {
    #[test]
    fn equity_identity_and_pnl((bars, signals) in arb_run(120), config in arb_config()) {
        let result = simulate(&bars, &signals, &config).unwrap();
        prop_assert_eq!(result.equity.len(), bars.len() - result.start_index);
        for point in &result.equity {
            prop_assert!((point.total_equity - (point.cash + point.position_value)).abs() < 1e-6);
        }
        let mut realised = 0.0;
        for trade in &result.trades {
            prop_assert!((trade.pnl - trade.size * (trade.exit_price - trade.entry_price)).abs() < 1e-6);
            realised += trade.pnl;
        }
        if result.open_position.is_none() {
            prop_assert!((result.final_equity() - (config.initial_capital + realised)).abs() < 1e-6);
        }
    }
}

// ── 4. Condition Vote ────────────────────────────────────────────────

proptest! {
    #[test]
    fn vote_is_within_bounds(
        close in 1.0..500.0_f64,
        values in prop::collection::vec(arb_indicator(), 10),
    ) {
        let snapshot = IndicatorSnapshot {
            rsi: values[0],
            macd: values[1],
            macd_signal: values[2],
            adx: values[3],
            ema_50: values[4],
            ema_200: values[5],
            momentum_pct: values[6],
            volatility_pct: values[7],
            volume: values[8].abs(),
            volume_sma_20: values[9].abs(),
        };
        let met = evaluate(close, &snapshot, &ConditionThresholds::default());
        prop_assert!(met <= 8);
    }
}
