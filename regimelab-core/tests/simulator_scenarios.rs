//! Scenario tests for the simulator: hand-built regime and condition
//! streams over short price series.

use chrono::{Duration, TimeZone, Utc};
use regimelab_core::domain::{Bar, ExitReason, RegimeLabel};
use regimelab_core::engine::{simulate, BarSignal, SimulationConfig, SimulationSession};

use RegimeLabel::{Bear, Bull, Neutral};

// ─── Helpers ───

fn hourly_bars(closes: &[f64]) -> Vec<Bar> {
    let base = Utc.with_ymd_and_hms(2024, 2, 5, 14, 0, 0).unwrap();
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| Bar {
            timestamp: base + Duration::hours(i as i64),
            open: close,
            high: close + 0.5,
            low: close - 0.5,
            close,
            volume: 10_000.0,
        })
        .collect()
}

fn stream(regimes: &[RegimeLabel], conditions: &[u8]) -> Vec<BarSignal> {
    regimes
        .iter()
        .zip(conditions)
        .map(|(&regime, &met)| BarSignal {
            regime: Some(regime),
            conditions_met: Some(met),
        })
        .collect()
}

// ─── Entry then regime-flip exit ───

#[test]
fn five_bar_entry_and_bear_exit() {
    let bars = hourly_bars(&[100.0, 101.0, 99.0, 98.0, 97.0]);
    let signals = stream(&[Bull, Bull, Neutral, Bear, Bear], &[8; 5]);
    let config = SimulationConfig::default();

    let result = simulate(&bars, &signals, &config).unwrap();

    assert_eq!(result.trades.len(), 1);
    let trade = &result.trades[0];
    assert_eq!(trade.entry_bar, 1);
    assert_eq!(trade.exit_bar, 3);
    assert_eq!(trade.entry_price, 101.0);
    assert_eq!(trade.exit_price, 98.0);
    assert_eq!(trade.exit_reason, ExitReason::RegimeFlip);
    assert_eq!(trade.regime_at_exit, Bear);

    let size = 2000.0 * 2.5 / 101.0;
    assert!((trade.size - size).abs() < 1e-9);
    assert!((trade.pnl - size * -3.0).abs() < 1e-9);
    assert!(result.open_position.is_none());
    assert!((result.final_equity() - (2000.0 + trade.pnl)).abs() < 1e-9);
}

// ─── Vote never reaches the threshold ───

#[test]
fn no_trades_when_vote_stays_below_threshold() {
    let closes: Vec<f64> = (0..50).map(|i| 100.0 + (i as f64 * 0.3).sin() * 4.0).collect();
    let bars = hourly_bars(&closes);
    let regimes: Vec<RegimeLabel> = (0..50).map(|i| [Bull, Neutral, Bear][i % 3]).collect();
    let conditions: Vec<u8> = (0..50).map(|i| (i % 7) as u8).collect();

    let result = simulate(&bars, &stream(&regimes, &conditions), &SimulationConfig::default()).unwrap();

    assert!(result.trades.is_empty());
    assert!(result.open_position.is_none());
    assert_eq!(result.equity.len(), 49);
    for point in &result.equity {
        assert_eq!(point.total_equity, 2000.0);
        assert_eq!(point.cash, 2000.0);
    }
}

// ─── Cooldown after exit ───

#[test]
fn cooldown_blocks_reentry_for_48_hours() {
    // Enter at bar 1, exit at bar 2 (time T), then Bull + 8 every bar.
    let n = 60;
    let bars = hourly_bars(&vec![100.0; n]);
    let mut regimes = vec![Bull; n];
    regimes[2] = Bear;
    let signals = stream(&regimes, &vec![8; n]);

    let result = simulate(&bars, &signals, &SimulationConfig::default()).unwrap();

    let exit_time = bars[2].timestamp;
    assert_eq!(result.trades.len(), 1);
    assert_eq!(result.trades[0].exit_time, exit_time);

    let reentry = result.open_position.expect("re-entry after cooldown");
    assert_eq!(reentry.entry_time, exit_time + Duration::hours(48));
    assert_eq!(reentry.entry_bar, 50);
}

#[test]
fn zero_cooldown_allows_next_bar_reentry() {
    let bars = hourly_bars(&[100.0; 6]);
    let signals = stream(&[Bull, Bull, Bear, Bull, Bull, Bull], &[8; 6]);
    let config = SimulationConfig {
        cooldown_hours: 0,
        ..SimulationConfig::default()
    };
    let result = simulate(&bars, &signals, &config).unwrap();
    assert_eq!(result.open_position.map(|p| p.entry_bar), Some(3));
}

// ─── End of run ───

#[test]
fn open_position_is_marked_not_closed() {
    let bars = hourly_bars(&[100.0, 100.0, 104.0]);
    let signals = stream(&[Bull, Bull, Bull], &[8; 3]);
    let result = simulate(&bars, &signals, &SimulationConfig::default()).unwrap();
    assert!(result.trades.is_empty());
    let last = result.equity.last().unwrap();
    assert!((last.position_value - 50.0 * 104.0).abs() < 1e-9);
    assert!((last.total_equity - 2200.0).abs() < 1e-9);
}

// ─── Streaming equivalence ───

#[test]
fn session_matches_batch() {
    let closes: Vec<f64> = (0..120).map(|i| 50.0 + i as f64 * 0.1 + (i as f64 * 0.7).sin()).collect();
    let bars = hourly_bars(&closes);
    let regimes: Vec<RegimeLabel> = (0..120)
        .map(|i| match (i / 9) % 4 {
            0 | 1 => Bull,
            2 => Neutral,
            _ => Bear,
        })
        .collect();
    let conditions: Vec<u8> = (0..120).map(|i| [8, 7, 5, 8, 6][i % 5]).collect();
    let signals = stream(&regimes, &conditions);
    let config = SimulationConfig {
        cooldown_hours: 5,
        ..SimulationConfig::default()
    };

    let batch = simulate(&bars, &signals, &config).unwrap();

    let mut session = SimulationSession::new(config, 1).unwrap();
    for (bar, signal) in bars[1..].iter().zip(&signals[1..]) {
        let point = session.step(bar, signal).unwrap();
        assert_eq!(session.equity().last(), Some(&point));
    }
    let streamed = session.finish();

    assert!(!batch.trades.is_empty());
    assert_eq!(batch, streamed);
}

#[test]
fn simulation_is_deterministic() {
    let closes: Vec<f64> = (0..80).map(|i| 100.0 + (i as f64 * 0.2).cos() * 6.0).collect();
    let bars = hourly_bars(&closes);
    let regimes: Vec<RegimeLabel> = (0..80).map(|i| [Bull, Bull, Neutral, Bear][(i / 5) % 4]).collect();
    let signals = stream(&regimes, &vec![7; 80]);
    let config = SimulationConfig::default();
    assert_eq!(
        simulate(&bars, &signals, &config).unwrap(),
        simulate(&bars, &signals, &config).unwrap()
    );
}
