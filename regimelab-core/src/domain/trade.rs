//! Trade: a completed round trip emitted when a position closes.

use super::regime::RegimeLabel;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Why a position was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExitReason {
    /// The regime flipped to Bear.
    RegimeFlip,
    /// Closed at the last bar because the caller requested liquidation.
    EndOfRun,
}

/// A complete long round trip: entry → exit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    // ── Entry ──
    pub entry_bar: usize,
    pub entry_time: DateTime<Utc>,
    pub entry_price: f64,
    pub conditions_at_entry: u8,

    // ── Exit ──
    pub exit_bar: usize,
    pub exit_time: DateTime<Utc>,
    pub exit_price: f64,
    pub exit_reason: ExitReason,
    pub regime_at_exit: RegimeLabel,

    // ── Size / PnL ──
    /// Units held; already scaled by leverage at entry.
    pub size: f64,
    pub pnl: f64,
}

impl Trade {
    /// Price return of the underlying over the holding period, in percent.
    ///
    /// This is the unlevered move; `pnl` carries the leverage through `size`.
    pub fn return_pct(&self) -> f64 {
        if self.entry_price == 0.0 {
            return 0.0;
        }
        (self.exit_price - self.entry_price) / self.entry_price * 100.0
    }

    pub fn is_winner(&self) -> bool {
        self.pnl > 0.0
    }

    pub fn duration_hours(&self) -> f64 {
        (self.exit_time - self.entry_time).num_seconds() as f64 / 3600.0
    }
}
