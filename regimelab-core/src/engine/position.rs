//! Position state machine.
//!
//! ```text
//! Closed --[entry allowed ∧ now >= cooldown_until]--> Open
//! Open   --[regime == Bear]-----------------------> Closed(cooldown_until = now + cooldown)
//! ```
//!
//! Any other input leaves the state unchanged. Output is produced only on
//! the two transitions: an entry event or a completed [`Trade`].

use crate::domain::{ExitReason, RegimeLabel, Trade};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Whether entries require a Bull regime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegimeGate {
    #[default]
    Required,
    /// Entries rely on the condition vote alone.
    Disabled,
}

/// Static transition parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransitionRules {
    pub min_conditions: u8,
    pub leverage: f64,
    pub cooldown: Duration,
    pub regime_gate: RegimeGate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenPosition {
    pub entry_bar: usize,
    pub entry_time: DateTime<Utc>,
    pub entry_price: f64,
    /// Units held, fixed until exit.
    pub size: f64,
    pub conditions_at_entry: u8,
}

impl OpenPosition {
    pub fn market_value(&self, price: f64) -> f64 {
        self.size * price
    }

    pub fn unrealized_pnl(&self, price: f64) -> f64 {
        self.size * (price - self.entry_price)
    }

    /// Close at `price` and produce the trade record.
    pub fn close(
        self,
        exit_bar: usize,
        exit_time: DateTime<Utc>,
        price: f64,
        reason: ExitReason,
        regime_at_exit: RegimeLabel,
    ) -> Trade {
        Trade {
            entry_bar: self.entry_bar,
            entry_time: self.entry_time,
            entry_price: self.entry_price,
            conditions_at_entry: self.conditions_at_entry,
            exit_bar,
            exit_time,
            exit_price: price,
            exit_reason: reason,
            regime_at_exit,
            size: self.size,
            pnl: self.unrealized_pnl(price),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PositionState {
    Closed {
        cooldown_until: Option<DateTime<Utc>>,
    },
    Open(OpenPosition),
}

impl Default for PositionState {
    fn default() -> Self {
        PositionState::Closed {
            cooldown_until: None,
        }
    }
}

/// What the machine sees at one bar.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepInput {
    pub bar_index: usize,
    pub timestamp: DateTime<Utc>,
    pub close: f64,
    pub regime: Option<RegimeLabel>,
    pub conditions_met: u8,
    pub cash: f64,
}

/// Output of a step.
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    Hold,
    Entered(OpenPosition),
    Exited(Trade),
}

impl PositionState {
    pub fn is_open(&self) -> bool {
        matches!(self, PositionState::Open(_))
    }

    pub fn open_position(&self) -> Option<&OpenPosition> {
        match self {
            PositionState::Open(pos) => Some(pos),
            PositionState::Closed { .. } => None,
        }
    }

    /// True while `now` is inside the post-exit blackout.
    pub fn in_cooldown(&self, now: DateTime<Utc>) -> bool {
        matches!(self, PositionState::Closed { cooldown_until: Some(until) } if now < *until)
    }

    /// Apply one bar. Consumes the current state and returns the next one.
    pub fn step(self, input: &StepInput, rules: &TransitionRules) -> (PositionState, Transition) {
        match self {
            PositionState::Open(pos) => {
                if input.regime.is_some_and(RegimeLabel::is_exit_regime) {
                    let trade = pos.close(
                        input.bar_index,
                        input.timestamp,
                        input.close,
                        ExitReason::RegimeFlip,
                        RegimeLabel::Bear,
                    );
                    let next = PositionState::Closed {
                        cooldown_until: Some(input.timestamp + rules.cooldown),
                    };
                    (next, Transition::Exited(trade))
                } else {
                    (PositionState::Open(pos), Transition::Hold)
                }
            }
            PositionState::Closed { cooldown_until } => {
                let state = PositionState::Closed { cooldown_until };
                if !entry_signal(input, rules) || state.in_cooldown(input.timestamp) {
                    return (state, Transition::Hold);
                }
                if input.cash <= 0.0 {
                    tracing::warn!(
                        bar = input.bar_index,
                        cash = input.cash,
                        "entry refused: no positive cash to size from"
                    );
                    return (state, Transition::Hold);
                }
                let pos = OpenPosition {
                    entry_bar: input.bar_index,
                    entry_time: input.timestamp,
                    entry_price: input.close,
                    size: input.cash * rules.leverage / input.close,
                    conditions_at_entry: input.conditions_met,
                };
                (PositionState::Open(pos.clone()), Transition::Entered(pos))
            }
        }
    }
}

fn entry_signal(input: &StepInput, rules: &TransitionRules) -> bool {
    let regime_ok = match rules.regime_gate {
        RegimeGate::Required => input.regime.is_some_and(RegimeLabel::is_bull),
        RegimeGate::Disabled => true,
    };
    regime_ok && input.conditions_met >= rules.min_conditions
}
