//! Regime labels attached to bars after prediction.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Market regime label derived from an HMM state id.
///
/// The Bear label is the Bear/Crash regime: the state with the lowest mean
/// log return. It is the only exit trigger for an open position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RegimeLabel {
    Bull,
    Bear,
    Neutral,
}

impl RegimeLabel {
    pub fn is_bull(self) -> bool {
        self == RegimeLabel::Bull
    }

    /// True for the regime that forces an open position closed.
    pub fn is_exit_regime(self) -> bool {
        self == RegimeLabel::Bear
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RegimeLabel::Bull => "Bull",
            RegimeLabel::Bear => "Bear",
            RegimeLabel::Neutral => "Neutral",
        }
    }
}

impl fmt::Display for RegimeLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
