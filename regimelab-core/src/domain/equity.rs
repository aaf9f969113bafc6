use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Portfolio snapshot at the close of one simulated bar.
///
/// `cash` goes negative while a leveraged position is open (the borrowed
/// notional); `total_equity = cash + position_value` always holds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EquityPoint {
    pub timestamp: DateTime<Utc>,
    pub cash: f64,
    pub position_value: f64,
    pub total_equity: f64,
}

impl EquityPoint {
    pub fn new(timestamp: DateTime<Utc>, cash: f64, position_value: f64) -> Self {
        Self {
            timestamp,
            cash,
            position_value,
            total_equity: cash + position_value,
        }
    }
}
