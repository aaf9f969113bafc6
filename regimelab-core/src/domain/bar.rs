//! Bar: the fundamental market data unit.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// OHLCV bar for a single instrument over one interval (hourly by default).
///
/// Bars are immutable once loaded. A series handed to the engine must have
/// strictly increasing timestamps; see [`validate_series`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Bar {
    /// True when every OHLCV field is a finite number.
    pub fn is_finite(&self) -> bool {
        [self.open, self.high, self.low, self.close, self.volume]
            .iter()
            .all(|v| v.is_finite())
    }

    /// A bar the feature builder can use: finite, positive prices, open and
    /// close inside `[low, high]`, and non-negative volume.
    ///
    /// `range_pct` and the log return both assume this; an inverted range
    /// would turn into a negative volatility feature.
    pub fn is_sane(&self) -> bool {
        self.is_finite()
            && self.low > 0.0
            && self.low <= self.high
            && (self.low..=self.high).contains(&self.open)
            && (self.low..=self.high).contains(&self.close)
            && self.volume >= 0.0
    }
}

/// Errors describing an unusable bar series.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BarError {
    #[error("bar series is empty")]
    Empty,

    #[error("timestamp at bar {index} ({timestamp}) is not after the previous bar")]
    NonMonotonic {
        index: usize,
        timestamp: DateTime<Utc>,
    },

    #[error("bar {index} has a non-positive or non-finite close")]
    InvalidClose { index: usize },
}

/// Check the ordering and price invariants every engine entry point relies on.
///
/// Timestamps must be strictly increasing (which also rules out duplicates)
/// and every close must be a positive finite number, since log returns and
/// position sizing divide by it.
pub fn validate_series(bars: &[Bar]) -> Result<(), BarError> {
    if bars.is_empty() {
        return Err(BarError::Empty);
    }
    for (index, bar) in bars.iter().enumerate() {
        if !bar.close.is_finite() || bar.close <= 0.0 {
            return Err(BarError::InvalidClose { index });
        }
        if index > 0 && bar.timestamp <= bars[index - 1].timestamp {
            return Err(BarError::NonMonotonic {
                index,
                timestamp: bar.timestamp,
            });
        }
    }
    Ok(())
}
