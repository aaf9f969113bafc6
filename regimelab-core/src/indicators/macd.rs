//! MACD: difference of a fast and a slow EMA, plus its EMA signal line.
//!
//! line[t] = EMA_fast[t] - EMA_slow[t]; signal = EMA(line, signal_period).
//! Exposed as one `Macd` instance per band.

use super::ema::ema_of_series;
use super::Indicator;
use crate::domain::Bar;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MacdBand {
    Line,
    Signal,
}

#[derive(Debug, Clone)]
pub struct Macd {
    fast: usize,
    slow: usize,
    signal: usize,
    band: MacdBand,
    name: String,
}

impl Macd {
    pub fn new(fast: usize, slow: usize, signal: usize, band: MacdBand) -> Self {
        assert!(fast >= 1 && slow >= 1 && signal >= 1, "MACD periods must be >= 1");
        let suffix = match band {
            MacdBand::Line => "line",
            MacdBand::Signal => "signal",
        };
        Self {
            fast,
            slow,
            signal,
            band,
            name: format!("macd_{fast}_{slow}_{signal}_{suffix}"),
        }
    }

    fn line(&self, bars: &[Bar]) -> Vec<f64> {
        let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
        let fast = ema_of_series(&closes, self.fast);
        let slow = ema_of_series(&closes, self.slow);
        fast.iter().zip(&slow).map(|(f, s)| f - s).collect()
    }
}

impl Indicator for Macd {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        let line = self.fast.max(self.slow) - 1;
        match self.band {
            MacdBand::Line => line,
            MacdBand::Signal => line + self.signal - 1,
        }
    }

    fn compute(&self, bars: &[Bar]) -> Vec<f64> {
        let line = self.line(bars);
        match self.band {
            MacdBand::Line => line,
            MacdBand::Signal => ema_of_series(&line, self.signal),
        }
    }
}
