//! True range and Wilder smoothing, shared by ADX.

use crate::domain::Bar;

/// True range per bar: max(high - low, |high - prev_close|, |low - prev_close|).
///
/// The first bar has no previous close and uses high - low.
pub fn true_range(bars: &[Bar]) -> Vec<f64> {
    let mut tr = Vec::with_capacity(bars.len());
    for (i, bar) in bars.iter().enumerate() {
        let hl = bar.high - bar.low;
        let value = match i.checked_sub(1).map(|p| bars[p].close) {
            None => hl,
            Some(pc) => hl.max((bar.high - pc).abs()).max((bar.low - pc).abs()),
        };
        tr.push(value);
    }
    tr
}

/// Wilder smoothing (alpha = 1/period), seeded with the mean of the first
/// run of `period` consecutive non-NaN values. A `NaN` after the seed ends
/// the output.
pub fn wilder_smooth(values: &[f64], period: usize) -> Vec<f64> {
    let n = values.len();
    let mut result = vec![f64::NAN; n];
    if period == 0 || n < period {
        return result;
    }

    let mut run = 0;
    let mut seed_end = None;
    for (i, v) in values.iter().enumerate() {
        if v.is_nan() {
            run = 0;
            continue;
        }
        run += 1;
        if run == period {
            seed_end = Some(i + 1);
            break;
        }
    }
    let Some(seed_end) = seed_end else {
        return result;
    };

    let seed = values[seed_end - period..seed_end].iter().sum::<f64>() / period as f64;
    result[seed_end - 1] = seed;

    let alpha = 1.0 / period as f64;
    let mut prev = seed;
    for i in seed_end..n {
        if values[i].is_nan() {
            return result;
        }
        prev = alpha * values[i] + (1.0 - alpha) * prev;
        result[i] = prev;
    }

    result
}
