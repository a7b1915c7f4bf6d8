//! Average True Range with Wilder smoothing.
//!
//! True Range: max(high-low, |high-prev_close|, |low-prev_close|).
//! ATR is the Wilder-smoothed TR (alpha = 1/period), seeded with the mean
//! of the first `period` proper TR values. Needs `period + 1` bars because
//! TR[0] has no previous close and is excluded from the seed.

use crate::domain::Bar;

/// True Range series. TR[0] is plain high-low (no previous close).
pub fn true_range(bars: &[Bar]) -> Vec<f64> {
    let mut tr = Vec::with_capacity(bars.len());
    for (i, bar) in bars.iter().enumerate() {
        let value = if i == 0 {
            bar.range()
        } else {
            let pc = bars[i - 1].close;
            bar.range()
                .max((bar.high - pc).abs())
                .max((bar.low - pc).abs())
        };
        tr.push(value);
    }
    tr
}

/// Latest ATR value over `period`, or `None` with fewer than `period + 1` bars.
pub fn atr(bars: &[Bar], period: usize) -> Option<f64> {
    assert!(period >= 1, "ATR period must be >= 1");

    if bars.len() < period + 1 {
        return None;
    }

    let tr = true_range(bars);
    // Skip TR[0]: without a previous close it is not a proper true range.
    let proper = &tr[1..];

    let seed: f64 = proper[..period].iter().sum::<f64>() / period as f64;
    let alpha = 1.0 / period as f64;

    let mut value = seed;
    for &t in &proper[period..] {
        value = alpha * t + (1.0 - alpha) * value;
    }
    Some(value)
}
