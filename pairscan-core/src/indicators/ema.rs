//! Exponential Moving Average.
//!
//! Recursive: EMA[t] = alpha * x[t] + (1 - alpha) * EMA[t-1], alpha = 2/(period+1).
//! Seed: EMA[period-1] = SMA of the first `period` values.
//! Values before the seed are NaN (warmup).

/// Compute the EMA series of `values`.
///
/// Returns a vector of the same length; indices before `period - 1` are NaN.
/// A series shorter than `period` is all NaN.
pub fn ema_series(values: &[f64], period: usize) -> Vec<f64> {
    assert!(period >= 1, "EMA period must be >= 1");

    let n = values.len();
    let mut out = vec![f64::NAN; n];
    if n < period {
        return out;
    }

    let alpha = 2.0 / (period as f64 + 1.0);

    let seed: f64 = values[..period].iter().sum::<f64>() / period as f64;
    out[period - 1] = seed;

    let mut prev = seed;
    for i in period..n {
        let ema = alpha * values[i] + (1.0 - alpha) * prev;
        out[i] = ema;
        prev = ema;
    }

    out
}
