//! Indicators used by the decision pipeline: EMA and ATR.
//!
//! Bars are validated at series ingestion, so indicator inputs are NaN-free
//! by contract. Short input is the only failure mode and is reported as
//! `None` / leading NaN warmup values.

pub mod atr;
pub mod ema;

pub use atr::{atr, true_range};
pub use ema::ema_series;

#[cfg(test)]
pub(crate) fn assert_approx(actual: f64, expected: f64, epsilon: f64) {
    assert!(
        (actual - expected).abs() <= epsilon,
        "expected {expected}, got {actual} (epsilon {epsilon})"
    );
}

#[cfg(test)]
pub(crate) const DEFAULT_EPSILON: f64 = 1e-9;
