//! Trailing-stop policies for the final third of a position.
//!
//! All modes share the ratchet invariant: a candidate stop is only applied
//! when it tightens (moves in the favorable direction); it never loosens.
//! Candidates are recomputed once per completed bar, never on raw ticks.

use serde::{Deserialize, Serialize};

use crate::domain::{Bar, Direction};
use crate::indicators::atr;

/// How far behind the favorable extreme the trailing stop sits.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrailMode {
    /// Trail at a multiple of the position's R unit (stop distance).
    RMultiple(f64),
    /// Trail at a fixed distance in pips.
    FixedPips(f64),
    /// Trail at a multiple of the ATR over the retained bar window.
    AtrMultiple { multiplier: f64, period: usize },
}

impl Default for TrailMode {
    fn default() -> Self {
        TrailMode::RMultiple(1.0)
    }
}

impl TrailMode {
    /// The stop a fresh recomputation would place, given the favorable
    /// extreme `peak` since entry. Monotonicity is the caller's job.
    ///
    /// `AtrMultiple` needs `period + 1` retained bars; until then it falls
    /// back to one R behind the peak.
    pub(super) fn candidate(
        &self,
        direction: Direction,
        peak: f64,
        r_unit: f64,
        pip_size: f64,
        bars: &[Bar],
    ) -> f64 {
        let distance = match *self {
            TrailMode::RMultiple(m) => m * r_unit,
            TrailMode::FixedPips(pips) => pips * pip_size,
            TrailMode::AtrMultiple { multiplier, period } => match atr(bars, period) {
                Some(a) => multiplier * a,
                None => r_unit,
            },
        };
        peak - direction.sign() * distance
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn flat_bars(n: usize, range: f64) -> Vec<Bar> {
        let t0 = Utc.with_ymd_and_hms(2024, 3, 4, 0, 0, 0).unwrap();
        (0..n)
            .map(|i| Bar {
                timestamp: t0 + Duration::minutes(15 * i as i64),
                open: 1.2700,
                high: 1.2700 + range / 2.0,
                low: 1.2700 - range / 2.0,
                close: 1.2700,
                volume: 100.0,
            })
            .collect()
    }

    #[test]
    fn r_multiple_sits_one_unit_behind_peak() {
        let mode = TrailMode::RMultiple(1.0);
        let stop = mode.candidate(Direction::Long, 1.2800, 0.0050, 0.0001, &[]);
        assert!((stop - 1.2750).abs() < 1e-9);
        let stop = mode.candidate(Direction::Short, 1.2600, 0.0050, 0.0001, &[]);
        assert!((stop - 1.2650).abs() < 1e-9);
    }

    #[test]
    fn fixed_pips_uses_pip_size() {
        let mode = TrailMode::FixedPips(30.0);
        let stop = mode.candidate(Direction::Long, 1.2800, 0.0050, 0.0001, &[]);
        assert!((stop - 1.2770).abs() < 1e-9);
    }

    #[test]
    fn atr_mode_tracks_volatility() {
        let mode = TrailMode::AtrMultiple {
            multiplier: 2.0,
            period: 14,
        };
        let bars = flat_bars(20, 0.0020);
        let stop = mode.candidate(Direction::Long, 1.2800, 0.0050, 0.0001, &bars);
        // ATR = 0.0020, distance = 0.0040
        assert!((stop - 1.2760).abs() < 1e-9);
    }

    #[test]
    fn atr_mode_falls_back_to_one_r_without_enough_bars() {
        let mode = TrailMode::AtrMultiple {
            multiplier: 2.0,
            period: 14,
        };
        let bars = flat_bars(5, 0.0020);
        let stop = mode.candidate(Direction::Long, 1.2800, 0.0050, 0.0001, &bars);
        assert!((stop - 1.2750).abs() < 1e-9);
    }
}
