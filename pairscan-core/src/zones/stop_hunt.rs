//! Stop hunts — liquidity sweeps beyond an equal-level boundary.
//!
//! A wick pierces beyond an existing equal-high/low zone by at least the
//! configured margin, then within K bars a close lands back inside the
//! zone. The naive breakout read is reversed: a sweep below equal lows is
//! demand (longs stepped in), a sweep above equal highs is supply.

use chrono::{DateTime, Utc};

use crate::domain::{Bar, Direction};

use super::{LiquidityZone, ZoneConfig, ZoneKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SweepSide {
    AboveHighs,
    BelowLows,
}

/// Detect stop-hunt zones against the already-detected equal-level zones.
pub fn detect(
    bars: &[Bar],
    equal_zones: &[LiquidityZone],
    config: &ZoneConfig,
) -> Vec<LiquidityZone> {
    let mut zones = Vec::new();

    for zone in equal_zones {
        let (side, boundary) = match zone.kind {
            ZoneKind::EqualHigh => (SweepSide::AboveHighs, zone.price_high),
            ZoneKind::EqualLow => (SweepSide::BelowLows, zone.price_low),
            _ => continue,
        };

        if let Some(sweep) = find_sweep(bars, side, boundary, config) {
            let (kind, price_low, price_high) = match side {
                SweepSide::AboveHighs => (
                    ZoneKind::StopHunt {
                        bias: Direction::Short,
                    },
                    boundary,
                    sweep.extreme,
                ),
                SweepSide::BelowLows => (
                    ZoneKind::StopHunt {
                        bias: Direction::Long,
                    },
                    sweep.extreme,
                    boundary,
                ),
            };
            zones.push(LiquidityZone {
                kind,
                price_low,
                price_high,
                touch_count: 1,
                first_seen: sweep.pierce_at,
                last_seen: sweep.confirmed_at,
                open: true,
            });
        }
    }

    zones
}

struct Sweep {
    /// Furthest wick price reached between pierce and confirmation.
    extreme: f64,
    pierce_at: DateTime<Utc>,
    confirmed_at: DateTime<Utc>,
}

/// Find the most recent pierce beyond `boundary` (by the configured margin)
/// confirmed by a close back inside within `stop_hunt_confirm_bars` bars.
/// The pierce bar itself may confirm — a long wick closing back inside.
fn find_sweep(
    bars: &[Bar],
    side: SweepSide,
    boundary: f64,
    config: &ZoneConfig,
) -> Option<Sweep> {
    let pierce_level = match side {
        SweepSide::AboveHighs => boundary * (1.0 + config.stop_hunt_margin_pct),
        SweepSide::BelowLows => boundary * (1.0 - config.stop_hunt_margin_pct),
    };
    let pierced = |bar: &Bar| match side {
        SweepSide::AboveHighs => bar.high >= pierce_level,
        SweepSide::BelowLows => bar.low <= pierce_level,
    };
    let back_inside = |bar: &Bar| match side {
        SweepSide::AboveHighs => bar.close <= boundary,
        SweepSide::BelowLows => bar.close >= boundary,
    };

    let mut found: Option<Sweep> = None;

    for (i, bar) in bars.iter().enumerate() {
        if !pierced(bar) {
            continue;
        }
        let window_end = (i + config.stop_hunt_confirm_bars + 1).min(bars.len());
        if let Some(offset) = bars[i..window_end].iter().position(back_inside) {
            let stretch = &bars[i..=i + offset];
            let extreme = match side {
                SweepSide::AboveHighs => {
                    stretch.iter().map(|b| b.high).fold(f64::NEG_INFINITY, f64::max)
                }
                SweepSide::BelowLows => stretch.iter().map(|b| b.low).fold(f64::INFINITY, f64::min),
            };
            found = Some(Sweep {
                extreme,
                pierce_at: bar.timestamp,
                confirmed_at: bars[i + offset].timestamp,
            });
        }
    }

    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::zones::test_support::{make_bars, quiet};

    fn equal_high_zone(low: f64, high: f64) -> LiquidityZone {
        LiquidityZone {
            kind: ZoneKind::EqualHigh,
            price_low: low,
            price_high: high,
            touch_count: 2,
            first_seen: DateTime::<Utc>::MIN_UTC,
            last_seen: DateTime::<Utc>::MIN_UTC,
            open: true,
        }
    }

    fn equal_low_zone(low: f64, high: f64) -> LiquidityZone {
        LiquidityZone {
            kind: ZoneKind::EqualLow,
            ..equal_high_zone(low, high)
        }
    }

    #[test]
    fn sweep_above_equal_highs_is_short_biased() {
        // Spike through 1.2750 to 1.2768, close back below within 2 bars.
        let bars = make_bars(&[
            quiet(1.2730),
            (1.2730, 1.2768, 1.2728, 1.2760), // pierce, closes above
            (1.2760, 1.2762, 1.2735, 1.2740), // back inside
            quiet(1.2738),
        ]);
        let zones = detect(&bars, &[equal_high_zone(1.2748, 1.2750)], &ZoneConfig::default());

        assert_eq!(zones.len(), 1);
        let hunt = &zones[0];
        assert_eq!(
            hunt.kind,
            ZoneKind::StopHunt {
                bias: Direction::Short
            }
        );
        assert!((hunt.price_low - 1.2750).abs() < 1e-9);
        assert!((hunt.price_high - 1.2768).abs() < 1e-9);
        assert_eq!(hunt.first_seen, bars[1].timestamp);
        assert_eq!(hunt.last_seen, bars[2].timestamp);
    }

    #[test]
    fn sweep_below_equal_lows_is_long_biased() {
        let bars = make_bars(&[
            quiet(1.2700),
            (1.2700, 1.2702, 1.2668, 1.2672), // pierce below 1.2690
            (1.2672, 1.2701, 1.2670, 1.2698), // close back above the boundary
            quiet(1.2700),
        ]);
        let zones = detect(&bars, &[equal_low_zone(1.2690, 1.2692)], &ZoneConfig::default());

        assert_eq!(zones.len(), 1);
        let hunt = &zones[0];
        assert_eq!(
            hunt.kind,
            ZoneKind::StopHunt {
                bias: Direction::Long
            }
        );
        assert!((hunt.price_low - 1.2668).abs() < 1e-9);
        assert!((hunt.price_high - 1.2690).abs() < 1e-9);
    }

    #[test]
    fn wick_that_closes_back_inside_confirms_itself() {
        let bars = make_bars(&[
            quiet(1.2730),
            (1.2730, 1.2768, 1.2728, 1.2742), // pierce and rejection in one bar
            quiet(1.2740),
        ]);
        let zones = detect(&bars, &[equal_high_zone(1.2748, 1.2750)], &ZoneConfig::default());
        assert_eq!(zones.len(), 1);
        assert_eq!(zones[0].first_seen, zones[0].last_seen);
    }

    #[test]
    fn unconfirmed_pierce_is_not_a_hunt() {
        // Breaks above and keeps closing above: a real breakout, not a sweep.
        let bars = make_bars(&[
            quiet(1.2730),
            (1.2730, 1.2768, 1.2728, 1.2765),
            (1.2765, 1.2780, 1.2760, 1.2775),
            (1.2775, 1.2790, 1.2770, 1.2785),
            (1.2785, 1.2800, 1.2780, 1.2795),
            (1.2795, 1.2810, 1.2790, 1.2805),
        ]);
        let zones = detect(&bars, &[equal_high_zone(1.2748, 1.2750)], &ZoneConfig::default());
        assert!(zones.is_empty());
    }

    #[test]
    fn confirmation_outside_window_is_ignored() {
        let config = ZoneConfig {
            stop_hunt_confirm_bars: 1,
            ..ZoneConfig::default()
        };
        // Close back inside arrives 3 bars after the pierce: outside K = 1.
        // The interim bars hold above the boundary without re-piercing.
        let bars = make_bars(&[
            quiet(1.2730),
            (1.2730, 1.2768, 1.2728, 1.2760),
            (1.2751, 1.2752, 1.2749, 1.2751),
            (1.2751, 1.2752, 1.2748, 1.2751),
            (1.2751, 1.2752, 1.2735, 1.2740),
        ]);
        let zones = detect(&bars, &[equal_high_zone(1.2748, 1.2750)], &config);
        assert!(zones.is_empty());
    }
}
