//! Fair value gaps — 3-bar price imbalances.
//!
//! Bullish: bar1.high < bar3.low leaves a gap [bar1.high, bar3.low] that
//! the middle bar's momentum never let trade. Bearish mirrors it. A gap
//! stays `open` until a later bar's range fully covers it; it is then
//! invalidated but retained for audit.

use crate::domain::{Bar, Direction};

use super::{LiquidityZone, ZoneConfig, ZoneKind};

/// Detect fair value gaps across every consecutive bar triple.
pub fn detect(bars: &[Bar], config: &ZoneConfig) -> Vec<LiquidityZone> {
    let mut zones = Vec::new();

    for i in 2..bars.len() {
        let bar1 = &bars[i - 2];
        let bar3 = &bars[i];

        if bar1.high < bar3.low {
            let gap_pct = (bar3.low - bar1.high) / bar1.high;
            if gap_pct >= config.fvg_min_gap_pct {
                zones.push(make_gap(
                    Direction::Long,
                    bar1.high,
                    bar3.low,
                    bars,
                    i,
                ));
            }
        } else if bar1.low > bar3.high {
            let gap_pct = (bar1.low - bar3.high) / bar3.high;
            if gap_pct >= config.fvg_min_gap_pct {
                zones.push(make_gap(
                    Direction::Short,
                    bar3.high,
                    bar1.low,
                    bars,
                    i,
                ));
            }
        }
    }

    zones
}

fn make_gap(
    bias: Direction,
    price_low: f64,
    price_high: f64,
    bars: &[Bar],
    formed_at: usize,
) -> LiquidityZone {
    // A later bar whose range fully covers the gap fills it.
    let fill = bars[formed_at + 1..]
        .iter()
        .find(|b| b.covers(price_low, price_high));

    LiquidityZone {
        kind: ZoneKind::FairValueGap { bias },
        price_low,
        price_high,
        touch_count: 0,
        first_seen: bars[formed_at].timestamp,
        last_seen: fill
            .map(|b| b.timestamp)
            .unwrap_or(bars[formed_at].timestamp),
        open: fill.is_none(),
    }
}
