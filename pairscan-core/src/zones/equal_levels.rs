//! Equal highs / equal lows — clustered swing extrema.
//!
//! Multiple swing highs at roughly one level mean stop orders resting just
//! above it (mirrored for lows). A cluster qualifies as a zone with at
//! least `min_touches` touches; its strength is the touch count.

use chrono::{DateTime, Utc};

use crate::domain::Bar;

use super::{LiquidityZone, ZoneConfig, ZoneKind};

#[derive(Debug, Clone, Copy)]
struct Swing {
    price: f64,
    timestamp: DateTime<Utc>,
}

/// Detect equal-high and equal-low zones in the window.
pub fn detect(bars: &[Bar], config: &ZoneConfig) -> Vec<LiquidityZone> {
    let (swing_highs, swing_lows) = swing_extrema(bars, config.swing_window);

    let mut zones = cluster(&swing_highs, ZoneKind::EqualHigh, config);
    zones.extend(cluster(&swing_lows, ZoneKind::EqualLow, config));
    zones
}

/// Swing extrema: a bar whose high (low) is the unique maximum (minimum)
/// of the surrounding `window`-bar neighborhood.
fn swing_extrema(bars: &[Bar], window: usize) -> (Vec<Swing>, Vec<Swing>) {
    let mut highs = Vec::new();
    let mut lows = Vec::new();
    if bars.len() < 2 * window + 1 {
        return (highs, lows);
    }
    for i in window..bars.len() - window {
        let neighborhood = &bars[i - window..=i + window];
        let bar = &bars[i];
        if neighborhood.iter().all(|b| b.high <= bar.high)
            && neighborhood.iter().filter(|b| b.high == bar.high).count() == 1
        {
            highs.push(Swing {
                price: bar.high,
                timestamp: bar.timestamp,
            });
        }
        if neighborhood.iter().all(|b| b.low >= bar.low)
            && neighborhood.iter().filter(|b| b.low == bar.low).count() == 1
        {
            lows.push(Swing {
                price: bar.low,
                timestamp: bar.timestamp,
            });
        }
    }
    (highs, lows)
}

/// Greedy clustering: each unconsumed extremum seeds a cluster of every
/// extremum within `tolerance_pct` of it. Consuming members as they join
/// prevents overlapping duplicate zones.
fn cluster(swings: &[Swing], kind: ZoneKind, config: &ZoneConfig) -> Vec<LiquidityZone> {
    let mut zones = Vec::new();
    let mut consumed = vec![false; swings.len()];

    for i in 0..swings.len() {
        if consumed[i] {
            continue;
        }
        let seed = swings[i];
        let mut members: Vec<Swing> = Vec::new();
        for (j, other) in swings.iter().enumerate() {
            if consumed[j] && j != i {
                continue;
            }
            if (other.price - seed.price).abs() / seed.price <= config.tolerance_pct {
                members.push(*other);
            }
        }
        if members.len() as u32 >= config.min_touches {
            for (j, other) in swings.iter().enumerate() {
                if members
                    .iter()
                    .any(|m| m.price == other.price && m.timestamp == other.timestamp)
                {
                    consumed[j] = true;
                }
            }
            let price_low = members.iter().map(|m| m.price).fold(f64::INFINITY, f64::min);
            let price_high = members
                .iter()
                .map(|m| m.price)
                .fold(f64::NEG_INFINITY, f64::max);
            let first_seen = members.iter().map(|m| m.timestamp).min().expect("non-empty");
            let last_seen = members.iter().map(|m| m.timestamp).max().expect("non-empty");
            zones.push(LiquidityZone {
                kind,
                price_low,
                price_high,
                touch_count: members.len() as u32,
                first_seen,
                last_seen,
                open: true,
            });
        }
    }

    zones
}
