//! Liquidity zone detection — institutional-interest price areas.
//!
//! Three detectors share a bar window and a fraction-of-price tolerance:
//! - equal highs/lows (clustered swing extrema, ≥2 touches)
//! - stop hunts (wick pierce beyond an equal-level boundary, close back inside)
//! - fair value gaps (3-bar imbalances, open until fully traversed)
//!
//! Output is a [`ZoneSet`]: every detected zone annotated with its distance
//! from the latest close. Only open zones inside the proximity threshold are
//! `actionable` — that is the gate the signal synthesizer checks.

pub mod equal_levels;
pub mod fvg;
pub mod stop_hunt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{BarSeries, Direction};
use crate::error::AnalysisError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ZoneConfig {
    /// Bars of history the detectors look at (default: last 100 M15 bars).
    pub lookback: usize,
    /// Price tolerance for clustering equal levels, as a fraction of price.
    pub tolerance_pct: f64,
    /// Minimum touches for an equal-level cluster to qualify as a zone.
    pub min_touches: u32,
    /// Bars on each side a swing extremum must dominate.
    pub swing_window: usize,
    /// How far beyond a zone boundary a wick must pierce, fraction of price.
    pub stop_hunt_margin_pct: f64,
    /// Bars allowed between the pierce and the close back inside.
    pub stop_hunt_confirm_bars: usize,
    /// Minimum gap size for a fair value gap, fraction of price.
    pub fvg_min_gap_pct: f64,
    /// Distance from the latest close within which a zone is actionable.
    pub proximity_pct: f64,
    /// Zones untouched for this many completed bars are closed (stale).
    /// Must be below `lookback` to have any effect.
    pub staleness_bars: usize,
}

impl Default for ZoneConfig {
    fn default() -> Self {
        Self {
            lookback: 100,
            tolerance_pct: 0.0015,
            min_touches: 2,
            swing_window: 2,
            stop_hunt_margin_pct: 0.0002,
            stop_hunt_confirm_bars: 3,
            fvg_min_gap_pct: 0.0005,
            proximity_pct: 0.003,
            staleness_bars: 80,
        }
    }
}

impl ZoneConfig {
    /// Minimum bars any detector can work with.
    pub fn min_bars(&self) -> usize {
        (2 * self.swing_window + 1).max(3)
    }
}

/// What kind of liquidity a zone represents.
///
/// Equal highs are supply (sell-side liquidity above price), equal lows are
/// demand. Stop hunts and fair value gaps carry their own directional bias:
/// a sweep below equal lows reverses the naive breakdown read into a long.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZoneKind {
    EqualHigh,
    EqualLow,
    StopHunt { bias: Direction },
    FairValueGap { bias: Direction },
}

impl ZoneKind {
    /// The trade direction this zone supports, ignoring price location.
    pub fn bias(&self) -> Direction {
        match self {
            ZoneKind::EqualHigh => Direction::Short,
            ZoneKind::EqualLow => Direction::Long,
            ZoneKind::StopHunt { bias } => *bias,
            ZoneKind::FairValueGap { bias } => *bias,
        }
    }
}

/// A detected liquidity zone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiquidityZone {
    pub kind: ZoneKind,
    pub price_low: f64,
    pub price_high: f64,
    pub touch_count: u32,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    /// False once invalidated (gap traversed or staleness window elapsed).
    /// Invalidated zones are retained for audit.
    pub open: bool,
}

impl LiquidityZone {
    pub fn mid(&self) -> f64 {
        (self.price_low + self.price_high) / 2.0
    }

    pub fn contains(&self, price: f64) -> bool {
        price >= self.price_low && price <= self.price_high
    }

    /// Fractional distance from `price` to the zone (0 when inside).
    pub fn distance_pct(&self, price: f64) -> f64 {
        if self.contains(price) {
            return 0.0;
        }
        let to_edge = if price < self.price_low {
            self.price_low - price
        } else {
            price - self.price_high
        };
        to_edge / price
    }

    /// The direction implied by trading off this zone at the given price:
    /// buying a demand-side zone at or below price, selling a supply-side
    /// zone at or above price. `None` when price is on the wrong side.
    pub fn implied_direction(&self, price: f64) -> Option<Direction> {
        match self.kind.bias() {
            Direction::Long if price >= self.price_low => Some(Direction::Long),
            Direction::Short if price <= self.price_high => Some(Direction::Short),
            _ => None,
        }
    }

    /// The price level whose breach invalidates a trade off this zone:
    /// below the zone for longs, above it for shorts.
    pub fn invalidation_boundary(&self, direction: Direction) -> f64 {
        match direction {
            Direction::Long => self.price_low,
            Direction::Short => self.price_high,
        }
    }
}

/// A zone annotated with its distance from the latest close.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotatedZone {
    pub zone: LiquidityZone,
    pub distance_pct: f64,
}

/// All zones detected in one evaluation, anchored to the latest close.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoneSet {
    pub zones: Vec<LiquidityZone>,
    pub latest_close: f64,
    pub latest_timestamp: DateTime<Utc>,
}

impl ZoneSet {
    /// Every zone with its distance from the latest close, nearest first.
    pub fn annotated(&self) -> Vec<AnnotatedZone> {
        let mut out: Vec<AnnotatedZone> = self
            .zones
            .iter()
            .map(|z| AnnotatedZone {
                distance_pct: z.distance_pct(self.latest_close),
                zone: z.clone(),
            })
            .collect();
        out.sort_by(|a, b| a.distance_pct.total_cmp(&b.distance_pct));
        out
    }

    /// Open zones within `proximity_pct` of the latest close, nearest first.
    pub fn actionable(&self, proximity_pct: f64) -> Vec<AnnotatedZone> {
        self.annotated()
            .into_iter()
            .filter(|a| a.zone.open && a.distance_pct <= proximity_pct)
            .collect()
    }

    pub fn open_zones(&self) -> impl Iterator<Item = &LiquidityZone> {
        self.zones.iter().filter(|z| z.open)
    }
}

#[derive(Debug, Clone)]
pub struct LiquidityZoneDetector {
    config: ZoneConfig,
}

impl LiquidityZoneDetector {
    pub fn new(config: ZoneConfig) -> Self {
        assert!(config.tolerance_pct > 0.0, "tolerance_pct must be > 0");
        assert!(config.min_touches >= 2, "min_touches must be >= 2");
        assert!(config.swing_window >= 1, "swing_window must be >= 1");
        Self { config }
    }

    pub fn config(&self) -> &ZoneConfig {
        &self.config
    }

    /// Run all three detectors over the trailing lookback window.
    pub fn detect(&self, series: &BarSeries) -> Result<ZoneSet, AnalysisError> {
        let needed = self.config.min_bars();
        if series.len() < needed {
            return Err(AnalysisError::InsufficientData {
                needed,
                got: series.len(),
            });
        }

        let window = series.tail(self.config.lookback);
        let latest = window.last().expect("window non-empty by min_bars check");

        let equal = equal_levels::detect(window, &self.config);
        let hunts = stop_hunt::detect(window, &equal, &self.config);
        let gaps = fvg::detect(window, &self.config);

        let mut zones = equal;
        zones.extend(hunts);
        zones.extend(gaps);

        // Staleness: a zone untouched for the configured number of
        // completed bars is no longer a live magnet for price.
        for zone in &mut zones {
            let touched = window.partition_point(|b| b.timestamp <= zone.last_seen);
            if window.len() - touched > self.config.staleness_bars {
                zone.open = false;
            }
        }

        tracing::debug!(
            total = zones.len(),
            open = zones.iter().filter(|z| z.open).count(),
            close = latest.close,
            "zone detection complete"
        );

        Ok(ZoneSet {
            zones,
            latest_close: latest.close,
            latest_timestamp: latest.timestamp,
        })
    }
}
