//! Multi-timeframe trend classification.
//!
//! Direction on one timeframe: bullish when the close and the fast EMA both
//! sit above the slow EMA, bearish in the mirrored case, neutral otherwise.
//! Strength (1–3) comes from the EMA separation normalized by ATR, boosted
//! when the swing structure shows consecutive higher-highs and higher-lows
//! (or the bearish mirror).
//!
//! A signal needs the primary and confirmation timeframes to agree; a
//! disagreement is a `Conflicting` alignment — an explicit negative result,
//! not an error.

use serde::{Deserialize, Serialize};

use crate::domain::{Bar, BarSeries, Pair, Timeframe, TrendDirection};
use crate::error::AnalysisError;
use crate::indicators::{atr, ema_series};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrendConfig {
    pub fast_period: usize,
    pub slow_period: usize,
    /// How many recent swing points feed the structure boost.
    pub swing_lookback: usize,
    /// Bars on each side that a swing extremum must dominate.
    pub swing_window: usize,
    pub atr_period: usize,
    /// EMA separation, in ATR units, that counts as a wide spread.
    pub separation_atr_threshold: f64,
}

impl Default for TrendConfig {
    fn default() -> Self {
        Self {
            fast_period: 50,
            slow_period: 200,
            swing_lookback: 10,
            swing_window: 2,
            atr_period: 14,
            separation_atr_threshold: 1.0,
        }
    }
}

impl TrendConfig {
    /// Minimum bars the analyzer accepts: slow EMA warmup plus the swing
    /// lookback window.
    pub fn min_bars(&self) -> usize {
        self.slow_period + self.swing_lookback
    }
}

/// Per-timeframe trend classification. Recomputed per evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendResult {
    pub pair: Pair,
    pub timeframe: Timeframe,
    pub direction: TrendDirection,
    /// 1 (weak) to 3 (strong).
    pub strength: u8,
    pub fast_ema: f64,
    pub slow_ema: f64,
    pub close: f64,
}

/// Whether the primary and confirmation timeframes tell the same story.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendAlignment {
    Aligned(TrendDirection),
    Conflicting,
}

/// Combined two-timeframe result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MultiTimeframeTrend {
    pub primary: TrendResult,
    pub confirmation: TrendResult,
    pub alignment: TrendAlignment,
}

impl MultiTimeframeTrend {
    /// The agreed direction, when aligned.
    pub fn direction(&self) -> Option<TrendDirection> {
        match self.alignment {
            TrendAlignment::Aligned(d) => Some(d),
            TrendAlignment::Conflicting => None,
        }
    }

    /// Primary-timeframe strength; the confirmation timeframe only gates.
    pub fn strength(&self) -> u8 {
        self.primary.strength
    }
}

#[derive(Debug, Clone)]
pub struct TrendAnalyzer {
    config: TrendConfig,
}

impl TrendAnalyzer {
    pub fn new(config: TrendConfig) -> Self {
        assert!(config.fast_period >= 1, "fast_period must be >= 1");
        assert!(
            config.slow_period > config.fast_period,
            "slow_period must be > fast_period"
        );
        assert!(config.swing_window >= 1, "swing_window must be >= 1");
        Self { config }
    }

    pub fn config(&self) -> &TrendConfig {
        &self.config
    }

    /// Classify one timeframe.
    pub fn analyze(
        &self,
        pair: &Pair,
        timeframe: Timeframe,
        series: &BarSeries,
    ) -> Result<TrendResult, AnalysisError> {
        let needed = self.config.min_bars();
        if series.len() < needed {
            return Err(AnalysisError::InsufficientData {
                needed,
                got: series.len(),
            });
        }

        let closes = series.closes();
        let fast = ema_series(&closes, self.config.fast_period);
        let slow = ema_series(&closes, self.config.slow_period);
        let fast_ema = *fast.last().expect("non-empty by min_bars check");
        let slow_ema = *slow.last().expect("non-empty by min_bars check");
        let close = *closes.last().expect("non-empty by min_bars check");

        let direction = if close > slow_ema && fast_ema > slow_ema {
            TrendDirection::Bullish
        } else if close < slow_ema && fast_ema < slow_ema {
            TrendDirection::Bearish
        } else {
            TrendDirection::Neutral
        };

        let strength = self.strength(series.bars(), direction, fast_ema, slow_ema);

        Ok(TrendResult {
            pair: pair.clone(),
            timeframe,
            direction,
            strength,
            fast_ema,
            slow_ema,
            close,
        })
    }

    /// Combine primary (e.g. H4) and confirmation (e.g. H1) results.
    pub fn align(primary: TrendResult, confirmation: TrendResult) -> MultiTimeframeTrend {
        let alignment = if primary.direction == confirmation.direction {
            TrendAlignment::Aligned(primary.direction)
        } else {
            TrendAlignment::Conflicting
        };
        MultiTimeframeTrend {
            primary,
            confirmation,
            alignment,
        }
    }

    fn strength(
        &self,
        bars: &[Bar],
        direction: TrendDirection,
        fast_ema: f64,
        slow_ema: f64,
    ) -> u8 {
        if direction == TrendDirection::Neutral {
            return 1;
        }

        let mut score: u8 = 1;

        // EMA separation in ATR units: a spread wider than the typical bar
        // move means the averages are not about to recross.
        if let Some(atr_value) = atr(bars, self.config.atr_period) {
            if atr_value > 0.0
                && (fast_ema - slow_ema).abs() / atr_value
                    >= self.config.separation_atr_threshold
            {
                score += 1;
            }
        }

        // Structure boost: consecutive higher-highs and higher-lows for a
        // bullish trend (lower-highs/lower-lows mirrored for bearish).
        let (highs, lows) = swing_points(bars, self.config.swing_window);
        let k = self.config.swing_lookback;
        let rising = |v: &[f64]| trailing_run(v, k, |a, b| b > a);
        let falling = |v: &[f64]| trailing_run(v, k, |a, b| b < a);
        let structure_run = match direction {
            TrendDirection::Bullish => rising(&highs).min(rising(&lows)),
            TrendDirection::Bearish => falling(&highs).min(falling(&lows)),
            TrendDirection::Neutral => 0,
        };
        if structure_run >= 2 {
            score += 1;
        }

        score.min(3)
    }
}

/// Swing highs and lows: a bar whose high (low) is the strict maximum
/// (minimum) of the `window`-bar neighborhood on each side.
fn swing_points(bars: &[Bar], window: usize) -> (Vec<f64>, Vec<f64>) {
    let mut highs = Vec::new();
    let mut lows = Vec::new();
    if bars.len() < 2 * window + 1 {
        return (highs, lows);
    }
    for i in window..bars.len() - window {
        let neighborhood = &bars[i - window..=i + window];
        let h = bars[i].high;
        let l = bars[i].low;
        if neighborhood.iter().all(|b| b.high <= h)
            && neighborhood.iter().filter(|b| b.high == h).count() == 1
        {
            highs.push(h);
        }
        if neighborhood.iter().all(|b| b.low >= l)
            && neighborhood.iter().filter(|b| b.low == l).count() == 1
        {
            lows.push(l);
        }
    }
    (highs, lows)
}

/// Length of the run of consecutive steps satisfying `step` at the end of
/// the last `k` values. `[1, 2, 3]` with `b > a` has a run of 2.
fn trailing_run(values: &[f64], k: usize, step: impl Fn(f64, f64) -> bool) -> usize {
    let tail = &values[values.len().saturating_sub(k)..];
    let mut run = 0;
    for pair in tail.windows(2).rev() {
        if step(pair[0], pair[1]) {
            run += 1;
        } else {
            break;
        }
    }
    run
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn series_from_closes(closes: &[f64]) -> BarSeries {
        let base = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
        BarSeries::from_bars(closes.iter().enumerate().map(|(i, &c)| {
            Bar::new(
                base + Duration::hours(4 * i as i64),
                c,
                c + 0.0005,
                c - 0.0005,
                c,
                1_000.0,
            )
        }))
        .unwrap()
    }

    fn small_config() -> TrendConfig {
        TrendConfig {
            fast_period: 5,
            slow_period: 20,
            swing_lookback: 5,
            swing_window: 2,
            atr_period: 14,
            separation_atr_threshold: 1.0,
        }
    }

    fn pair() -> Pair {
        Pair::new("GBP/USD")
    }

    #[test]
    fn insufficient_bars_rejected() {
        let analyzer = TrendAnalyzer::new(small_config());
        let series = series_from_closes(&[1.27; 10]);
        let err = analyzer.analyze(&pair(), Timeframe::H4, &series).unwrap_err();
        assert!(matches!(err, AnalysisError::InsufficientData { needed: 25, got: 10 }));
    }

    #[test]
    fn steady_rise_is_bullish() {
        let closes: Vec<f64> = (0..60).map(|i| 1.25 + i as f64 * 0.002).collect();
        let analyzer = TrendAnalyzer::new(small_config());
        let result = analyzer.analyze(&pair(), Timeframe::H4, &series_from_closes(&closes)).unwrap();
        assert_eq!(result.direction, TrendDirection::Bullish);
        assert!(result.fast_ema > result.slow_ema);
    }

    #[test]
    fn steady_fall_is_bearish() {
        let closes: Vec<f64> = (0..60).map(|i| 1.40 - i as f64 * 0.002).collect();
        let analyzer = TrendAnalyzer::new(small_config());
        let result = analyzer.analyze(&pair(), Timeframe::H4, &series_from_closes(&closes)).unwrap();
        assert_eq!(result.direction, TrendDirection::Bearish);
    }

    #[test]
    fn flat_series_is_neutral_strength_one() {
        let closes = vec![1.27; 60];
        let analyzer = TrendAnalyzer::new(small_config());
        let result = analyzer.analyze(&pair(), Timeframe::H4, &series_from_closes(&closes)).unwrap();
        assert_eq!(result.direction, TrendDirection::Neutral);
        assert_eq!(result.strength, 1);
    }

    #[test]
    fn strong_trend_scores_above_weak() {
        let analyzer = TrendAnalyzer::new(small_config());
        // Persistent steep rise: wide EMA spread and stacked swing structure.
        let steep: Vec<f64> = (0..80).map(|i| 1.20 + i as f64 * 0.004).collect();
        let strong = analyzer
            .analyze(&pair(), Timeframe::H4, &series_from_closes(&steep))
            .unwrap();
        assert_eq!(strong.direction, TrendDirection::Bullish);
        assert!(strong.strength >= 2);
    }

    #[test]
    fn alignment_requires_matching_directions() {
        let analyzer = TrendAnalyzer::new(small_config());
        let up: Vec<f64> = (0..60).map(|i| 1.25 + i as f64 * 0.002).collect();
        let down: Vec<f64> = (0..60).map(|i| 1.40 - i as f64 * 0.002).collect();

        let h4 = analyzer.analyze(&pair(), Timeframe::H4, &series_from_closes(&up)).unwrap();
        let h1_up = analyzer.analyze(&pair(), Timeframe::H1, &series_from_closes(&up)).unwrap();
        let h1_down = analyzer.analyze(&pair(), Timeframe::H1, &series_from_closes(&down)).unwrap();

        let aligned = TrendAnalyzer::align(h4.clone(), h1_up);
        assert_eq!(aligned.direction(), Some(TrendDirection::Bullish));

        let conflicting = TrendAnalyzer::align(h4, h1_down);
        assert_eq!(conflicting.alignment, TrendAlignment::Conflicting);
        assert_eq!(conflicting.direction(), None);
    }

    #[test]
    fn trailing_run_counts_from_the_end() {
        assert_eq!(trailing_run(&[1.0, 2.0, 3.0], 3, |a, b| b > a), 2);
        assert_eq!(trailing_run(&[3.0, 1.0, 2.0], 3, |a, b| b > a), 1);
        assert_eq!(trailing_run(&[3.0, 2.0, 1.0], 3, |a, b| b > a), 0);
        assert_eq!(trailing_run(&[], 3, |a, b| b > a), 0);
    }
}
