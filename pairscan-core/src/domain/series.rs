//! BarSeries — ordered, unique-per-timestamp bar container.
//!
//! Ingestion is the only place malformed market data can enter the engine,
//! so it is also the only place it is rejected: out-of-order bars, duplicate
//! timestamps, and insane OHLC never make it into a series. Everything
//! downstream (trend, zones, the monitor) can assume chronological order.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::bar::Bar;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SeriesError {
    #[error("bar at {incoming} is not after the last bar at {last}")]
    OutOfOrder {
        last: DateTime<Utc>,
        incoming: DateTime<Utc>,
    },

    #[error("duplicate bar timestamp {0}")]
    Duplicate(DateTime<Utc>),

    #[error("bar at {0} fails OHLC sanity check")]
    Insane(DateTime<Utc>),
}

/// Chronologically ordered bars for one (pair, timeframe) slot.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BarSeries {
    bars: Vec<Bar>,
}

impl BarSeries {
    pub fn new() -> Self {
        Self { bars: Vec::new() }
    }

    /// Build a series from bars, validating order and sanity along the way.
    pub fn from_bars(bars: impl IntoIterator<Item = Bar>) -> Result<Self, SeriesError> {
        let mut series = Self::new();
        for bar in bars {
            series.push(bar)?;
        }
        Ok(series)
    }

    /// Append a bar. Rejects duplicates, out-of-order timestamps, and
    /// insane OHLC — rejected bars are never applied.
    pub fn push(&mut self, bar: Bar) -> Result<(), SeriesError> {
        if !bar.is_sane() {
            return Err(SeriesError::Insane(bar.timestamp));
        }
        if let Some(last) = self.bars.last() {
            if bar.timestamp == last.timestamp {
                return Err(SeriesError::Duplicate(bar.timestamp));
            }
            if bar.timestamp < last.timestamp {
                return Err(SeriesError::OutOfOrder {
                    last: last.timestamp,
                    incoming: bar.timestamp,
                });
            }
        }
        self.bars.push(bar);
        Ok(())
    }

    pub fn bars(&self) -> &[Bar] {
        &self.bars
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn last(&self) -> Option<&Bar> {
        self.bars.last()
    }

    /// The trailing `n` bars (all of them when the series is shorter).
    pub fn tail(&self, n: usize) -> &[Bar] {
        let start = self.bars.len().saturating_sub(n);
        &self.bars[start..]
    }

    pub fn closes(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.close).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn bar_at(minute: u32, close: f64) -> Bar {
        Bar::new(
            Utc.with_ymd_and_hms(2024, 3, 4, 12, minute, 0).unwrap(),
            close,
            close + 0.0010,
            close - 0.0010,
            close,
            1_000.0,
        )
    }

    #[test]
    fn push_in_order_accepted() {
        let mut s = BarSeries::new();
        s.push(bar_at(0, 1.27)).unwrap();
        s.push(bar_at(15, 1.28)).unwrap();
        assert_eq!(s.len(), 2);
    }

    #[test]
    fn duplicate_timestamp_rejected_and_not_applied() {
        let mut s = BarSeries::new();
        s.push(bar_at(0, 1.27)).unwrap();
        let err = s.push(bar_at(0, 1.29)).unwrap_err();
        assert!(matches!(err, SeriesError::Duplicate(_)));
        assert_eq!(s.len(), 1);
        assert_eq!(s.last().unwrap().close, 1.27);
    }

    #[test]
    fn out_of_order_rejected() {
        let mut s = BarSeries::new();
        s.push(bar_at(15, 1.27)).unwrap();
        let err = s.push(bar_at(0, 1.26)).unwrap_err();
        assert!(matches!(err, SeriesError::OutOfOrder { .. }));
    }

    #[test]
    fn insane_bar_rejected() {
        let mut s = BarSeries::new();
        let mut bad = bar_at(0, 1.27);
        bad.low = bad.high + 0.01;
        assert!(matches!(s.push(bad), Err(SeriesError::Insane(_))));
    }

    #[test]
    fn tail_returns_trailing_window() {
        let s = BarSeries::from_bars((0..5).map(|i| bar_at(i * 10, 1.27 + i as f64 * 0.001)))
            .unwrap();
        assert_eq!(s.tail(2).len(), 2);
        assert_eq!(s.tail(100).len(), 5);
        assert_eq!(s.tail(2)[1].close, s.last().unwrap().close);
    }
}
