//! Fundamental bias record from the external economic-calendar screener.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::pair::{Direction, Pair};

/// Directional bias derived from scheduled news, produced upstream.
///
/// The core does not parse calendars; it only consumes the finished record.
/// Confidence is a fraction in `[0, 1]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FundamentalBias {
    pub pair: Pair,
    pub direction: Direction,
    pub confidence: f64,
    pub timestamp: DateTime<Utc>,
}

impl FundamentalBias {
    pub fn new(
        pair: Pair,
        direction: Direction,
        confidence: f64,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            pair,
            direction,
            confidence: confidence.clamp(0.0, 1.0),
            timestamp,
        }
    }

    /// News-driven bias decays fast; a record older than `max_age` should
    /// not gate a new trade.
    pub fn is_fresh(&self, now: DateTime<Utc>, max_age: Duration) -> bool {
        now.signed_duration_since(self.timestamp) <= max_age
    }
}
