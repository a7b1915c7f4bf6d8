//! Currency pair, timeframe, and direction enums.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A currency pair, e.g. "GBP/USD".
///
/// The quote currency decides the pip size: JPY-quoted pairs tick in 0.01,
/// everything else in 0.0001.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Pair(String);

impl Pair {
    pub fn new(symbol: impl Into<String>) -> Self {
        Self(symbol.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Quote currency is the part after the slash ("USD" in "GBP/USD").
    pub fn quote_currency(&self) -> &str {
        self.0.split('/').nth(1).unwrap_or("")
    }

    pub fn is_jpy_quoted(&self) -> bool {
        self.quote_currency() == "JPY"
    }

    /// Minimum price increment for this instrument.
    pub fn pip_size(&self) -> f64 {
        if self.is_jpy_quoted() {
            0.01
        } else {
            0.0001
        }
    }
}

impl fmt::Display for Pair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Pair {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Chart timeframe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Timeframe {
    M15,
    M30,
    H1,
    H4,
    D1,
}

impl Timeframe {
    pub fn minutes(&self) -> u32 {
        match self {
            Timeframe::M15 => 15,
            Timeframe::M30 => 30,
            Timeframe::H1 => 60,
            Timeframe::H4 => 240,
            Timeframe::D1 => 1440,
        }
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Timeframe::M15 => "M15",
            Timeframe::M30 => "M30",
            Timeframe::H1 => "H1",
            Timeframe::H4 => "H4",
            Timeframe::D1 => "D1",
        };
        f.write_str(s)
    }
}

/// Trade direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Long,
    Short,
}

impl Direction {
    /// +1.0 for long, -1.0 for short. Collapses mirrored price arithmetic.
    pub fn sign(&self) -> f64 {
        match self {
            Direction::Long => 1.0,
            Direction::Short => -1.0,
        }
    }

    pub fn opposite(&self) -> Self {
        match self {
            Direction::Long => Direction::Short,
            Direction::Short => Direction::Long,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Long => f.write_str("long"),
            Direction::Short => f.write_str("short"),
        }
    }
}

/// Directional bias of a trend on one timeframe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendDirection {
    Bullish,
    Bearish,
    Neutral,
}

impl TrendDirection {
    /// The trade direction this bias implies, if any.
    pub fn as_direction(&self) -> Option<Direction> {
        match self {
            TrendDirection::Bullish => Some(Direction::Long),
            TrendDirection::Bearish => Some(Direction::Short),
            TrendDirection::Neutral => None,
        }
    }
}

impl fmt::Display for TrendDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrendDirection::Bullish => f.write_str("bullish"),
            TrendDirection::Bearish => f.write_str("bearish"),
            TrendDirection::Neutral => f.write_str("neutral"),
        }
    }
}
