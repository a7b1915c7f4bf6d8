//! Engine configuration: one TOML document aggregating every stage's
//! settings, all optional with working defaults.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::Pair;
use crate::position::TrailMode;
use crate::risk::RiskConfig;
use crate::signal::SignalConfig;
use crate::trend::TrendConfig;
use crate::zones::ZoneConfig;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Lifecycle settings that are not part of sizing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PositionConfig {
    pub trail_mode: TrailMode,
    /// Minutes an unconfirmed order may wait before it is cancelled.
    pub pending_expiry_minutes: i64,
}

impl Default for PositionConfig {
    fn default() -> Self {
        Self {
            trail_mode: TrailMode::default(),
            pending_expiry_minutes: 240,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Pairs scanned when the caller does not name any explicitly.
    pub pairs: Vec<Pair>,
    pub trend: TrendConfig,
    pub zones: ZoneConfig,
    pub signal: SignalConfig,
    pub risk: RiskConfig,
    pub position: PositionConfig,
}

impl EngineConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &std::path::Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Reject configurations that would silently misbehave.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::Invalid(msg));
        if self.trend.fast_period == 0 || self.trend.fast_period >= self.trend.slow_period {
            return invalid(format!(
                "trend periods must satisfy 0 < fast ({}) < slow ({})",
                self.trend.fast_period, self.trend.slow_period
            ));
        }
        if !(0.0..=1.0).contains(&self.risk.risk_fraction) || self.risk.risk_fraction == 0.0 {
            return invalid(format!(
                "risk_fraction {} must be in (0, 1]",
                self.risk.risk_fraction
            ));
        }
        if self.risk.splits.sum() != 100 {
            return invalid(format!(
                "exit splits sum to {}, expected 100",
                self.risk.splits.sum()
            ));
        }
        if self.risk.lot_step <= 0.0 {
            return invalid(format!("lot_step {} must be positive", self.risk.lot_step));
        }
        if self.zones.min_touches < 2 {
            return invalid(format!(
                "min_touches {} must be at least 2",
                self.zones.min_touches
            ));
        }
        if self.zones.tolerance_pct <= 0.0 || self.zones.proximity_pct <= 0.0 {
            return invalid("zone tolerance and proximity must be positive".to_string());
        }
        if self.zones.staleness_bars >= self.zones.lookback {
            return invalid(format!(
                "staleness_bars {} must be below lookback {} or no zone can ever go stale",
                self.zones.staleness_bars, self.zones.lookback
            ));
        }
        let weights = self.signal.weight_fundamental
            + self.signal.weight_trend
            + self.signal.weight_zone;
        if !((weights - 1.0).abs() < 1e-9) {
            return invalid(format!("confluence weights sum to {weights}, expected 1.0"));
        }
        if self.position.pending_expiry_minutes <= 0 {
            return invalid(format!(
                "pending_expiry_minutes {} must be positive",
                self.position.pending_expiry_minutes
            ));
        }
        Ok(())
    }
}
