//! Signal synthesis — fusing fundamental bias, trend, and liquidity zones.
//!
//! A trade signal requires all three directional votes to agree: the
//! fundamental bias, the aligned multi-timeframe trend, and the direction
//! implied by trading off the nearest actionable zone. Anything else is a
//! `NoSignal` with a reason — a normal, frequent outcome, never an error.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{Direction, FundamentalBias, Pair, TrendDirection};
use crate::trend::MultiTimeframeTrend;
use crate::zones::AnnotatedZone;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalConfig {
    pub weight_fundamental: f64,
    pub weight_trend: f64,
    pub weight_zone: f64,
    /// Confluence score required to emit a signal.
    pub min_confluence: f64,
    /// Fundamental confidence below this never trades.
    pub min_fundamental_confidence: f64,
    /// Bias records older than this are ignored.
    pub max_bias_age_hours: i64,
}

impl Default for SignalConfig {
    fn default() -> Self {
        Self {
            weight_fundamental: 0.4,
            weight_trend: 0.35,
            weight_zone: 0.25,
            min_confluence: 0.55,
            min_fundamental_confidence: 0.3,
            max_bias_age_hours: 24,
        }
    }
}

/// Why no signal was produced. Frequent and unremarkable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoSignalReason {
    /// Primary and confirmation timeframes disagree.
    TrendConflict,
    /// Both timeframes agree the market is going nowhere.
    TrendNeutral,
    /// No bias record, or the record is older than the freshness window.
    StaleFundamental,
    /// Bias confidence below the configured floor.
    WeakFundamental,
    /// Fundamental direction contradicts the trend.
    FundamentalDisagrees,
    /// No open zone close enough (or on the right side of price) to trade.
    NoActionableZone,
    /// Votes agree but the weighted confluence is below threshold.
    BelowThreshold { score: f64 },
}

/// A complete, ready-to-size trade signal. Ephemeral: produced once and
/// consumed immediately by the risk manager.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeSignal {
    pub pair: Pair,
    pub direction: Direction,
    pub entry_price: f64,
    pub entry_zone: AnnotatedZone,
    pub confluence_score: f64,
    pub fundamental: FundamentalBias,
    pub trend_bias: TrendDirection,
    pub trend_strength: u8,
    pub generated_at: DateTime<Utc>,
}

/// The synthesizer's verdict for one evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalOutcome {
    Signal(TradeSignal),
    NoSignal(NoSignalReason),
}

impl SignalOutcome {
    pub fn signal(&self) -> Option<&TradeSignal> {
        match self {
            SignalOutcome::Signal(s) => Some(s),
            SignalOutcome::NoSignal(_) => None,
        }
    }

    pub fn is_signal(&self) -> bool {
        matches!(self, SignalOutcome::Signal(_))
    }
}

#[derive(Debug, Clone)]
pub struct SignalSynthesizer {
    config: SignalConfig,
}

impl SignalSynthesizer {
    pub fn new(config: SignalConfig) -> Self {
        let weight_sum =
            config.weight_fundamental + config.weight_trend + config.weight_zone;
        assert!(weight_sum > 0.0, "confluence weights must not all be zero");
        Self { config }
    }

    pub fn config(&self) -> &SignalConfig {
        &self.config
    }

    /// Fuse the three bias sources. `actionable` must already be filtered
    /// to open zones within the proximity threshold, nearest first (see
    /// [`crate::zones::ZoneSet::actionable`]).
    pub fn synthesize(
        &self,
        pair: &Pair,
        bias: Option<&FundamentalBias>,
        trend: &MultiTimeframeTrend,
        actionable: &[AnnotatedZone],
        latest_close: f64,
        now: DateTime<Utc>,
    ) -> SignalOutcome {
        let trend_direction = match trend.direction() {
            None => return SignalOutcome::NoSignal(NoSignalReason::TrendConflict),
            Some(d) => d,
        };
        let trade_direction = match trend_direction.as_direction() {
            None => return SignalOutcome::NoSignal(NoSignalReason::TrendNeutral),
            Some(d) => d,
        };

        let bias = match bias {
            Some(b) if b.is_fresh(now, Duration::hours(self.config.max_bias_age_hours)) => b,
            _ => return SignalOutcome::NoSignal(NoSignalReason::StaleFundamental),
        };
        if bias.confidence < self.config.min_fundamental_confidence {
            return SignalOutcome::NoSignal(NoSignalReason::WeakFundamental);
        }
        if bias.direction != trade_direction {
            return SignalOutcome::NoSignal(NoSignalReason::FundamentalDisagrees);
        }

        // Nearest actionable zone whose trade implication matches: a
        // demand-side zone below price for longs, supply-side above for
        // shorts.
        let entry_zone = actionable
            .iter()
            .find(|a| a.zone.implied_direction(latest_close) == Some(trade_direction));
        let entry_zone = match entry_zone {
            Some(z) => z.clone(),
            None => return SignalOutcome::NoSignal(NoSignalReason::NoActionableZone),
        };

        let score = self.confluence(bias.confidence, trend.strength(), entry_zone.zone.touch_count);
        if score < self.config.min_confluence {
            return SignalOutcome::NoSignal(NoSignalReason::BelowThreshold { score });
        }

        tracing::info!(
            pair = %pair,
            direction = %trade_direction,
            score,
            zone = ?entry_zone.zone.kind,
            "signal emitted"
        );

        SignalOutcome::Signal(TradeSignal {
            pair: pair.clone(),
            direction: trade_direction,
            entry_price: latest_close,
            entry_zone,
            confluence_score: score,
            fundamental: bias.clone(),
            trend_bias: trend_direction,
            trend_strength: trend.strength(),
            generated_at: now,
        })
    }

    /// Weighted sum of the three normalized components.
    fn confluence(&self, confidence: f64, trend_strength: u8, touch_count: u32) -> f64 {
        let trend_component = f64::from(trend_strength.min(3)) / 3.0;
        // Stop hunts carry one touch and gaps none; both still represent a
        // level, so the zone component has a floor of one touch.
        let zone_component = f64::from(touch_count.clamp(1, 5)) / 5.0;
        self.config.weight_fundamental * confidence
            + self.config.weight_trend * trend_component
            + self.config.weight_zone * zone_component
    }
}
