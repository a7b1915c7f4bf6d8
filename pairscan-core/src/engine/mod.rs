//! Scan engine: runs the full pipeline for each watched pair.
//!
//! Per pair: classify the H4 and H1 trends, detect liquidity zones on the
//! execution timeframe, fuse the three directional votes into a signal,
//! and size the survivors into executable plans. Pairs are independent,
//! so a scan fans out across them with rayon.

mod monitor;

pub use monitor::{CollectingSink, EventSink, LogSink, PositionMonitor};

use chrono::{DateTime, Utc};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;
use crate::domain::{AccountState, BarSeries, FundamentalBias, Pair, Timeframe};
use crate::error::AnalysisError;
use crate::risk::{PlanRejection, RiskManager, SizedPlan};
use crate::signal::{SignalOutcome, SignalSynthesizer};
use crate::trend::{MultiTimeframeTrend, TrendAnalyzer};
use crate::zones::{LiquidityZoneDetector, ZoneSet};

/// Time source, swappable so replays can pin "now".
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock frozen at a fixed instant, for replays and tests.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// Everything the engine needs to evaluate one pair.
#[derive(Debug, Clone)]
pub struct PairData {
    pub pair: Pair,
    /// H4 bars for the primary trend.
    pub primary: BarSeries,
    /// H1 bars for the confirmation trend.
    pub confirmation: BarSeries,
    /// M15 bars for zones, ATR, and execution.
    pub execution: BarSeries,
    pub bias: Option<FundamentalBias>,
}

/// The complete audit trail of one pair evaluation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PairEvaluation {
    pub pair: Pair,
    pub trend: MultiTimeframeTrend,
    pub zones: ZoneSet,
    pub outcome: SignalOutcome,
    /// Present when the outcome was a signal that sized cleanly.
    pub plan: Option<SizedPlan>,
    /// Present when the outcome was a signal the risk stage rejected.
    pub rejection: Option<PlanRejection>,
    pub evaluated_at: DateTime<Utc>,
}

pub struct ScanEngine {
    config: EngineConfig,
    analyzer: TrendAnalyzer,
    detector: LiquidityZoneDetector,
    synthesizer: SignalSynthesizer,
    risk: RiskManager,
}

impl ScanEngine {
    pub fn new(config: EngineConfig) -> Self {
        let analyzer = TrendAnalyzer::new(config.trend.clone());
        let detector = LiquidityZoneDetector::new(config.zones.clone());
        let synthesizer = SignalSynthesizer::new(config.signal.clone());
        let risk = RiskManager::new(config.risk.clone());
        Self {
            config,
            analyzer,
            detector,
            synthesizer,
            risk,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Run the pipeline for one pair.
    pub fn evaluate_pair(
        &self,
        data: &PairData,
        account: &AccountState,
        now: DateTime<Utc>,
    ) -> Result<PairEvaluation, AnalysisError> {
        let primary = self
            .analyzer
            .analyze(&data.pair, Timeframe::H4, &data.primary)?;
        let confirmation = self
            .analyzer
            .analyze(&data.pair, Timeframe::H1, &data.confirmation)?;
        let trend = TrendAnalyzer::align(primary, confirmation);

        let zones = self.detector.detect(&data.execution)?;
        let actionable = zones.actionable(self.config.zones.proximity_pct);

        let outcome = self.synthesizer.synthesize(
            &data.pair,
            data.bias.as_ref(),
            &trend,
            &actionable,
            zones.latest_close,
            now,
        );

        let (plan, rejection) = match outcome.signal() {
            Some(signal) => {
                // Reward is capped at the near edge of the closest open zone
                // on the far side of the trade.
                let opposing = zones
                    .annotated()
                    .into_iter()
                    .find(|a| {
                        a.zone.open
                            && a.zone.implied_direction(zones.latest_close)
                                == Some(signal.direction.opposite())
                    })
                    .map(|a| a.zone.invalidation_boundary(signal.direction));
                match self.risk.build_plan(
                    signal,
                    account,
                    data.execution.bars(),
                    opposing,
                ) {
                    Ok(plan) => (Some(plan), None),
                    Err(rejection) => {
                        tracing::info!(pair = %data.pair, %rejection, "plan rejected");
                        (None, Some(rejection))
                    }
                }
            }
            None => (None, None),
        };

        Ok(PairEvaluation {
            pair: data.pair.clone(),
            trend,
            zones,
            outcome,
            plan,
            rejection,
            evaluated_at: now,
        })
    }

    /// Evaluate every pair in parallel. Order of results matches input.
    pub fn scan(
        &self,
        pairs: &[PairData],
        account: &AccountState,
        now: DateTime<Utc>,
    ) -> Vec<(Pair, Result<PairEvaluation, AnalysisError>)> {
        pairs
            .par_iter()
            .map(|data| (data.pair.clone(), self.evaluate_pair(data, account, now)))
            .collect()
    }
}
