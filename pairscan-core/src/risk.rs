//! Risk-based sizing: stop placement, the R-multiple take-profit ladder,
//! and lot calculation from a fixed fraction of account balance.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{AccountState, Bar, Direction, Pair};
use crate::indicators::atr;
use crate::signal::TradeSignal;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskConfig {
    /// Fraction of balance risked per trade.
    pub risk_fraction: f64,
    pub atr_period: usize,
    /// Stop distance is at least this many ATRs.
    pub atr_multiplier: f64,
    /// Plans whose achievable reward falls below this multiple of the stop
    /// distance are rejected.
    pub min_reward_risk: f64,
    /// Broker lot granularity; sizes are floored to this step.
    pub lot_step: f64,
    /// Account-currency value of one pip per full lot.
    pub pip_value_per_lot: f64,
    pub splits: ExitSplits,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            risk_fraction: 0.01,
            atr_period: 14,
            atr_multiplier: 1.5,
            min_reward_risk: 2.0,
            lot_step: 0.01,
            pip_value_per_lot: 10.0,
            splits: ExitSplits::default(),
        }
    }
}

/// Percentage of the position closed at each take-profit level.
/// Must sum to 100.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExitSplits {
    pub tp1: u8,
    pub tp2: u8,
    pub tp3: u8,
}

impl Default for ExitSplits {
    fn default() -> Self {
        Self { tp1: 33, tp2: 33, tp3: 34 }
    }
}

impl ExitSplits {
    pub fn sum(&self) -> u32 {
        u32::from(self.tp1) + u32::from(self.tp2) + u32::from(self.tp3)
    }

    /// Divide `total` lots across the three legs, each floored to
    /// `lot_step`, with the remainder folded into the final leg so the legs
    /// always sum back to `total`.
    pub fn leg_lots(&self, total: f64, lot_step: f64) -> [f64; 3] {
        let floor = |lots: f64| (lots / lot_step).floor() * lot_step;
        let leg1 = floor(total * f64::from(self.tp1) / 100.0);
        let leg2 = floor(total * f64::from(self.tp2) / 100.0);
        let leg3 = total - leg1 - leg2;
        [leg1, leg2, leg3]
    }
}

/// Why a signal could not be turned into an executable plan.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanRejection {
    #[error("computed size {lots:.4} lots is below the minimum step {lot_step}")]
    InsufficientSize { lots: f64, lot_step: f64 },
    #[error("achievable reward/risk {achieved:.2} is below the minimum {required:.2}")]
    RiskRewardBelowMinimum { achieved: f64, required: f64 },
    #[error("risk inputs are unusable: {0}")]
    InvalidRisk(String),
}

/// A fully sized trade plan, ready to submit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SizedPlan {
    pub pair: Pair,
    pub direction: Direction,
    pub entry: f64,
    pub stop_loss: f64,
    /// TP1/TP2/TP3 at +1R, +2R, +3R from entry.
    pub take_profits: [f64; 3],
    pub lot_size: f64,
    /// Account currency at risk if the stop is hit.
    pub risk_amount: f64,
    /// One R expressed in price units (the stop distance).
    pub r_unit: f64,
    pub splits: ExitSplits,
}

impl SizedPlan {
    pub fn leg_lots(&self, lot_step: f64) -> [f64; 3] {
        self.splits.leg_lots(self.lot_size, lot_step)
    }
}

#[derive(Debug, Clone)]
pub struct RiskManager {
    config: RiskConfig,
}

impl RiskManager {
    pub fn new(config: RiskConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RiskConfig {
        &self.config
    }

    /// Size a signal into a plan.
    ///
    /// The stop sits at the entry zone's invalidation boundary, widened to
    /// at least `atr_multiplier` ATRs of the execution timeframe.
    /// `opposing_boundary` is the near edge of the closest open zone on the
    /// far side of the trade, if any; reward is capped there because price
    /// is likely to stall at that liquidity.
    pub fn build_plan(
        &self,
        signal: &TradeSignal,
        account: &AccountState,
        execution_bars: &[Bar],
        opposing_boundary: Option<f64>,
    ) -> Result<SizedPlan, PlanRejection> {
        let cfg = &self.config;
        if !(account.balance.is_finite() && account.balance > 0.0) {
            return Err(PlanRejection::InvalidRisk(format!(
                "account balance {} is not positive",
                account.balance
            )));
        }
        if cfg.splits.sum() != 100 {
            return Err(PlanRejection::InvalidRisk(format!(
                "exit splits sum to {}, expected 100",
                cfg.splits.sum()
            )));
        }

        let entry = signal.entry_price;
        let sign = signal.direction.sign();
        let boundary = signal.entry_zone.zone.invalidation_boundary(signal.direction);
        let structural = (entry - boundary) * sign;
        let volatility = atr(execution_bars, cfg.atr_period)
            .map(|a| a * cfg.atr_multiplier)
            .unwrap_or(0.0);
        let stop_distance = structural.max(volatility);
        if !(stop_distance.is_finite() && stop_distance > 0.0) {
            return Err(PlanRejection::InvalidRisk(format!(
                "stop distance {stop_distance} is not positive"
            )));
        }

        // Reward is capped at TP3 and, when an opposing zone stands in the
        // way, at its near edge.
        let full_reward = 3.0 * stop_distance;
        let achievable = match opposing_boundary {
            Some(b) => ((b - entry) * sign).min(full_reward),
            None => full_reward,
        };
        let achieved_rr = achievable / stop_distance;
        if achieved_rr < cfg.min_reward_risk {
            return Err(PlanRejection::RiskRewardBelowMinimum {
                achieved: achieved_rr,
                required: cfg.min_reward_risk,
            });
        }

        let risk_amount = account.balance * cfg.risk_fraction;
        let stop_pips = stop_distance / signal.pair.pip_size();
        let risk_per_lot = stop_pips * cfg.pip_value_per_lot;
        let raw_lots = risk_amount / risk_per_lot;
        let lot_size = (raw_lots / cfg.lot_step).floor() * cfg.lot_step;
        if lot_size < cfg.lot_step {
            return Err(PlanRejection::InsufficientSize {
                lots: raw_lots,
                lot_step: cfg.lot_step,
            });
        }

        let stop_loss = entry - sign * stop_distance;
        let take_profits = [
            entry + sign * stop_distance,
            entry + sign * 2.0 * stop_distance,
            entry + sign * 3.0 * stop_distance,
        ];

        tracing::debug!(
            pair = %signal.pair,
            direction = %signal.direction,
            lot_size,
            stop_loss,
            "plan sized"
        );

        Ok(SizedPlan {
            pair: signal.pair.clone(),
            direction: signal.direction,
            entry,
            stop_loss,
            take_profits,
            lot_size,
            risk_amount,
            r_unit: stop_distance,
            splits: cfg.splits,
        })
    }
}
