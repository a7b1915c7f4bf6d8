//! Position lifecycle state machine.
//!
//! A position moves through `Pending -> Open -> Partial1 -> Partial2 ->
//! Trailing -> Closed`, with `Cancelled` (never filled) and `StoppedOut`
//! (stop hit with size remaining) as the alternate terminals. Milestones
//! are strictly ordered: TP2 cannot fill before TP1, and a gap through
//! several levels fills each leg in sequence at its own level.
//!
//! The stop only ever tightens. Breakeven after TP1, lock of TP1 after
//! TP2, and every trailing recomputation go through the same ratchet:
//! a candidate that would loosen the stop is discarded.

mod trailing;

pub use trailing::TrailMode;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{Bar, Direction, Pair};
use crate::risk::SizedPlan;

/// Retained completed bars for ATR-based trailing.
const BAR_WINDOW: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PositionId(pub u64);

impl std::fmt::Display for PositionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PositionState {
    #[serde(rename = "PENDING")]
    Pending,
    #[serde(rename = "OPEN")]
    Open,
    #[serde(rename = "PARTIAL_1")]
    Partial1,
    #[serde(rename = "PARTIAL_2")]
    Partial2,
    #[serde(rename = "TRAILING")]
    Trailing,
    #[serde(rename = "CLOSED")]
    Closed,
    #[serde(rename = "CANCELLED")]
    Cancelled,
    #[serde(rename = "STOPPED_OUT")]
    StoppedOut,
}

impl PositionState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PositionState::Closed | PositionState::Cancelled | PositionState::StoppedOut
        )
    }
}

/// Inputs delivered by the broker/feed adapter, in timestamp order.
#[derive(Debug, Clone, PartialEq)]
pub enum PositionInput {
    /// Broker confirmed the fill at `price`.
    Confirm { price: f64, at: DateTime<Utc> },
    /// Broker rejected the order.
    Reject { at: DateTime<Utc> },
    /// An intrabar price observation; drives touch detection.
    Price { price: f64, at: DateTime<Utc> },
    /// A completed execution-timeframe bar; drives trailing recomputation.
    BarClose(Bar),
}

impl PositionInput {
    pub fn at(&self) -> DateTime<Utc> {
        match self {
            PositionInput::Confirm { at, .. }
            | PositionInput::Reject { at }
            | PositionInput::Price { at, .. } => *at,
            PositionInput::BarClose(bar) => bar.timestamp,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum TransitionError {
    #[error("position {id} is already terminal ({state:?})")]
    Terminal { id: PositionId, state: PositionState },
    #[error("position {id} in state {state:?} cannot accept {input}")]
    UnexpectedInput {
        id: PositionId,
        state: PositionState,
        input: &'static str,
    },
    #[error("position {id} is not tracked")]
    Unknown { id: PositionId },
    #[error("position {id}: input at {at} precedes the last applied input at {last}")]
    OutOfOrder {
        id: PositionId,
        at: DateTime<Utc>,
        last: DateTime<Utc>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelReason {
    Rejected,
    Expired,
}

/// One executed exit (a TP leg fill or the final stop-out fill).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutedExit {
    pub price: f64,
    pub lots: f64,
    pub at: DateTime<Utc>,
}

/// Post-mortem record produced when a position reaches a terminal state
/// with fills behind it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionSummary {
    pub id: PositionId,
    pub pair: Pair,
    pub direction: Direction,
    pub entry_price: f64,
    pub exits: Vec<ExecutedExit>,
    /// Size-weighted average exit price.
    pub avg_exit_price: f64,
    /// Signed favorable move from entry to the average exit, price units.
    pub total_move: f64,
    /// Realized profit in R units, weighted by the initial size.
    pub realized_r: f64,
    pub opened_at: DateTime<Utc>,
    pub closed_at: DateTime<Utc>,
    pub holding_secs: i64,
    pub final_state: PositionState,
}

/// Lifecycle notifications, emitted in the order they occurred.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PositionEvent {
    Opened {
        id: PositionId,
        price: f64,
        at: DateTime<Utc>,
    },
    Cancelled {
        id: PositionId,
        reason: CancelReason,
        at: DateTime<Utc>,
    },
    PartialExit {
        id: PositionId,
        level: u8,
        price: f64,
        lots: f64,
        at: DateTime<Utc>,
    },
    StopAdjusted {
        id: PositionId,
        from: f64,
        to: f64,
        at: DateTime<Utc>,
    },
    TrailingStarted {
        id: PositionId,
        at: DateTime<Utc>,
    },
    StoppedOut {
        id: PositionId,
        price: f64,
        at: DateTime<Utc>,
    },
    Closed {
        id: PositionId,
        summary: PositionSummary,
    },
}

/// A live position tracking one sized plan through its lifecycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub id: PositionId,
    pub plan: SizedPlan,
    pub state: PositionState,
    /// Actual fill price once confirmed; the plan's entry until then.
    pub entry_price: f64,
    pub current_stop: f64,
    pub remaining_lots: f64,
    pub exits: Vec<ExecutedExit>,
    /// Most favorable price seen since entry.
    pub peak_price: f64,
    pub created_at: DateTime<Utc>,
    pub opened_at: Option<DateTime<Utc>>,
    pub closed_at: Option<DateTime<Utc>>,
    pending_deadline: DateTime<Utc>,
    /// Timestamp watermark over applied inputs.
    last_input_at: Option<DateTime<Utc>>,
    trail_mode: TrailMode,
    leg_lots: [f64; 3],
    recent_bars: Vec<Bar>,
}

impl Position {
    pub fn new(
        id: PositionId,
        plan: SizedPlan,
        trail_mode: TrailMode,
        lot_step: f64,
        created_at: DateTime<Utc>,
        pending_expiry: chrono::Duration,
    ) -> Self {
        let leg_lots = plan.leg_lots(lot_step);
        let entry = plan.entry;
        let stop = plan.stop_loss;
        let lots = plan.lot_size;
        Self {
            id,
            plan,
            state: PositionState::Pending,
            entry_price: entry,
            current_stop: stop,
            remaining_lots: lots,
            exits: Vec::new(),
            peak_price: entry,
            created_at,
            opened_at: None,
            closed_at: None,
            pending_deadline: created_at + pending_expiry,
            last_input_at: None,
            trail_mode,
            leg_lots,
            recent_bars: Vec::new(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// Advance the state machine with one input, returning the events it
    /// produced. Inputs after a terminal state are an error, as is an input
    /// timestamped before one already applied (ties are allowed: several
    /// observations within one bar share its timestamp). A price tick that
    /// touches nothing returns an empty vector.
    pub fn apply(&mut self, input: PositionInput) -> Result<Vec<PositionEvent>, TransitionError> {
        if self.state.is_terminal() {
            return Err(TransitionError::Terminal {
                id: self.id,
                state: self.state,
            });
        }
        let at = input.at();
        if let Some(last) = self.last_input_at {
            if at < last {
                return Err(TransitionError::OutOfOrder {
                    id: self.id,
                    at,
                    last,
                });
            }
        }
        let events = match input {
            PositionInput::Confirm { price, at } => self.on_confirm(price, at)?,
            PositionInput::Reject { at } => self.on_reject(at)?,
            PositionInput::Price { price, at } => self.on_price(price, at),
            PositionInput::BarClose(bar) => self.on_bar_close(bar),
        };
        self.last_input_at = Some(at);
        Ok(events)
    }

    fn on_confirm(
        &mut self,
        price: f64,
        at: DateTime<Utc>,
    ) -> Result<Vec<PositionEvent>, TransitionError> {
        if self.state != PositionState::Pending {
            return Err(TransitionError::UnexpectedInput {
                id: self.id,
                state: self.state,
                input: "Confirm",
            });
        }
        if at > self.pending_deadline {
            return Ok(self.cancel(CancelReason::Expired, at));
        }
        self.state = PositionState::Open;
        self.entry_price = price;
        self.peak_price = price;
        self.opened_at = Some(at);
        tracing::info!(id = %self.id, pair = %self.plan.pair, price, "position opened");
        Ok(vec![PositionEvent::Opened {
            id: self.id,
            price,
            at,
        }])
    }

    fn on_reject(&mut self, at: DateTime<Utc>) -> Result<Vec<PositionEvent>, TransitionError> {
        if self.state != PositionState::Pending {
            return Err(TransitionError::UnexpectedInput {
                id: self.id,
                state: self.state,
                input: "Reject",
            });
        }
        Ok(self.cancel(CancelReason::Rejected, at))
    }

    fn cancel(&mut self, reason: CancelReason, at: DateTime<Utc>) -> Vec<PositionEvent> {
        self.state = PositionState::Cancelled;
        self.closed_at = Some(at);
        tracing::info!(id = %self.id, ?reason, "position cancelled");
        vec![PositionEvent::Cancelled {
            id: self.id,
            reason,
            at,
        }]
    }

    fn on_price(&mut self, price: f64, at: DateTime<Utc>) -> Vec<PositionEvent> {
        if self.state == PositionState::Pending {
            if at > self.pending_deadline {
                return self.cancel(CancelReason::Expired, at);
            }
            return Vec::new();
        }

        let sign = self.plan.direction.sign();
        if (price - self.peak_price) * sign > 0.0 {
            self.peak_price = price;
        }

        // Stop has priority over targets on a single observation.
        if (price - self.current_stop) * sign <= 0.0 {
            return self.stop_out(at);
        }

        let mut events = Vec::new();
        // A gap through several levels fills each leg in order at its own
        // target price.
        while !self.state.is_terminal() {
            let level = self.exits.len();
            if level >= 3 {
                break;
            }
            let target = self.plan.take_profits[level];
            if (price - target) * sign < 0.0 {
                break;
            }
            events.extend(self.fill_leg(level, at));
        }
        events
    }

    /// Fill TP leg `level` (0-based) at its target price and advance state.
    fn fill_leg(&mut self, level: usize, at: DateTime<Utc>) -> Vec<PositionEvent> {
        let price = self.plan.take_profits[level];
        let lots = self.leg_lots[level].min(self.remaining_lots);
        self.remaining_lots -= lots;
        self.exits.push(ExecutedExit { price, lots, at });
        let mut events = vec![PositionEvent::PartialExit {
            id: self.id,
            level: level as u8 + 1,
            price,
            lots,
            at,
        }];
        tracing::info!(id = %self.id, level = level + 1, price, lots, "take profit filled");

        match level {
            0 => {
                self.state = PositionState::Partial1;
                events.extend(self.ratchet_stop(self.entry_price, at));
            }
            1 => {
                self.state = PositionState::Partial2;
                events.extend(self.ratchet_stop(self.plan.take_profits[0], at));
            }
            _ => {
                self.state = PositionState::Closed;
                self.closed_at = Some(at);
                events.push(PositionEvent::Closed {
                    id: self.id,
                    summary: self.summary(at),
                });
            }
        }
        events
    }

    fn on_bar_close(&mut self, bar: Bar) -> Vec<PositionEvent> {
        let at = bar.timestamp;
        if self.state == PositionState::Pending {
            if at > self.pending_deadline {
                return self.cancel(CancelReason::Expired, at);
            }
            return Vec::new();
        }

        let sign = self.plan.direction.sign();
        let extreme = if self.plan.direction == Direction::Long {
            bar.high
        } else {
            bar.low
        };
        if (extreme - self.peak_price) * sign > 0.0 {
            self.peak_price = extreme;
        }
        self.recent_bars.push(bar);
        if self.recent_bars.len() > BAR_WINDOW {
            self.recent_bars.remove(0);
        }

        let mut events = Vec::new();
        if self.state == PositionState::Partial2 {
            self.state = PositionState::Trailing;
            events.push(PositionEvent::TrailingStarted { id: self.id, at });
        }
        if self.state == PositionState::Trailing {
            let candidate = self.trail_mode.candidate(
                self.plan.direction,
                self.peak_price,
                self.plan.r_unit,
                self.plan.pair.pip_size(),
                &self.recent_bars,
            );
            events.extend(self.ratchet_stop(candidate, at));
        }
        events
    }

    /// Apply a candidate stop only if it tightens.
    fn ratchet_stop(&mut self, candidate: f64, at: DateTime<Utc>) -> Vec<PositionEvent> {
        let sign = self.plan.direction.sign();
        if (candidate - self.current_stop) * sign > 0.0 {
            let from = self.current_stop;
            self.current_stop = candidate;
            tracing::debug!(id = %self.id, from, to = candidate, "stop tightened");
            vec![PositionEvent::StopAdjusted {
                id: self.id,
                from,
                to: candidate,
                at,
            }]
        } else {
            Vec::new()
        }
    }

    fn stop_out(&mut self, at: DateTime<Utc>) -> Vec<PositionEvent> {
        let price = self.current_stop;
        let lots = self.remaining_lots;
        self.remaining_lots = 0.0;
        self.exits.push(ExecutedExit { price, lots, at });
        self.state = PositionState::StoppedOut;
        self.closed_at = Some(at);
        tracing::info!(id = %self.id, price, lots, "stopped out");
        vec![
            PositionEvent::StoppedOut {
                id: self.id,
                price,
                at,
            },
            PositionEvent::Closed {
                id: self.id,
                summary: self.summary(at),
            },
        ]
    }

    fn summary(&self, closed_at: DateTime<Utc>) -> PositionSummary {
        let sign = self.plan.direction.sign();
        let exited: f64 = self.exits.iter().map(|e| e.lots).sum();
        let avg_exit_price = if exited > 0.0 {
            self.exits.iter().map(|e| e.price * e.lots).sum::<f64>() / exited
        } else {
            self.entry_price
        };
        let pnl_r: f64 = self
            .exits
            .iter()
            .map(|e| e.lots * (e.price - self.entry_price) * sign)
            .sum::<f64>()
            / (self.plan.lot_size * self.plan.r_unit);
        let opened_at = self.opened_at.unwrap_or(self.created_at);
        PositionSummary {
            id: self.id,
            pair: self.plan.pair.clone(),
            direction: self.plan.direction,
            entry_price: self.entry_price,
            exits: self.exits.clone(),
            avg_exit_price,
            total_move: (avg_exit_price - self.entry_price) * sign,
            realized_r: pnl_r,
            opened_at,
            closed_at,
            holding_secs: closed_at.signed_duration_since(opened_at).num_seconds(),
            final_state: self.state,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Pair;
    use crate::risk::{ExitSplits, SizedPlan};
    use chrono::{Duration, TimeZone};

    fn t(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 4, 12, 0, 0).unwrap() + Duration::minutes(minute.into())
    }

    fn long_plan() -> SizedPlan {
        SizedPlan {
            pair: Pair::new("GBP/USD"),
            direction: Direction::Long,
            entry: 1.27000,
            stop_loss: 1.26500,
            take_profits: [1.27500, 1.28000, 1.28500],
            lot_size: 0.20,
            risk_amount: 100.0,
            r_unit: 0.00500,
            splits: ExitSplits::default(),
        }
    }

    fn open_position() -> Position {
        let mut pos = Position::new(
            PositionId(1),
            long_plan(),
            TrailMode::default(),
            0.01,
            t(0),
            Duration::hours(4),
        );
        pos.apply(PositionInput::Confirm {
            price: 1.27000,
            at: t(1),
        })
        .unwrap();
        pos
    }

    fn tick(pos: &mut Position, price: f64, minute: u32) -> Vec<PositionEvent> {
        pos.apply(PositionInput::Price {
            price,
            at: t(minute),
        })
        .unwrap()
    }

    fn bar_close(pos: &mut Position, high: f64, low: f64, minute: u32) -> Vec<PositionEvent> {
        pos.apply(PositionInput::BarClose(Bar {
            timestamp: t(minute),
            open: (high + low) / 2.0,
            high,
            low,
            close: (high + low) / 2.0,
            volume: 100.0,
        }))
        .unwrap()
    }

    #[test]
    fn confirm_opens_at_fill_price() {
        let mut pos = Position::new(
            PositionId(1),
            long_plan(),
            TrailMode::default(),
            0.01,
            t(0),
            Duration::hours(4),
        );
        let events = pos
            .apply(PositionInput::Confirm {
                price: 1.27010,
                at: t(1),
            })
            .unwrap();
        assert_eq!(pos.state, PositionState::Open);
        assert_eq!(pos.entry_price, 1.27010);
        assert!(matches!(events[0], PositionEvent::Opened { price, .. } if price == 1.27010));
    }

    #[test]
    fn reject_cancels() {
        let mut pos = Position::new(
            PositionId(1),
            long_plan(),
            TrailMode::default(),
            0.01,
            t(0),
            Duration::hours(4),
        );
        let events = pos.apply(PositionInput::Reject { at: t(1) }).unwrap();
        assert_eq!(pos.state, PositionState::Cancelled);
        assert!(matches!(
            events[0],
            PositionEvent::Cancelled {
                reason: CancelReason::Rejected,
                ..
            }
        ));
    }

    #[test]
    fn pending_expires_on_deadline() {
        let mut pos = Position::new(
            PositionId(1),
            long_plan(),
            TrailMode::default(),
            0.01,
            t(0),
            Duration::minutes(30),
        );
        assert!(tick(&mut pos, 1.27000, 10).is_empty());
        let events = tick(&mut pos, 1.27000, 45);
        assert_eq!(pos.state, PositionState::Cancelled);
        assert!(matches!(
            events[0],
            PositionEvent::Cancelled {
                reason: CancelReason::Expired,
                ..
            }
        ));
    }

    #[test]
    fn tp1_fills_a_third_and_moves_stop_to_breakeven() {
        let mut pos = open_position();
        let events = tick(&mut pos, 1.27500, 10);
        assert_eq!(pos.state, PositionState::Partial1);
        assert!((pos.remaining_lots - 0.14).abs() < 1e-9);
        assert_eq!(pos.current_stop, 1.27000);
        assert!(matches!(
            events[0],
            PositionEvent::PartialExit { level: 1, price, .. } if price == 1.27500
        ));
        assert!(matches!(
            events[1],
            PositionEvent::StopAdjusted { to, .. } if to == 1.27000
        ));
    }

    #[test]
    fn tp2_locks_tp1_as_stop() {
        let mut pos = open_position();
        tick(&mut pos, 1.27500, 10);
        let events = tick(&mut pos, 1.28000, 20);
        assert_eq!(pos.state, PositionState::Partial2);
        assert!((pos.remaining_lots - 0.08).abs() < 1e-9);
        assert_eq!(pos.current_stop, 1.27500);
        assert!(matches!(events[0], PositionEvent::PartialExit { level: 2, .. }));
    }

    #[test]
    fn gap_through_two_levels_fills_both_at_their_targets() {
        let mut pos = open_position();
        let events = tick(&mut pos, 1.28100, 10);
        assert_eq!(pos.state, PositionState::Partial2);
        let fills: Vec<(u8, f64)> = events
            .iter()
            .filter_map(|e| match e {
                PositionEvent::PartialExit { level, price, .. } => Some((*level, *price)),
                _ => None,
            })
            .collect();
        assert_eq!(fills, vec![(1, 1.27500), (2, 1.28000)]);
    }

    #[test]
    fn bar_close_after_tp2_starts_trailing() {
        let mut pos = open_position();
        tick(&mut pos, 1.28000, 20);
        let events = bar_close(&mut pos, 1.28050, 1.27900, 30);
        assert_eq!(pos.state, PositionState::Trailing);
        assert!(matches!(events[0], PositionEvent::TrailingStarted { .. }));
        // Peak 1.28050 minus 1R, a touch above the TP1 lock.
        assert!((pos.current_stop - 1.27550).abs() < 1e-9);
    }

    #[test]
    fn trailing_stop_ratchets_up_and_never_loosens() {
        let mut pos = open_position();
        tick(&mut pos, 1.28000, 20);
        bar_close(&mut pos, 1.28050, 1.27900, 30);
        bar_close(&mut pos, 1.28300, 1.28000, 45);
        // Peak 1.28300 minus 1R.
        assert!((pos.current_stop - 1.27800).abs() < 1e-9);
        // A pullback bar must not loosen the stop.
        let events = bar_close(&mut pos, 1.28000, 1.27850, 60);
        assert!((pos.current_stop - 1.27800).abs() < 1e-9);
        assert!(events.is_empty());
    }

    #[test]
    fn trail_stop_cross_exits_the_rest() {
        let mut pos = open_position();
        tick(&mut pos, 1.28000, 20);
        bar_close(&mut pos, 1.28300, 1.28000, 30);
        let events = tick(&mut pos, 1.27790, 40);
        assert_eq!(pos.state, PositionState::StoppedOut);
        assert_eq!(pos.remaining_lots, 0.0);
        assert!(matches!(
            events[0],
            PositionEvent::StoppedOut { price, .. } if (price - 1.27800).abs() < 1e-9
        ));
        let summary = match &events[1] {
            PositionEvent::Closed { summary, .. } => summary,
            other => panic!("expected Closed, got {other:?}"),
        };
        // 0.06 @ +1R, 0.06 @ +2R, 0.08 @ +1.6R over 0.20 lots.
        assert!((summary.realized_r - 1.54).abs() < 1e-9);
        assert_eq!(summary.final_state, PositionState::StoppedOut);
    }

    #[test]
    fn tp3_closes_the_position() {
        let mut pos = open_position();
        tick(&mut pos, 1.28000, 20);
        bar_close(&mut pos, 1.28050, 1.27900, 30);
        let events = tick(&mut pos, 1.28500, 40);
        assert_eq!(pos.state, PositionState::Closed);
        assert_eq!(pos.remaining_lots, 0.0);
        let summary = match events.last().unwrap() {
            PositionEvent::Closed { summary, .. } => summary,
            other => panic!("expected Closed, got {other:?}"),
        };
        // 0.06 @ +1R, 0.06 @ +2R, 0.08 @ +3R over 0.20 lots = 2.1R.
        assert!((summary.realized_r - 2.1).abs() < 1e-9);
        assert!((summary.avg_exit_price - 1.28050).abs() < 1e-9);
        assert!((summary.total_move - 0.01050).abs() < 1e-9);
    }

    #[test]
    fn initial_stop_hit_loses_one_r() {
        let mut pos = open_position();
        let events = tick(&mut pos, 1.26490, 10);
        assert_eq!(pos.state, PositionState::StoppedOut);
        let summary = match &events[1] {
            PositionEvent::Closed { summary, .. } => summary,
            other => panic!("expected Closed, got {other:?}"),
        };
        assert!((summary.realized_r + 1.0).abs() < 1e-9);
    }

    #[test]
    fn terminal_states_absorb_nothing_further() {
        let mut pos = open_position();
        tick(&mut pos, 1.26400, 10);
        let err = pos
            .apply(PositionInput::Price {
                price: 1.27000,
                at: t(20),
            })
            .unwrap_err();
        assert!(matches!(err, TransitionError::Terminal { .. }));
    }

    #[test]
    fn confirm_twice_is_unexpected() {
        let mut pos = open_position();
        let err = pos
            .apply(PositionInput::Confirm {
                price: 1.27000,
                at: t(5),
            })
            .unwrap_err();
        assert!(matches!(err, TransitionError::UnexpectedInput { .. }));
    }

    #[test]
    fn stale_tick_is_rejected_without_side_effects() {
        let mut pos = open_position();
        tick(&mut pos, 1.27100, 10);
        // A tick timestamped before the last applied input must error, not
        // fill a target.
        let err = pos
            .apply(PositionInput::Price {
                price: 1.27500,
                at: t(5),
            })
            .unwrap_err();
        assert!(matches!(err, TransitionError::OutOfOrder { .. }));
        assert_eq!(pos.state, PositionState::Open);
        assert!(pos.exits.is_empty());
        // Equal timestamps are fine: several observations share one bar.
        assert!(pos
            .apply(PositionInput::Price {
                price: 1.27100,
                at: t(10),
            })
            .is_ok());
    }

    #[test]
    fn breakeven_never_loosens_after_tp2_gap() {
        // Fill both levels on one tick, then check the stop stayed at the
        // tighter of the two ratchets.
        let mut pos = open_position();
        tick(&mut pos, 1.28100, 10);
        assert_eq!(pos.current_stop, 1.27500);
    }
}
