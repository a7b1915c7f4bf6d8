//! Position monitor: owns live positions and routes feed inputs to them.
//!
//! One monitor serves all pairs. Inputs are dispatched to every
//! non-terminal position on the matching pair; the events each position
//! produces are forwarded to the configured sink in order.

use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};

use crate::config::PositionConfig;
use crate::domain::{Bar, Pair};
use crate::position::{
    Position, PositionEvent, PositionId, PositionInput, TransitionError,
};
use crate::risk::SizedPlan;

/// Receives lifecycle events as they happen.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: &PositionEvent);
}

/// Logs every event through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

impl EventSink for LogSink {
    fn emit(&self, event: &PositionEvent) {
        tracing::info!(?event, "position event");
    }
}

/// Buffers events for later inspection. Used by replays and tests.
#[derive(Debug, Default)]
pub struct CollectingSink {
    events: Mutex<Vec<PositionEvent>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn take(&self) -> Vec<PositionEvent> {
        match self.events.lock() {
            Ok(mut events) => std::mem::take(&mut *events),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        }
    }
}

impl EventSink for CollectingSink {
    fn emit(&self, event: &PositionEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
    }
}

pub struct PositionMonitor<S: EventSink> {
    config: PositionConfig,
    lot_step: f64,
    positions: Vec<Position>,
    next_id: u64,
    sink: S,
}

impl<S: EventSink> PositionMonitor<S> {
    pub fn new(config: PositionConfig, lot_step: f64, sink: S) -> Self {
        Self {
            config,
            lot_step,
            positions: Vec::new(),
            next_id: 1,
            sink,
        }
    }

    /// Submit a sized plan as a pending position.
    pub fn open(&mut self, plan: SizedPlan, now: DateTime<Utc>) -> PositionId {
        let id = PositionId(self.next_id);
        self.next_id += 1;
        let position = Position::new(
            id,
            plan,
            self.config.trail_mode,
            self.lot_step,
            now,
            Duration::minutes(self.config.pending_expiry_minutes),
        );
        tracing::info!(%id, pair = %position.plan.pair, "position submitted");
        self.positions.push(position);
        id
    }

    pub fn confirm(
        &mut self,
        id: PositionId,
        price: f64,
        at: DateTime<Utc>,
    ) -> Result<(), TransitionError> {
        self.apply_to(id, PositionInput::Confirm { price, at })
    }

    pub fn reject(&mut self, id: PositionId, at: DateTime<Utc>) -> Result<(), TransitionError> {
        self.apply_to(id, PositionInput::Reject { at })
    }

    /// Route a price observation to every live position on `pair`.
    pub fn on_price(&mut self, pair: &Pair, price: f64, at: DateTime<Utc>) {
        self.dispatch(pair, &PositionInput::Price { price, at });
    }

    /// Route a completed execution-timeframe bar to every live position
    /// on `pair`.
    pub fn on_bar_close(&mut self, pair: &Pair, bar: Bar) {
        self.dispatch(pair, &PositionInput::BarClose(bar));
    }

    pub fn position(&self, id: PositionId) -> Option<&Position> {
        self.positions.iter().find(|p| p.id == id)
    }

    pub fn live_positions(&self) -> impl Iterator<Item = &Position> {
        self.positions.iter().filter(|p| !p.is_terminal())
    }

    pub fn positions(&self) -> &[Position] {
        &self.positions
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    fn apply_to(&mut self, id: PositionId, input: PositionInput) -> Result<(), TransitionError> {
        let position = self
            .positions
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or(TransitionError::Unknown { id })?;
        let events = position.apply(input)?;
        for event in &events {
            self.sink.emit(event);
        }
        Ok(())
    }

    fn dispatch(&mut self, pair: &Pair, input: &PositionInput) {
        for position in &mut self.positions {
            if position.is_terminal() || &position.plan.pair != pair {
                continue;
            }
            match position.apply(input.clone()) {
                Ok(events) => {
                    for event in &events {
                        self.sink.emit(event);
                    }
                }
                Err(err) => {
                    tracing::warn!(id = %position.id, %err, "input dropped");
                }
            }
        }
    }
}
