//! PairScan Core — the signal decision engine.
//!
//! This crate contains the heart of the setup screener:
//! - Domain types (bars, pairs, timeframes, account state, fundamental bias)
//! - Multi-timeframe trend classification
//! - Liquidity zone detection (equal levels, stop hunts, fair value gaps)
//! - Signal synthesis from fundamental + trend + zone confluence
//! - Risk-based position sizing with a three-part take-profit ladder
//! - Position lifecycle state machine with partial exits and a trailing stop
//!
//! The core does not fetch data, persist anything, or schedule itself.
//! Collaborators feed it bar series and bias records; it emits signal and
//! position event records.

pub mod config;
pub mod domain;
pub mod engine;
pub mod error;
pub mod indicators;
pub mod position;
pub mod risk;
pub mod signal;
pub mod trend;
pub mod zones;
