//! Tandem core: a dual-timeframe backtest engine for one instrument and one position.
//!
//! - Domain types (bars, positions, signal codes, trade and signal records)
//! - Timestamp synchronizer and execution timing resolver
//! - Intrabar risk scanner and position state machine
//! - Ledger bookkeeping and the signal-stream replay validator
//! - Strategy trait with an EMA crossover and a scripted strategy

pub mod domain;
pub mod engine;
pub mod error;
pub mod indicators;
pub mod replay;
pub mod strategy;

pub use error::EngineError;
