//! Strategy interface: four decision checks on the high-timeframe index.
//!
//! Entry checks return the trade parameters together with the decision, so
//! the engine applies them only when the transition is actually committed.
//! Exit checks are plain booleans.

pub mod ema_crossover;
pub mod scripted;

pub use ema_crossover::EmaCrossover;
pub use scripted::{Rule, ScriptedStrategy};

use serde::{Deserialize, Serialize};

use crate::domain::BarSeries;
use crate::error::EngineError;

/// Parameters a strategy attaches to an accepted entry.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EntryParams {
    pub entry_price: f64,
    pub take_profit_pct: f64,
    pub stop_loss_pct: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EntryDecision {
    Accepted(EntryParams),
    Rejected,
}

impl EntryDecision {
    pub fn accepted(self) -> Option<EntryParams> {
        match self {
            Self::Accepted(params) => Some(params),
            Self::Rejected => None,
        }
    }
}

/// A directional strategy polled once per high-timeframe step.
///
/// Implementations must only look at bars `0..=i` when answering for index `i`.
pub trait Strategy: Send {
    fn name(&self) -> &str;

    /// Runs once before the first step. Derive indicator columns here.
    fn preprocess(&mut self, _high: &BarSeries) -> Result<(), EngineError> {
        Ok(())
    }

    fn check_long_entry(&self, i: usize) -> EntryDecision;

    fn check_short_entry(&self, i: usize) -> EntryDecision;

    fn check_long_exit(&self, i: usize) -> bool;

    fn check_short_exit(&self, i: usize) -> bool;
}
