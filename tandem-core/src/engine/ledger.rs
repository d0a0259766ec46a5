//! Capital bookkeeping and the append-only trade and signal logs.
//!
//! A transition that closes a leg charges one slippage fee on the
//! pre-transition capital and adds the levered pnl, also measured on the
//! pre-fee capital. Opening from flat is free.

use serde::{Deserialize, Serialize};

use crate::domain::{Position, SignalRecord, TradeRecord};
use crate::error::EngineError;

/// Cost parameters applied to every settlement.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CostModel {
    pub slippage: f64,
    pub leverage: f64,
}

/// Result of settling one transition against the current capital.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Settlement {
    /// Slippage charged by a closing leg (0 for a pure entry).
    pub fee: f64,
    /// Realized pnl of the closed leg (0 for a pure entry).
    pub pnl: f64,
    /// Levered return fraction of the closed leg (0 for a pure entry).
    pub return_pct: f64,
    pub capital_after: f64,
}

/// Levered return of a leg from `entry` to `exit`.
pub fn leg_return(
    entry: f64,
    exit: f64,
    side: Position,
    leverage: f64,
) -> Result<f64, EngineError> {
    if !entry.is_finite() || entry == 0.0 {
        return Err(EngineError::InvalidState(format!(
            "cannot settle a {side} leg with entry price {entry}"
        )));
    }
    if !exit.is_finite() {
        return Err(EngineError::InvalidState(format!(
            "non-finite exit price {exit}"
        )));
    }
    Ok((exit - entry) / entry * side.direction() * leverage)
}

/// Settle a transition. `closing` is the side being closed, or `None` for a pure entry.
pub fn settle(
    capital: f64,
    closing: Option<(Position, f64)>,
    exit_price: f64,
    costs: CostModel,
) -> Result<Settlement, EngineError> {
    if !capital.is_finite() {
        return Err(EngineError::InvalidState(format!(
            "non-finite capital {capital}"
        )));
    }
    let (fee, return_pct) = match closing {
        Some((side, entry)) => (
            capital * costs.slippage,
            leg_return(entry, exit_price, side, costs.leverage)?,
        ),
        None => (0.0, 0.0),
    };
    let pnl = capital * return_pct;
    let capital_after = capital - fee + pnl;
    if !capital_after.is_finite() {
        return Err(EngineError::InvalidState(format!(
            "settlement produced non-finite capital from {capital}"
        )));
    }
    Ok(Settlement {
        fee,
        pnl,
        return_pct,
        capital_after,
    })
}

/// Append-only logs for one run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Ledger {
    trades: Vec<TradeRecord>,
    signals: Vec<SignalRecord>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one committed transition. Both logs always grow together.
    pub fn record(&mut self, trade: TradeRecord, signal: SignalRecord) {
        self.trades.push(trade);
        self.signals.push(signal);
    }

    pub fn trades(&self) -> &[TradeRecord] {
        &self.trades
    }

    pub fn signals(&self) -> &[SignalRecord] {
        &self.signals
    }

    pub fn len(&self) -> usize {
        self.trades.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trades.is_empty()
    }

    /// Sum of the fees on every trade record.
    pub fn fee_sum(&self) -> f64 {
        self.trades.iter().map(|t| t.fee).sum()
    }

    /// Capital after the last recorded order, if any.
    pub fn last_capital(&self) -> Option<f64> {
        self.trades.last().map(|t| t.capital_after)
    }

    pub fn into_parts(self) -> (Vec<TradeRecord>, Vec<SignalRecord>) {
        (self.trades, self.signals)
    }
}
