//! Append-only log records: one TradeRecord per executed order, one SignalRecord per emitted signal.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use super::bar::Bar;
use super::position::{Position, SignalCode};

/// How an order came to be executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderKind {
    /// Strategy decision or end-of-data square-off.
    Market,
    TakeProfit,
    StopLoss,
    MarginCall,
}

impl OrderKind {
    /// Label used in the `order_type` column of the trade ledger.
    pub fn label(self) -> &'static str {
        match self {
            Self::Market => "Market",
            Self::TakeProfit => "TP",
            Self::StopLoss => "SL",
            Self::MarginCall => "Margin",
        }
    }
}

/// Whether a signal came from a strategy decision or from the intrabar risk scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalKind {
    Market,
    Intrabar,
}

/// One executed order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    /// Resolved fill time (not the decision time).
    pub timestamp: NaiveDateTime,
    pub executed_price: f64,
    /// Capital after fee and realized pnl of this order.
    pub capital_after: f64,
    pub signal: SignalCode,
    pub resulting_position: Position,
    pub order_kind: OrderKind,
    /// Levered return of the closed leg; 0 for a pure entry.
    pub pnl_pct: f64,
    /// Hard stop level of the newly opened leg; `None` when the order leaves the book flat.
    pub stop_loss_level: Option<f64>,
    /// Slippage charged by this order.
    pub fee: f64,
}

/// One emitted signal, carrying the OHLCV of the bar it was generated from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalRecord {
    /// Resolved fill time (not the decision time).
    pub timestamp: NaiveDateTime,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub signal: SignalCode,
    pub kind: SignalKind,
}

impl SignalRecord {
    pub fn from_bar(bar: &Bar, timestamp: NaiveDateTime, signal: SignalCode, kind: SignalKind) -> Self {
        Self {
            timestamp,
            open: bar.open,
            high: bar.high,
            low: bar.low,
            close: bar.close,
            volume: bar.volume,
            signal,
            kind,
        }
    }
}
