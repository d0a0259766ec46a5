//! Simulation configuration and the mutable state threaded through one run.

use chrono::{Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::domain::Position;
use crate::engine::timing::DEFAULT_FILL_TOLERANCE_MINUTES;

/// Parameters for a single simulation run.
#[derive(Debug, Clone)]
pub struct SimulationConfig {
    pub initial_capital: f64,
    /// Fraction of capital charged on every executed order.
    pub slippage: f64,
    /// Maintenance margin fraction; the margin price sits `margin / leverage` away from entry.
    pub margin: f64,
    pub leverage: f64,
    /// Enables the trailing stop in the intrabar scan.
    pub trailing: bool,
    /// Initial take-profit fraction until a strategy entry overrides it.
    pub take_profit_pct: f64,
    /// Initial stop-loss fraction until a strategy entry overrides it.
    pub stop_loss_pct: f64,
    pub high_stride: Duration,
    pub low_stride: Duration,
    pub fill_tolerance: Duration,
    pub entry_date: Option<NaiveDateTime>,
    pub exit_date: Option<NaiveDateTime>,
    /// Re-derive capital from the signal stream after the run and compare.
    pub validate_replay: bool,
}

impl SimulationConfig {
    pub fn new(initial_capital: f64, high_stride: Duration, low_stride: Duration) -> Self {
        Self {
            initial_capital,
            slippage: 0.0,
            margin: 1.0,
            leverage: 1.0,
            trailing: false,
            take_profit_pct: 0.1,
            stop_loss_pct: 0.05,
            high_stride,
            low_stride,
            fill_tolerance: Duration::minutes(DEFAULT_FILL_TOLERANCE_MINUTES),
            entry_date: None,
            exit_date: None,
            validate_replay: true,
        }
    }
}

/// Mutable record owned by exactly one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationState {
    pub position: Position,
    pub entry_price: f64,
    pub take_profit_pct: f64,
    pub stop_loss_pct: f64,
    /// Best close seen since entry (max when Long, min when Short).
    pub trailing_extreme_price: f64,
    pub capital: f64,
    pub total_fees: f64,
    /// Closing legs executed (exits, flips and square-offs).
    pub trade_count: usize,
}

impl SimulationState {
    pub fn new(config: &SimulationConfig) -> Self {
        Self {
            position: Position::Flat,
            entry_price: 0.0,
            take_profit_pct: config.take_profit_pct,
            stop_loss_pct: config.stop_loss_pct,
            trailing_extreme_price: 0.0,
            capital: config.initial_capital,
            total_fees: 0.0,
            trade_count: 0,
        }
    }

    /// +1 Long, -1 Short, 0 Flat.
    pub fn direction(&self) -> f64 {
        self.position.direction()
    }

    /// Hard stop level for the current entry.
    pub fn stop_level(&self) -> f64 {
        self.entry_price - self.direction() * self.entry_price * self.stop_loss_pct
    }
}
