//! One dual-timeframe simulation run.
//!
//! Per high step `i` in the date window:
//! 1. Align the low cursor to `high[i]`.
//! 2. In a position: scan low bars of `[high[i], high[i+1])` for a risk hit.
//!    A hit commits the exit on that low bar and ends the step.
//! 3. Otherwise poll the strategy. An accepted transition is timed onto the
//!    low series and committed at the decision close, or dropped.
//!
//! After the last step an open position is squared off at the final bar.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::domain::{BarSeries, Position, SignalKind, SignalRecord, TradeRecord};
use crate::engine::ledger::{CostModel, Ledger};
use crate::engine::machine::{commit, decide, Execution, Transition};
use crate::engine::risk::{self, RiskParams, RiskScan};
use crate::engine::state::{SimulationConfig, SimulationState};
use crate::engine::sync::align;
use crate::engine::timing::{FillResolution, FillTiming};
use crate::error::EngineError;
use crate::replay::{reconcile, replay_records, ReplayError, ReplayParams, ReplayReport, RECONCILE_TOLERANCE};
use crate::strategy::Strategy;

/// Everything a finished run hands to its consumers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationReport {
    pub strategy: String,
    pub trades: Vec<TradeRecord>,
    pub signals: Vec<SignalRecord>,
    pub final_state: SimulationState,
    /// Decisions discarded by the timing resolver.
    pub dropped_fills: usize,
    /// High steps visited by the loop.
    pub high_steps: usize,
    pub replay: Option<ReplayReport>,
    #[serde(skip)]
    pub replay_error: Option<ReplayError>,
}

impl SimulationReport {
    pub fn final_capital(&self) -> f64 {
        self.final_state.capital
    }

    /// The replay report, failing if validation ran and did not reconcile.
    pub fn reconciled_replay(&self) -> Result<Option<&ReplayReport>, EngineError> {
        match &self.replay_error {
            Some(err) => Err(EngineError::Replay(err.clone())),
            None => Ok(self.replay.as_ref()),
        }
    }
}

pub struct Simulation {
    high: BarSeries,
    low: BarSeries,
    config: SimulationConfig,
}

impl Simulation {
    /// The low series is restricted to the configured date window; the high series is kept whole.
    pub fn new(high: BarSeries, low: BarSeries, config: SimulationConfig) -> Result<Self, EngineError> {
        if high.is_empty() {
            return Err(EngineError::EmptySeries(high.name().to_string()));
        }
        let low = low.window(config.entry_date, config.exit_date);
        if low.is_empty() {
            return Err(EngineError::EmptySeries(low.name().to_string()));
        }
        Ok(Self { high, low, config })
    }

    pub fn high(&self) -> &BarSeries {
        &self.high
    }

    pub fn low(&self) -> &BarSeries {
        &self.low
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    /// `(entry_index, exit_index)` on the high series.
    ///
    /// The entry index is the first bar at/after `entry_date`, the exit index
    /// the last bar at/before `exit_date`. The loop visits
    /// `entry_index..exit_index`; the exit index itself is the square-off bar.
    pub fn bounds(&self) -> Result<(usize, usize), EngineError> {
        let entry = match self.config.entry_date {
            Some(date) => self.high.first_at_or_after(date).ok_or(EngineError::EmptyWindow)?,
            None => 0,
        };
        let exit = match self.config.exit_date {
            Some(date) => self.high.last_at_or_before(date).ok_or(EngineError::EmptyWindow)?,
            None => self.high.len() - 1,
        };
        if exit < entry {
            return Err(EngineError::EmptyWindow);
        }
        Ok((entry, exit))
    }

    pub fn run(&self, strategy: &mut dyn Strategy) -> Result<SimulationReport, EngineError> {
        let (entry_index, exit_index) = self.bounds()?;
        strategy.preprocess(&self.high)?;
        let strategy: &dyn Strategy = strategy;

        info!(
            strategy = strategy.name(),
            high_bars = self.high.len(),
            low_bars = self.low.len(),
            entry_index,
            exit_index,
            "simulation started"
        );

        let config = &self.config;
        let costs = CostModel {
            slippage: config.slippage,
            leverage: config.leverage,
        };
        let risk_params = RiskParams {
            margin: config.margin,
            leverage: config.leverage,
            trailing: config.trailing,
        };

        let mut state = SimulationState::new(config);
        let mut ledger = Ledger::new();
        let mut timing = FillTiming::new(config.high_stride, config.low_stride, config.fill_tolerance);
        let mut lo = 0;
        let mut dropped_fills = 0;

        for i in entry_index..exit_index {
            lo = align(lo, i, &self.high, &self.low)?;

            if !state.position.is_flat() {
                let window_end = self.high.get(i + 1).map(|b| b.timestamp);
                if let RiskScan::Hit(hit) = risk::scan(&mut state, &self.low, lo, window_end, risk_params) {
                    let bar = &self.low.bars()[hit];
                    let execution = Execution {
                        timestamp: bar.timestamp,
                        price: bar.close,
                        source: bar,
                        kind: SignalKind::Intrabar,
                    };
                    commit(&mut state, &mut ledger, Transition::Exit, execution, costs, config.margin)?;
                    continue;
                }
            }

            let Some(transition) = decide(strategy, state.position, i) else {
                continue;
            };
            let bar = &self.high.bars()[i];
            match timing.resolve(&self.low, bar.timestamp) {
                FillResolution::Filled(slot) => {
                    let execution = Execution {
                        timestamp: slot.timestamp,
                        price: bar.close,
                        source: bar,
                        kind: SignalKind::Market,
                    };
                    commit(&mut state, &mut ledger, transition, execution, costs, config.margin)?;
                }
                FillResolution::Dropped { target } => {
                    dropped_fills += 1;
                    debug!(decision = %bar.timestamp, %target, "fill dropped, no low bar in tolerance");
                }
            }
        }

        if !state.position.is_flat() {
            self.square_off(&mut state, &mut ledger, &mut timing, entry_index, exit_index, costs)?;
        }

        let (replay, replay_error) = if config.validate_replay {
            match self.validate(&ledger, state.capital) {
                Ok(report) => (Some(report), None),
                Err(err) => {
                    warn!(error = %err, "replay validation failed");
                    (None, Some(err))
                }
            }
        } else {
            (None, None)
        };

        info!(
            strategy = strategy.name(),
            orders = ledger.len(),
            round_trips = state.trade_count,
            dropped_fills,
            capital = state.capital,
            "simulation finished"
        );

        let (trades, signals) = ledger.into_parts();
        Ok(SimulationReport {
            strategy: strategy.name().to_string(),
            trades,
            signals,
            final_state: state,
            dropped_fills,
            high_steps: exit_index - entry_index,
            replay,
            replay_error,
        })
    }

    /// Close an open position at the close of the exit bar.
    ///
    /// The fill time comes from timing the last loop decision; when that is
    /// dropped the exit bar's own timestamp is used.
    fn square_off(
        &self,
        state: &mut SimulationState,
        ledger: &mut Ledger,
        timing: &mut FillTiming,
        entry_index: usize,
        exit_index: usize,
        costs: CostModel,
    ) -> Result<(), EngineError> {
        let bar = &self.high.bars()[exit_index];
        let decision = &self.high.bars()[exit_index.saturating_sub(1).max(entry_index)];
        let timestamp = match timing.resolve(&self.low, decision.timestamp) {
            FillResolution::Filled(slot) => slot.timestamp,
            FillResolution::Dropped { .. } => bar.timestamp,
        };
        debug!(at = %timestamp, position = %state.position, "square-off at end of data");
        let execution = Execution {
            timestamp,
            price: bar.close,
            source: bar,
            kind: SignalKind::Market,
        };
        commit(state, ledger, Transition::Exit, execution, costs, self.config.margin)?;
        debug_assert_eq!(state.position, Position::Flat);
        Ok(())
    }

    fn validate(&self, ledger: &Ledger, capital: f64) -> Result<ReplayReport, ReplayError> {
        let params = ReplayParams {
            capital: self.config.initial_capital,
            slippage: self.config.slippage,
            leverage: self.config.leverage,
        };
        let report = replay_records(ledger.signals(), params)?;
        reconcile(&report, capital, RECONCILE_TOLERANCE)?;
        Ok(report)
    }
}
