//! Replay validator: recompute capital from signal codes and closes alone.
//!
//! The replay never looks at trade records. A code that closes a leg charges
//! one fee on the current capital and adds the levered pnl measured against
//! the close at which that leg was opened. Entries from flat are free. Codes
//! `±2` close and reopen on the same row.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::domain::{Position, SignalCode, SignalRecord};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ReplayError {
    #[error("row {row}: signal {code} is not valid while {position}")]
    InvalidTransition {
        row: usize,
        code: SignalCode,
        position: Position,
    },

    #[error("row {row}: close {price} cannot be used as a price")]
    InvalidPrice { row: usize, price: f64 },

    #[error("replayed capital {replayed} diverges from ledger capital {ledger}")]
    Diverged { replayed: f64, ledger: f64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReplayParams {
    pub capital: f64,
    pub slippage: f64,
    pub leverage: f64,
}

/// State after one signal row.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReplayStep {
    pub signal: SignalCode,
    pub close: f64,
    pub capital: f64,
    pub fee: f64,
    /// Realized pnl when this row closed a leg.
    pub pnl: Option<f64>,
    /// Levered return of the closed leg.
    pub ret: Option<f64>,
    /// Position after this row.
    pub position: Position,
    /// Side of the leg opened on this row, if any.
    pub opened: Option<Position>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplayReport {
    pub initial_capital: f64,
    pub final_capital: f64,
    pub total_fees: f64,
    /// Closing legs seen in the stream.
    pub round_trips: usize,
    pub final_position: Position,
    pub steps: Vec<ReplayStep>,
}

/// Replay a stream of `(signal, close)` rows.
pub fn replay<I>(rows: I, params: ReplayParams) -> Result<ReplayReport, ReplayError>
where
    I: IntoIterator<Item = (SignalCode, f64)>,
{
    let mut capital = params.capital;
    let mut position = Position::Flat;
    let mut entry = 0.0;
    let mut total_fees = 0.0;
    let mut round_trips = 0;
    let mut steps = Vec::new();

    for (row, (signal, close)) in rows.into_iter().enumerate() {
        let next = signal.apply(position).ok_or(ReplayError::InvalidTransition {
            row,
            code: signal,
            position,
        })?;

        if signal == SignalCode::Hold {
            steps.push(ReplayStep {
                signal,
                close,
                capital,
                fee: 0.0,
                pnl: None,
                ret: None,
                position,
                opened: None,
            });
            continue;
        }

        if !close.is_finite() || close <= 0.0 {
            return Err(ReplayError::InvalidPrice { row, price: close });
        }

        let (fee, pnl, ret) = if position.is_flat() {
            (0.0, None, None)
        } else {
            let ret = (close - entry) / entry * position.direction() * params.leverage;
            (capital * params.slippage, Some(capital * ret), Some(ret))
        };
        capital = capital - fee + pnl.unwrap_or(0.0);
        total_fees += fee;
        if pnl.is_some() {
            round_trips += 1;
        }

        let opened = (!next.is_flat()).then_some(next);
        if opened.is_some() {
            entry = close;
        }
        position = next;

        steps.push(ReplayStep {
            signal,
            close,
            capital,
            fee,
            pnl,
            ret,
            position,
            opened,
        });
    }

    Ok(ReplayReport {
        initial_capital: params.capital,
        final_capital: capital,
        total_fees,
        round_trips,
        final_position: position,
        steps,
    })
}

/// Replay the persisted signal stream of a run.
pub fn replay_records(
    records: &[SignalRecord],
    params: ReplayParams,
) -> Result<ReplayReport, ReplayError> {
    replay(records.iter().map(|r| (r.signal, r.close)), params)
}

/// Relative tolerance used when comparing replayed and ledger capital.
pub const RECONCILE_TOLERANCE: f64 = 1e-9;

/// Check that the replayed final capital matches the ledger's.
pub fn reconcile(report: &ReplayReport, ledger_capital: f64, tolerance: f64) -> Result<(), ReplayError> {
    let scale = ledger_capital.abs().max(1.0);
    if (report.final_capital - ledger_capital).abs() <= tolerance * scale {
        Ok(())
    } else {
        warn!(
            replayed = report.final_capital,
            ledger = ledger_capital,
            "replay does not reconcile with ledger"
        );
        Err(ReplayError::Diverged {
            replayed: report.final_capital,
            ledger: ledger_capital,
        })
    }
}
