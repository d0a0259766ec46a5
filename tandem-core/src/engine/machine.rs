//! Position state machine: decides the transition for a step and commits it.
//!
//! ```text
//!          Buy(1)             FlipToShort(-2)
//!   Flat ─────────► Long ───────────────────► Short
//!    ▲  ◄─────────   │  ◄───────────────────   │
//!    │    Sell(-1)       FlipToLong(2)         │
//!    └─────────────────────────────────────────┘
//!         Buy(1) closes Short / Sell(-1) opens Short
//! ```
//!
//! A commit is the only place `SimulationState` changes position, capital or
//! entry parameters, and it always appends one trade record and one signal
//! record.

use chrono::NaiveDateTime;
use tracing::debug;

use crate::domain::{Bar, OrderKind, Position, SignalCode, SignalKind, SignalRecord, TradeRecord};
use crate::engine::ledger::{settle, CostModel, Ledger};
use crate::engine::risk::classify_exit;
use crate::engine::state::SimulationState;
use crate::error::EngineError;
use crate::strategy::{EntryParams, Strategy};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Transition {
    /// Open a position from flat.
    Enter(Position, EntryParams),
    /// Close the current position.
    Exit,
    /// Close the current position and open the opposite one in a single order.
    Flip(EntryParams),
}

impl Transition {
    /// Position reached when this transition is applied in `from`.
    pub fn target(&self, from: Position) -> Position {
        match self {
            Self::Enter(side, _) => *side,
            Self::Exit => Position::Flat,
            Self::Flip(_) => from.opposite(),
        }
    }

    fn params(&self) -> Option<EntryParams> {
        match self {
            Self::Enter(_, params) | Self::Flip(params) => Some(*params),
            Self::Exit => None,
        }
    }
}

/// Poll the strategy for the transition wanted at high index `i`.
///
/// From flat the long entry is asked first and the short entry only when the
/// long one is rejected. In a position, a flip wins over a plain exit.
pub fn decide(strategy: &dyn Strategy, position: Position, i: usize) -> Option<Transition> {
    match position {
        Position::Flat => {
            if let Some(params) = strategy.check_long_entry(i).accepted() {
                Some(Transition::Enter(Position::Long, params))
            } else {
                strategy
                    .check_short_entry(i)
                    .accepted()
                    .map(|params| Transition::Enter(Position::Short, params))
            }
        }
        Position::Long => {
            if let Some(params) = strategy.check_short_entry(i).accepted() {
                Some(Transition::Flip(params))
            } else if strategy.check_long_exit(i) {
                Some(Transition::Exit)
            } else {
                None
            }
        }
        Position::Short => {
            if let Some(params) = strategy.check_long_entry(i).accepted() {
                Some(Transition::Flip(params))
            } else if strategy.check_short_exit(i) {
                Some(Transition::Exit)
            } else {
                None
            }
        }
    }
}

/// Where and at what price an order was executed.
#[derive(Debug, Clone, Copy)]
pub struct Execution<'a> {
    /// Resolved fill time.
    pub timestamp: NaiveDateTime,
    pub price: f64,
    /// Bar whose OHLCV goes into the signal record.
    pub source: &'a Bar,
    pub kind: SignalKind,
}

/// Apply `transition` to `state` and append the resulting records to `ledger`.
pub fn commit(
    state: &mut SimulationState,
    ledger: &mut Ledger,
    transition: Transition,
    execution: Execution<'_>,
    costs: CostModel,
    margin: f64,
) -> Result<(), EngineError> {
    let from = state.position;
    let to = transition.target(from);
    let signal = SignalCode::for_transition(from, to).ok_or_else(|| {
        EngineError::InvalidState(format!("no transition from {from} to {to}"))
    })?;

    if let Some(params) = transition.params() {
        if !params.entry_price.is_finite() || params.entry_price <= 0.0 {
            return Err(EngineError::InvalidState(format!(
                "entry price {} is not a positive number",
                params.entry_price
            )));
        }
    }

    let closing = (!from.is_flat()).then_some((from, state.entry_price));
    let settlement = settle(state.capital, closing, execution.price, costs)?;

    let order_kind = match execution.kind {
        SignalKind::Intrabar => classify_exit(
            settlement.pnl,
            margin,
            costs.leverage,
            state.stop_loss_pct,
        ),
        SignalKind::Market => OrderKind::Market,
    };

    state.capital = settlement.capital_after;
    state.total_fees += settlement.fee;
    if closing.is_some() {
        state.trade_count += 1;
    }
    state.position = to;
    if let Some(params) = transition.params() {
        state.entry_price = params.entry_price;
        state.take_profit_pct = params.take_profit_pct;
        state.stop_loss_pct = params.stop_loss_pct;
        state.trailing_extreme_price = params.entry_price;
    }

    debug!(
        at = %execution.timestamp,
        signal = signal.value(),
        position = %to,
        price = execution.price,
        capital = state.capital,
        kind = order_kind.label(),
        "order committed"
    );

    ledger.record(
        TradeRecord {
            timestamp: execution.timestamp,
            executed_price: execution.price,
            capital_after: state.capital,
            signal,
            resulting_position: to,
            order_kind,
            pnl_pct: settlement.return_pct,
            stop_loss_level: (!to.is_flat()).then(|| state.stop_level()),
            fee: settlement.fee,
        },
        SignalRecord::from_bar(execution.source, execution.timestamp, signal, execution.kind),
    );
    Ok(())
}
