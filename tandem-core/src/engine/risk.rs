//! Intrabar risk scanner.
//!
//! Within one high interval `[high[i].ts, high[i+1].ts)` the low bars are
//! scanned in order. Each bar first updates the trailing extreme, then four
//! exit conditions are OR-ed together:
//!
//! - target reached: `entry + d·entry·tp` crossed favorably
//! - hard stop: `entry − d·entry·sl` crossed adversely
//! - trailing stop (trailing mode only): `extreme − d·extreme·sl` crossed adversely
//! - margin maintenance: `entry − d·(margin/leverage)·entry` crossed adversely
//!
//! The first bar where any condition holds wins. Which condition fired is not
//! recorded; `classify_exit` labels the exit afterwards from the realized pnl.

use chrono::NaiveDateTime;

use crate::domain::{BarSeries, OrderKind, Position};
use crate::engine::state::SimulationState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RiskScan {
    Hit(usize),
    NoHit,
}

/// Price levels derived from the current entry.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RiskLevels {
    pub target: f64,
    pub stop: f64,
    pub trailing_stop: f64,
    pub margin: f64,
}

impl RiskLevels {
    pub fn from_state(state: &SimulationState, margin: f64, leverage: f64) -> Self {
        let d = state.direction();
        let entry = state.entry_price;
        let extreme = state.trailing_extreme_price;
        Self {
            target: entry + d * entry * state.take_profit_pct,
            stop: entry - d * entry * state.stop_loss_pct,
            trailing_stop: extreme - d * extreme * state.stop_loss_pct,
            margin: entry - d * margin / leverage * entry,
        }
    }

    /// True when `close` breaches any level for a position on side `position`.
    pub fn breached(&self, position: Position, close: f64, trailing: bool) -> bool {
        match position {
            Position::Long => {
                self.target <= close
                    || self.stop >= close
                    || (trailing && self.trailing_stop >= close)
                    || self.margin >= close
            }
            Position::Short => {
                self.target >= close
                    || self.stop <= close
                    || (trailing && self.trailing_stop <= close)
                    || self.margin <= close
            }
            Position::Flat => false,
        }
    }
}

/// Risk parameters that stay fixed for the whole run.
#[derive(Debug, Clone, Copy)]
pub struct RiskParams {
    pub margin: f64,
    pub leverage: f64,
    pub trailing: bool,
}

/// Scan low bars from `start` until `window_end` (exclusive; `None` = unbounded).
///
/// Mutates the trailing extreme on `state` for every bar visited.
pub fn scan(
    state: &mut SimulationState,
    low: &BarSeries,
    start: usize,
    window_end: Option<NaiveDateTime>,
    params: RiskParams,
) -> RiskScan {
    let position = state.position;
    if position.is_flat() {
        return RiskScan::NoHit;
    }

    for (index, bar) in low.bars().iter().enumerate().skip(start) {
        if window_end.is_some_and(|end| bar.timestamp >= end) {
            break;
        }
        let close = bar.close;
        state.trailing_extreme_price = match position {
            Position::Long => state.trailing_extreme_price.max(close),
            Position::Short => state.trailing_extreme_price.min(close),
            Position::Flat => state.trailing_extreme_price,
        };
        let levels = RiskLevels::from_state(state, params.margin, params.leverage);
        if levels.breached(position, close, params.trailing) {
            return RiskScan::Hit(index);
        }
    }
    RiskScan::NoHit
}

/// Label an intrabar exit after the fact.
///
/// Profitable exits are `TakeProfit` regardless of which level fired; losing
/// exits are `StopLoss` when the margin distance exceeds the stop distance,
/// otherwise `MarginCall`.
pub fn classify_exit(pnl: f64, margin: f64, leverage: f64, stop_loss_pct: f64) -> OrderKind {
    if pnl > 0.0 {
        OrderKind::TakeProfit
    } else if margin / leverage > stop_loss_pct {
        OrderKind::StopLoss
    } else {
        OrderKind::MarginCall
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::bar::test_support::{series, ts};
    use crate::engine::state::SimulationConfig;
    use chrono::Duration;

    fn long_at(entry: f64) -> SimulationState {
        let config = SimulationConfig::new(1000.0, Duration::hours(1), Duration::minutes(5));
        let mut state = SimulationState::new(&config);
        state.position = Position::Long;
        state.entry_price = entry;
        state.trailing_extreme_price = entry;
        state.take_profit_pct = 0.1;
        state.stop_loss_pct = 0.05;
        state
    }

    const WIDE_MARGIN: RiskParams = RiskParams {
        margin: 0.5,
        leverage: 1.0,
        trailing: false,
    };

    #[test]
    fn take_profit_hits_at_first_close_at_target() {
        let low = series("low", "2024-01-01", 5, &[101.0, 104.0, 109.9, 110.0, 94.0]);
        let mut state = long_at(100.0);
        assert_eq!(scan(&mut state, &low, 0, None, WIDE_MARGIN), RiskScan::Hit(3));
    }

    #[test]
    fn stop_loss_hits_for_long() {
        let low = series("low", "2024-01-01", 5, &[99.0, 96.0, 95.0, 120.0]);
        let mut state = long_at(100.0);
        assert_eq!(scan(&mut state, &low, 0, None, WIDE_MARGIN), RiskScan::Hit(2));
    }

    #[test]
    fn short_conditions_are_mirrored() {
        let low = series("low", "2024-01-01", 5, &[99.0, 92.0, 90.0]);
        let mut state = long_at(100.0);
        state.position = Position::Short;
        assert_eq!(scan(&mut state, &low, 0, None, WIDE_MARGIN), RiskScan::Hit(2));
    }

    #[test]
    fn window_end_is_exclusive() {
        let low = series("low", "2024-01-01", 5, &[101.0, 102.0, 111.0]);
        let mut state = long_at(100.0);
        let end = ts("2024-01-01 00:10:00");
        assert_eq!(scan(&mut state, &low, 0, Some(end), WIDE_MARGIN), RiskScan::NoHit);
        // Trailing extreme still advanced over the visited bars.
        assert_eq!(state.trailing_extreme_price, 102.0);
    }

    #[test]
    fn trailing_stop_only_when_enabled() {
        // Runs up to 108, falls back to 102: 108 * 0.95 = 102.6 ≥ 102.
        let closes = [104.0, 108.0, 102.0];
        let low = series("low", "2024-01-01", 5, &closes);

        let mut state = long_at(100.0);
        assert_eq!(scan(&mut state, &low, 0, None, WIDE_MARGIN), RiskScan::NoHit);

        let mut state = long_at(100.0);
        let params = RiskParams {
            trailing: true,
            ..WIDE_MARGIN
        };
        assert_eq!(scan(&mut state, &low, 0, None, params), RiskScan::Hit(2));
    }

    #[test]
    fn margin_price_tightens_with_leverage() {
        // margin 0.1 at 5x leverage → 2% away from entry.
        let low = series("low", "2024-01-01", 5, &[99.0, 98.0]);
        let mut state = long_at(100.0);
        let params = RiskParams {
            margin: 0.1,
            leverage: 5.0,
            trailing: false,
        };
        assert_eq!(scan(&mut state, &low, 0, None, params), RiskScan::Hit(1));
    }

    #[test]
    fn flat_state_never_hits() {
        let low = series("low", "2024-01-01", 5, &[1.0, 1000.0]);
        let mut state = long_at(100.0);
        state.position = Position::Flat;
        assert_eq!(scan(&mut state, &low, 0, None, WIDE_MARGIN), RiskScan::NoHit);
    }

    #[test]
    fn classification_uses_pnl_sign_then_margin_heuristic() {
        assert_eq!(classify_exit(5.0, 0.02, 1.0, 0.05), OrderKind::TakeProfit);
        assert_eq!(classify_exit(-5.0, 0.5, 1.0, 0.05), OrderKind::StopLoss);
        assert_eq!(classify_exit(-5.0, 0.02, 1.0, 0.05), OrderKind::MarginCall);
        // A flat exit is not profitable.
        assert_eq!(classify_exit(0.0, 0.5, 1.0, 0.05), OrderKind::StopLoss);
    }
}
