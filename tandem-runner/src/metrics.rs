//! Performance metrics computed from a run's signal stream.
//!
//! Capital is re-derived through the replay validator, so these numbers
//! depend on nothing but signal codes, closes and the cost parameters. The
//! individual metrics are pure functions over slices; every one of them
//! returns 0.0 on empty or degenerate input instead of NaN.

use serde::{Deserialize, Serialize};

use tandem_core::domain::{Position, SignalRecord};
use tandem_core::replay::{replay_records, ReplayError, ReplayParams, ReplayReport};

/// Periods per year used to annualize per-trade ratios.
const ANNUALIZATION_PERIODS: f64 = 365.0;

/// Aggregate statistics for one backtest.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    pub final_balance: f64,
    /// Sum of capital gained on winning closes.
    pub gross_profit: f64,
    /// Sum of capital lost on losing closes (non-positive).
    pub gross_loss: f64,
    pub net_profit: f64,
    pub total_long_trades: usize,
    pub total_short_trades: usize,
    /// Percent of closed legs with positive pnl.
    pub win_rate: f64,
    /// Percent of closed legs with negative pnl.
    pub loss_rate: f64,
    pub avg_winning_trade: f64,
    pub avg_losing_trade: f64,
    pub largest_winning_trade: f64,
    pub largest_losing_trade: f64,
    /// Buy-and-hold over the same signal rows, net of one entry fee.
    pub buy_and_hold_return: f64,
    /// Worst peak-to-trough capital move, in percent (non-positive).
    pub max_drawdown_pct: f64,
    pub sharpe_ratio: f64,
    pub sortino_ratio: f64,
    pub maximum_pnl: f64,
    pub minimum_pnl: f64,
    /// Mean leg duration in seconds.
    pub average_holding_secs: f64,
    pub maximum_holding_secs: f64,
    pub min_portfolio_balance: f64,
    pub max_portfolio_balance: f64,
    /// Closed legs.
    pub num_of_trades: usize,
    pub total_fee: f64,
}

impl PerformanceMetrics {
    /// Replay `signals` and compute every metric from the result.
    pub fn compute(signals: &[SignalRecord], params: ReplayParams) -> Result<Self, ReplayError> {
        let report = replay_records(signals, params)?;
        Ok(Self::from_replay(signals, &report, params.slippage))
    }

    /// Compute from an existing replay of `signals` run with `slippage`.
    pub fn from_replay(signals: &[SignalRecord], report: &ReplayReport, slippage: f64) -> Self {
        let initial = report.initial_capital;
        let steps = &report.steps;
        if steps.is_empty() {
            return Self {
                final_balance: initial,
                min_portfolio_balance: initial,
                max_portfolio_balance: initial,
                ..Self::default()
            };
        }

        // Capital curve starting from the initial balance, one point per row.
        let curve: Vec<f64> = std::iter::once(initial)
            .chain(steps.iter().map(|s| s.capital))
            .collect();

        let mut gross_profit = 0.0;
        let mut gross_loss = 0.0;
        let mut pnls = Vec::new();
        let mut returns = Vec::new();
        for (row, step) in steps.iter().enumerate() {
            let (Some(pnl), Some(ret)) = (step.pnl, step.ret) else {
                continue;
            };
            let delta = curve[row + 1] - curve[row];
            if pnl > 0.0 {
                gross_profit += delta;
            } else if pnl < 0.0 {
                gross_loss += delta;
            }
            pnls.push(pnl);
            returns.push(ret);
        }

        let winners: Vec<f64> = pnls.iter().copied().filter(|p| *p > 0.0).collect();
        let losers: Vec<f64> = pnls.iter().copied().filter(|p| *p < 0.0).collect();
        let opened = |side| steps.iter().filter(|s| s.opened == Some(side)).count();

        let durations = holding_durations(signals, report);
        let final_balance = report.final_capital;

        Self {
            final_balance,
            gross_profit,
            gross_loss,
            net_profit: final_balance - initial,
            total_long_trades: opened(Position::Long),
            total_short_trades: opened(Position::Short),
            win_rate: percent(winners.len(), pnls.len()),
            loss_rate: percent(losers.len(), pnls.len()),
            avg_winning_trade: mean(&winners),
            avg_losing_trade: mean(&losers),
            largest_winning_trade: winners.iter().copied().fold(0.0, f64::max),
            largest_losing_trade: losers.iter().copied().fold(0.0, f64::min),
            buy_and_hold_return: buy_and_hold_return(signals, initial, slippage),
            max_drawdown_pct: max_drawdown_pct(&curve),
            sharpe_ratio: sharpe_ratio(&returns),
            sortino_ratio: sortino_ratio(&returns),
            maximum_pnl: max_or_zero(&pnls),
            minimum_pnl: min_or_zero(&pnls),
            average_holding_secs: mean(&durations),
            maximum_holding_secs: max_or_zero(&durations),
            min_portfolio_balance: curve.iter().copied().fold(f64::INFINITY, f64::min),
            max_portfolio_balance: curve.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            num_of_trades: report.round_trips,
            total_fee: report.total_fees,
        }
    }
}

// ─── Individual metric functions ────────────────────────────────────

/// `count / total` as a percentage; 0 when `total` is 0.
pub fn percent(count: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    count as f64 / total as f64 * 100.0
}

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sample standard deviation (n - 1 denominator); 0 below two values.
pub fn sample_std(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    let var = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    var.sqrt()
}

fn max_or_zero(values: &[f64]) -> f64 {
    values.iter().copied().reduce(f64::max).unwrap_or(0.0)
}

fn min_or_zero(values: &[f64]) -> f64 {
    values.iter().copied().reduce(f64::min).unwrap_or(0.0)
}

/// Largest drop from a running peak, as a (non-positive) percentage.
pub fn max_drawdown_pct(curve: &[f64]) -> f64 {
    let mut peak = f64::NEG_INFINITY;
    let mut worst = 0.0_f64;
    for &capital in curve {
        peak = peak.max(capital);
        if peak > 0.0 {
            worst = worst.min((capital - peak) / peak * 100.0);
        }
    }
    worst
}

/// Annualized mean/std of non-zero per-leg returns.
pub fn sharpe_ratio(returns: &[f64]) -> f64 {
    let nonzero: Vec<f64> = returns.iter().copied().filter(|r| *r != 0.0).collect();
    let std = sample_std(&nonzero);
    if std < 1e-15 {
        return 0.0;
    }
    mean(&nonzero) / std * ANNUALIZATION_PERIODS.sqrt()
}

/// Like [`sharpe_ratio`], with the deviation taken over losing legs only.
pub fn sortino_ratio(returns: &[f64]) -> f64 {
    let nonzero: Vec<f64> = returns.iter().copied().filter(|r| *r != 0.0).collect();
    let downside: Vec<f64> = nonzero.iter().copied().filter(|r| *r < 0.0).collect();
    let std = sample_std(&downside);
    if std < 1e-15 {
        return 0.0;
    }
    mean(&nonzero) / std * ANNUALIZATION_PERIODS.sqrt()
}

/// Capital change from holding between the first and last signal close.
pub fn buy_and_hold_return(signals: &[SignalRecord], capital: f64, slippage: f64) -> f64 {
    let (Some(first), Some(last)) = (signals.first(), signals.last()) else {
        return 0.0;
    };
    if first.close <= 0.0 {
        return 0.0;
    }
    (last.close - first.close) / first.close * capital - capital * slippage
}

/// Seconds from each leg's opening row to the row that closed it.
pub fn holding_durations(signals: &[SignalRecord], report: &ReplayReport) -> Vec<f64> {
    let mut opened_at = None;
    let mut durations = Vec::new();
    for (signal, step) in signals.iter().zip(&report.steps) {
        if step.pnl.is_some() {
            if let Some(start) = opened_at.take() {
                let held: chrono::Duration = signal.timestamp - start;
                durations.push(held.num_seconds() as f64);
            }
        }
        if step.opened.is_some() {
            opened_at = Some(signal.timestamp);
        }
    }
    durations
}
