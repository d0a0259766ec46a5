//! Fast/slow EMA crossover: fast above slow wants long, fast below slow wants short.
//!
//! There are no discretionary exits. A long is closed by the risk scanner or
//! flipped when the fast EMA drops below the slow one, and vice versa.

use super::{EntryDecision, EntryParams, Strategy};
use crate::domain::BarSeries;
use crate::error::EngineError;
use crate::indicators::{Ema, Indicator};

#[derive(Debug, Clone)]
pub struct EmaCrossover {
    fast: Ema,
    slow: Ema,
    take_profit_pct: f64,
    stop_loss_pct: f64,
    name: String,
    closes: Vec<f64>,
    fast_values: Vec<f64>,
    slow_values: Vec<f64>,
}

impl EmaCrossover {
    pub fn new(fast_period: usize, slow_period: usize, take_profit_pct: f64, stop_loss_pct: f64) -> Self {
        Self {
            fast: Ema::new(fast_period),
            slow: Ema::new(slow_period),
            take_profit_pct,
            stop_loss_pct,
            name: format!("ema_crossover_{fast_period}_{slow_period}"),
            closes: Vec::new(),
            fast_values: Vec::new(),
            slow_values: Vec::new(),
        }
    }

    fn values_at(&self, i: usize) -> Option<(f64, f64, f64)> {
        let close = *self.closes.get(i)?;
        let fast = *self.fast_values.get(i)?;
        let slow = *self.slow_values.get(i)?;
        if close.is_nan() || fast.is_nan() || slow.is_nan() {
            return None;
        }
        Some((close, fast, slow))
    }

    fn entry_at(&self, close: f64) -> EntryDecision {
        EntryDecision::Accepted(EntryParams {
            entry_price: close,
            take_profit_pct: self.take_profit_pct,
            stop_loss_pct: self.stop_loss_pct,
        })
    }
}

impl Strategy for EmaCrossover {
    fn name(&self) -> &str {
        &self.name
    }

    fn preprocess(&mut self, high: &BarSeries) -> Result<(), EngineError> {
        if high.is_empty() {
            return Err(EngineError::EmptySeries(high.name().to_string()));
        }
        self.closes = high.closes();
        self.fast_values = self.fast.compute(high.bars());
        self.slow_values = self.slow.compute(high.bars());
        Ok(())
    }

    fn check_long_entry(&self, i: usize) -> EntryDecision {
        match self.values_at(i) {
            Some((close, fast, slow)) if fast > slow => self.entry_at(close),
            _ => EntryDecision::Rejected,
        }
    }

    fn check_short_entry(&self, i: usize) -> EntryDecision {
        match self.values_at(i) {
            Some((close, fast, slow)) if fast < slow => self.entry_at(close),
            _ => EntryDecision::Rejected,
        }
    }

    fn check_long_exit(&self, _i: usize) -> bool {
        false
    }

    fn check_short_exit(&self, _i: usize) -> bool {
        false
    }
}
