//! Strategy driven by fixed per-index rules. Entries are priced at the decision close.

use std::collections::BTreeSet;

use super::{EntryDecision, EntryParams, Strategy};
use crate::domain::BarSeries;
use crate::error::EngineError;

/// When a scripted check fires.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Rule {
    #[default]
    Never,
    Always,
    At(BTreeSet<usize>),
}

impl Rule {
    pub fn at(indices: impl IntoIterator<Item = usize>) -> Self {
        Self::At(indices.into_iter().collect())
    }

    pub fn fires(&self, i: usize) -> bool {
        match self {
            Self::Never => false,
            Self::Always => true,
            Self::At(set) => set.contains(&i),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ScriptedStrategy {
    long_entry: Rule,
    short_entry: Rule,
    long_exit: Rule,
    short_exit: Rule,
    take_profit_pct: f64,
    stop_loss_pct: f64,
    closes: Vec<f64>,
}

impl ScriptedStrategy {
    pub fn new(take_profit_pct: f64, stop_loss_pct: f64) -> Self {
        Self {
            long_entry: Rule::Never,
            short_entry: Rule::Never,
            long_exit: Rule::Never,
            short_exit: Rule::Never,
            take_profit_pct,
            stop_loss_pct,
            closes: Vec::new(),
        }
    }

    pub fn long_entry(mut self, rule: Rule) -> Self {
        self.long_entry = rule;
        self
    }

    pub fn short_entry(mut self, rule: Rule) -> Self {
        self.short_entry = rule;
        self
    }

    pub fn long_exit(mut self, rule: Rule) -> Self {
        self.long_exit = rule;
        self
    }

    pub fn short_exit(mut self, rule: Rule) -> Self {
        self.short_exit = rule;
        self
    }

    fn entry(&self, rule: &Rule, i: usize) -> EntryDecision {
        match self.closes.get(i) {
            Some(&close) if rule.fires(i) => EntryDecision::Accepted(EntryParams {
                entry_price: close,
                take_profit_pct: self.take_profit_pct,
                stop_loss_pct: self.stop_loss_pct,
            }),
            _ => EntryDecision::Rejected,
        }
    }
}

impl Strategy for ScriptedStrategy {
    fn name(&self) -> &str {
        "scripted"
    }

    fn preprocess(&mut self, high: &BarSeries) -> Result<(), EngineError> {
        self.closes = high.closes();
        Ok(())
    }

    fn check_long_entry(&self, i: usize) -> EntryDecision {
        self.entry(&self.long_entry, i)
    }

    fn check_short_entry(&self, i: usize) -> EntryDecision {
        self.entry(&self.short_entry, i)
    }

    fn check_long_exit(&self, i: usize) -> bool {
        self.long_exit.fires(i)
    }

    fn check_short_exit(&self, i: usize) -> bool {
        self.short_exit.fires(i)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::bar::test_support::series;

    #[test]
    fn rules_fire_where_scripted() {
        let high = series("high", "2024-01-01", 60, &[100.0, 101.0, 102.0]);
        let mut s = ScriptedStrategy::new(0.1, 0.05)
            .long_entry(Rule::at([1]))
            .short_exit(Rule::Always);
        s.preprocess(&high).unwrap();

        assert_eq!(s.check_long_entry(0), EntryDecision::Rejected);
        let params = s.check_long_entry(1).accepted().unwrap();
        assert_eq!(params.entry_price, 101.0);
        assert_eq!(s.check_short_entry(1), EntryDecision::Rejected);
        assert!(s.check_short_exit(2));
        assert!(!s.check_long_exit(2));
    }

    #[test]
    fn entries_need_preprocessed_closes() {
        let s = ScriptedStrategy::new(0.1, 0.05).long_entry(Rule::Always);
        assert_eq!(s.check_long_entry(0), EntryDecision::Rejected);
    }
}
