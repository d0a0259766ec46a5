//! Indicator trait and the indicators strategies precompute in `preprocess`.
//!
//! Indicators are pure functions over the high series: bars in, one value per
//! bar out. No value at bar t may depend on bars after t.

pub mod ema;

pub use ema::{ema_of_series, Ema};

use crate::domain::Bar;

pub trait Indicator: Send + Sync {
    /// Human-readable name (e.g., "ema_9").
    fn name(&self) -> &str;

    /// Number of leading values that are not yet meaningful.
    fn lookback(&self) -> usize;

    /// Compute the indicator for the whole series. Output has the same length as `bars`.
    fn compute(&self, bars: &[Bar]) -> Vec<f64>;
}

#[cfg(test)]
pub fn assert_approx(actual: f64, expected: f64, epsilon: f64) {
    assert!(
        (actual - expected).abs() < epsilon,
        "assert_approx failed: actual={actual}, expected={expected}, diff={}, epsilon={epsilon}",
        (actual - expected).abs()
    );
}

#[cfg(test)]
pub const DEFAULT_EPSILON: f64 = 1e-10;
