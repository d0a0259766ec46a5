//! Exponential Moving Average, recursive form without bias adjustment.
//!
//! EMA[0] = close[0]; EMA[t] = alpha * close[t] + (1 - alpha) * EMA[t-1],
//! alpha = 2 / (span + 1). Every index carries a value, so lookback is 0.
//! A NaN close taints every later value.

use super::Indicator;
use crate::domain::Bar;

#[derive(Debug, Clone)]
pub struct Ema {
    span: usize,
    name: String,
}

impl Ema {
    /// `span` is clamped to at least 1.
    pub fn new(span: usize) -> Self {
        let span = span.max(1);
        Self {
            span,
            name: format!("ema_{span}"),
        }
    }

    pub fn span(&self) -> usize {
        self.span
    }
}

impl Indicator for Ema {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        0
    }

    fn compute(&self, bars: &[Bar]) -> Vec<f64> {
        let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
        ema_of_series(&closes, self.span)
    }
}

/// EMA of an arbitrary series, seeded with its first value.
pub fn ema_of_series(values: &[f64], span: usize) -> Vec<f64> {
    let mut result = vec![f64::NAN; values.len()];
    let Some(&first) = values.first() else {
        return result;
    };
    if first.is_nan() {
        return result;
    }

    let alpha = 2.0 / (span.max(1) as f64 + 1.0);
    let mut prev = first;
    result[0] = first;
    for (i, &v) in values.iter().enumerate().skip(1) {
        if v.is_nan() {
            return result;
        }
        prev = alpha * v + (1.0 - alpha) * prev;
        result[i] = prev;
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::bar::test_support::bars_from_closes;
    use crate::indicators::{assert_approx, DEFAULT_EPSILON};

    #[test]
    fn span_1_equals_close() {
        let bars = bars_from_closes("2024-01-01", 60, &[100.0, 200.0, 300.0]);
        let out = Ema::new(1).compute(&bars);
        assert_approx(out[0], 100.0, DEFAULT_EPSILON);
        assert_approx(out[1], 200.0, DEFAULT_EPSILON);
        assert_approx(out[2], 300.0, DEFAULT_EPSILON);
    }

    #[test]
    fn span_3_known_values() {
        // alpha = 0.5, seeded with the first close.
        // 10 → 10.5 → 11.25 → 12.125
        let out = ema_of_series(&[10.0, 11.0, 12.0, 13.0], 3);
        assert_approx(out[0], 10.0, DEFAULT_EPSILON);
        assert_approx(out[1], 10.5, DEFAULT_EPSILON);
        assert_approx(out[2], 11.25, DEFAULT_EPSILON);
        assert_approx(out[3], 12.125, DEFAULT_EPSILON);
    }

    #[test]
    fn nan_taints_the_tail() {
        let out = ema_of_series(&[10.0, f64::NAN, 12.0], 3);
        assert_approx(out[0], 10.0, DEFAULT_EPSILON);
        assert!(out[1].is_nan());
        assert!(out[2].is_nan());
    }

    #[test]
    fn empty_input() {
        assert!(ema_of_series(&[], 9).is_empty());
    }

    #[test]
    fn no_look_ahead() {
        let closes = [5.0, 7.0, 6.0, 9.0, 4.0, 8.0];
        let full = ema_of_series(&closes, 4);
        let truncated = ema_of_series(&closes[..4], 4);
        for (a, b) in truncated.iter().zip(full.iter()) {
            assert_approx(*a, *b, DEFAULT_EPSILON);
        }
    }

    #[test]
    fn naming_and_lookback() {
        let ema = Ema::new(12);
        assert_eq!(ema.name(), "ema_12");
        assert_eq!(ema.lookback(), 0);
        assert_eq!(Ema::new(0).span(), 1);
    }
}
