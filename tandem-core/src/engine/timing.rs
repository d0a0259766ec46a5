//! Execution timing resolver.
//!
//! A decision taken on the close of a high bar stamped `t` cannot be filled
//! before `t + H`. The resolver maps that target onto the low series:
//!
//! 1. Near side: the low bar just before the target is used when the target
//!    falls inside its interval (`target - prev.ts <= L`).
//! 2. Far side: otherwise the first low bar at/after the target is used when
//!    it opens within the fill tolerance `W`.
//! 3. Otherwise the decision is dropped. Dropping is a result, not an error.
//!
//! The internal cursor is forward-only and survives across calls.

use chrono::{Duration, NaiveDateTime};

use crate::domain::BarSeries;

/// Default fill tolerance window in minutes.
pub const DEFAULT_FILL_TOLERANCE_MINUTES: i64 = 15;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FillSide {
    /// Target falls inside the interval of the bar just before it.
    Near,
    /// First bar at/after the target, within the tolerance window.
    Far,
}

/// The low bar a decision is filled on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FillSlot {
    pub index: usize,
    pub timestamp: NaiveDateTime,
    pub side: FillSide,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FillResolution {
    Filled(FillSlot),
    Dropped { target: NaiveDateTime },
}

impl FillResolution {
    pub fn slot(&self) -> Option<FillSlot> {
        match self {
            Self::Filled(slot) => Some(*slot),
            Self::Dropped { .. } => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FillTiming {
    high_stride: Duration,
    low_stride: Duration,
    tolerance: Duration,
    cursor: usize,
}

impl FillTiming {
    pub fn new(high_stride: Duration, low_stride: Duration, tolerance: Duration) -> Self {
        Self {
            high_stride,
            low_stride,
            tolerance,
            cursor: 0,
        }
    }

    /// Current position of the forward-only low cursor.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Resolve the fill bar for a decision made at `decision`.
    pub fn resolve(&mut self, low: &BarSeries, decision: NaiveDateTime) -> FillResolution {
        let target = decision + self.high_stride;
        let bars = low.bars();

        while self.cursor < bars.len() && bars[self.cursor].timestamp < target {
            self.cursor += 1;
        }

        if let Some(prev) = self.cursor.checked_sub(1) {
            if target - bars[prev].timestamp <= self.low_stride {
                return FillResolution::Filled(FillSlot {
                    index: prev,
                    timestamp: bars[prev].timestamp,
                    side: FillSide::Near,
                });
            }
        }

        if let Some(next) = bars.get(self.cursor) {
            if next.timestamp - target <= self.tolerance {
                let slot = FillSlot {
                    index: self.cursor,
                    timestamp: next.timestamp,
                    side: FillSide::Far,
                };
                self.cursor += 1;
                return FillResolution::Filled(slot);
            }
        }

        FillResolution::Dropped { target }
    }
}
