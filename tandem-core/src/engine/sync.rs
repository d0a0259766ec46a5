//! Timestamp synchronizer: keeps the low-timeframe cursor aligned with the high-timeframe cursor.
//!
//! The cursor only moves forward, so synchronizing across a whole run is
//! linear in the length of the low series.

use crate::domain::BarSeries;
use crate::error::EngineError;

/// Smallest `lo' >= lo` such that `low[lo'].timestamp >= high[hi].timestamp`.
///
/// Fails with `EngineError::Alignment` when the low series ends first.
pub fn align(lo: usize, hi: usize, high: &BarSeries, low: &BarSeries) -> Result<usize, EngineError> {
    let target = high
        .get(hi)
        .ok_or_else(|| EngineError::InvalidState(format!("high index {hi} out of range")))?
        .timestamp;
    let bars = low.bars();
    let mut cursor = lo;
    while cursor < bars.len() && bars[cursor].timestamp < target {
        cursor += 1;
    }
    if cursor >= bars.len() {
        return Err(EngineError::Alignment {
            high_index: hi,
            timestamp: target,
            low_len: bars.len(),
        });
    }
    Ok(cursor)
}
