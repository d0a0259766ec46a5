//! Engine error kinds. Dropped fills and "no risk hit" are not errors.

use chrono::NaiveDateTime;
use thiserror::Error;

use crate::replay::ReplayError;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("{series} series is not strictly increasing at index {index}: {previous} then {current}")]
    DataOrdering {
        series: String,
        index: usize,
        previous: NaiveDateTime,
        current: NaiveDateTime,
    },

    #[error(
        "low series ({low_len} bars) does not reach high bar {high_index} at {timestamp}"
    )]
    Alignment {
        high_index: usize,
        timestamp: NaiveDateTime,
        low_len: usize,
    },

    #[error("{0} series is empty")]
    EmptySeries(String),

    #[error("no high bars fall inside the simulation window")]
    EmptyWindow,

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("replay failed: {0}")]
    Replay(#[from] ReplayError),
}
