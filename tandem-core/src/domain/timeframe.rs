//! Timeframe labels such as `3m`, `4h`, `1d`, `1w`.

use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TimeframeError {
    #[error("empty timeframe label")]
    Empty,
    #[error("invalid timeframe unit '{0}' (expected m, h, d or w)")]
    InvalidUnit(char),
    #[error("invalid timeframe count in '{0}'")]
    InvalidCount(String),
}

/// A bar stride, stored in whole minutes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Timeframe {
    minutes: u32,
}

impl Timeframe {
    pub fn from_minutes(minutes: u32) -> Self {
        Self { minutes }
    }

    pub fn minutes(&self) -> u32 {
        self.minutes
    }

    pub fn duration(&self) -> Duration {
        Duration::minutes(i64::from(self.minutes))
    }
}

/// Convert a timeframe label to minutes.
pub fn to_minutes(label: &str) -> Result<u32, TimeframeError> {
    let label = label.trim();
    let unit = label.chars().last().ok_or(TimeframeError::Empty)?;
    let count: u32 = label[..label.len() - unit.len_utf8()]
        .parse()
        .ok()
        .filter(|&n| n > 0)
        .ok_or_else(|| TimeframeError::InvalidCount(label.to_string()))?;
    let scale = match unit {
        'm' => 1,
        'h' => 60,
        'd' => 24 * 60,
        'w' => 7 * 24 * 60,
        other => return Err(TimeframeError::InvalidUnit(other)),
    };
    count
        .checked_mul(scale)
        .ok_or_else(|| TimeframeError::InvalidCount(label.to_string()))
}

impl FromStr for Timeframe {
    type Err = TimeframeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        to_minutes(s).map(Self::from_minutes)
    }
}

impl TryFrom<String> for Timeframe {
    type Error = TimeframeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Timeframe> for String {
    fn from(tf: Timeframe) -> Self {
        tf.to_string()
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let m = self.minutes;
        if m % (7 * 24 * 60) == 0 {
            write!(f, "{}w", m / (7 * 24 * 60))
        } else if m % (24 * 60) == 0 {
            write!(f, "{}d", m / (24 * 60))
        } else if m % 60 == 0 {
            write!(f, "{}h", m / 60)
        } else {
            write!(f, "{m}m")
        }
    }
}
