//! Position side and the compact signal-code transition encoding.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Current exposure of the single simulated position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Position {
    #[default]
    Flat,
    Long,
    Short,
}

impl Position {
    /// +1 for Long, -1 for Short, 0 when Flat.
    pub fn direction(self) -> f64 {
        match self {
            Self::Flat => 0.0,
            Self::Long => 1.0,
            Self::Short => -1.0,
        }
    }

    pub fn is_flat(self) -> bool {
        self == Self::Flat
    }

    pub fn opposite(self) -> Self {
        match self {
            Self::Flat => Self::Flat,
            Self::Long => Self::Short,
            Self::Short => Self::Long,
        }
    }

    /// Label used in the `order_status` column of the trade ledger.
    pub fn order_status(self) -> &'static str {
        match self {
            Self::Flat => "Squared_Off",
            Self::Long => "LONG",
            Self::Short => "SHORT",
        }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Flat => "flat",
            Self::Long => "long",
            Self::Short => "short",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invalid signal code {0} (expected -2..=2)")]
pub struct InvalidSignalCode(pub i64);

/// Position transition encoded as a small integer.
///
/// | code | meaning                                  |
/// |------|------------------------------------------|
/// | `2`  | flip short → long                        |
/// | `1`  | open long from flat, or close short      |
/// | `0`  | no action                                |
/// | `-1` | open short from flat, or close long      |
/// | `-2` | flip long → short                        |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub enum SignalCode {
    FlipToLong,
    Buy,
    Hold,
    Sell,
    FlipToShort,
}

impl SignalCode {
    pub fn value(self) -> i64 {
        match self {
            Self::FlipToLong => 2,
            Self::Buy => 1,
            Self::Hold => 0,
            Self::Sell => -1,
            Self::FlipToShort => -2,
        }
    }

    /// The code emitted for a `from → to` transition, if that transition exists.
    pub fn for_transition(from: Position, to: Position) -> Option<Self> {
        use Position::*;
        match (from, to) {
            (Flat, Long) | (Short, Flat) => Some(Self::Buy),
            (Flat, Short) | (Long, Flat) => Some(Self::Sell),
            (Short, Long) => Some(Self::FlipToLong),
            (Long, Short) => Some(Self::FlipToShort),
            _ => None,
        }
    }

    /// Position reached by applying this code while in `from`.
    ///
    /// `Hold` keeps the current position; any code not allowed from `from`
    /// returns `None`.
    pub fn apply(self, from: Position) -> Option<Position> {
        use Position::*;
        match (from, self) {
            (_, Self::Hold) => Some(from),
            (Flat, Self::Buy) => Some(Long),
            (Flat, Self::Sell) => Some(Short),
            (Long, Self::Sell) => Some(Flat),
            (Long, Self::FlipToShort) => Some(Short),
            (Short, Self::Buy) => Some(Flat),
            (Short, Self::FlipToLong) => Some(Long),
            _ => None,
        }
    }
}

impl TryFrom<i64> for SignalCode {
    type Error = InvalidSignalCode;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            2 => Ok(Self::FlipToLong),
            1 => Ok(Self::Buy),
            0 => Ok(Self::Hold),
            -1 => Ok(Self::Sell),
            -2 => Ok(Self::FlipToShort),
            other => Err(InvalidSignalCode(other)),
        }
    }
}

impl From<SignalCode> for i64 {
    fn from(code: SignalCode) -> Self {
        code.value()
    }
}

impl fmt::Display for SignalCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_POSITIONS: [Position; 3] = [Position::Flat, Position::Long, Position::Short];

    #[test]
    fn codes_match_the_wire_contract() {
        assert_eq!(SignalCode::FlipToLong.value(), 2);
        assert_eq!(SignalCode::Buy.value(), 1);
        assert_eq!(SignalCode::Hold.value(), 0);
        assert_eq!(SignalCode::Sell.value(), -1);
        assert_eq!(SignalCode::FlipToShort.value(), -2);
    }

    #[test]
    fn transition_and_apply_agree() {
        for from in ALL_POSITIONS {
            for to in ALL_POSITIONS {
                if let Some(code) = SignalCode::for_transition(from, to) {
                    assert_eq!(code.apply(from), Some(to), "{from} -> {to}");
                }
            }
        }
    }

    #[test]
    fn illegal_codes_are_rejected() {
        assert_eq!(SignalCode::FlipToLong.apply(Position::Flat), None);
        assert_eq!(SignalCode::FlipToShort.apply(Position::Short), None);
        assert_eq!(SignalCode::Buy.apply(Position::Long), None);
        assert_eq!(SignalCode::Sell.apply(Position::Short), None);
    }

    #[test]
    fn integer_conversion_roundtrip() {
        for v in -2..=2 {
            let code = SignalCode::try_from(v).unwrap();
            assert_eq!(i64::from(code), v);
        }
        assert_eq!(SignalCode::try_from(3), Err(InvalidSignalCode(3)));
    }

    #[test]
    fn serializes_as_integer() {
        let json = serde_json::to_string(&SignalCode::FlipToShort).unwrap();
        assert_eq!(json, "-2");
        let back: SignalCode = serde_json::from_str("1").unwrap();
        assert_eq!(back, SignalCode::Buy);
    }

    #[test]
    fn order_status_labels() {
        assert_eq!(Position::Long.order_status(), "LONG");
        assert_eq!(Position::Short.order_status(), "SHORT");
        assert_eq!(Position::Flat.order_status(), "Squared_Off");
    }
}
