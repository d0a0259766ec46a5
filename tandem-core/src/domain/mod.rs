//! Domain types for Tandem

pub mod bar;
pub mod position;
pub mod record;
pub mod timeframe;

pub use bar::{parse_timestamp, Bar, BarSeries, TIMESTAMP_FORMAT};
pub use position::{InvalidSignalCode, Position, SignalCode};
pub use record::{OrderKind, SignalKind, SignalRecord, TradeRecord};
pub use timeframe::{to_minutes, Timeframe, TimeframeError};
