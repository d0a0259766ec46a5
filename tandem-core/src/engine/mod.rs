//! Dual-timeframe simulation engine.
//!
//! Decisions are taken on high-timeframe closes; risk checks and fill timing
//! run on the low timeframe:
//!
//! - `sync`: forward-only low cursor aligned to the high cursor
//! - `timing`: maps a decision onto the low bar it can be filled on
//! - `risk`: intrabar target/stop/trailing/margin scan
//! - `machine`: flat/long/short transitions and their commits
//! - `ledger`: fee and pnl settlement, trade and signal logs
//! - `simulation`: the per-step loop tying them together

pub mod ledger;
pub mod machine;
pub mod risk;
pub mod simulation;
pub mod state;
pub mod sync;
pub mod timing;

pub use ledger::{settle, CostModel, Ledger, Settlement};
pub use machine::{commit, decide, Execution, Transition};
pub use risk::{classify_exit, scan, RiskLevels, RiskParams, RiskScan};
pub use simulation::{Simulation, SimulationReport};
pub use state::{SimulationConfig, SimulationState};
pub use sync::align;
pub use timing::{FillResolution, FillSide, FillSlot, FillTiming, DEFAULT_FILL_TOLERANCE_MINUTES};
