//! Tandem Runner: backtest orchestration around `tandem-core`.
//!
//! This crate provides:
//! - Typed TOML configuration with up-front validation
//! - CSV data loading and a seeded synthetic data generator
//! - Single-run driver producing a schema-versioned `BacktestResult`
//! - Performance metrics derived from the replayed signal stream
//! - CSV/JSON/Markdown artifacts
//! - A rayon worker pool for batch and continuous runs

pub mod config;
pub mod data_loader;
pub mod export;
pub mod metrics;
pub mod orchestrator;
pub mod runner;

pub use config::{BacktestConfig, ConfigError, StrategyConfig};
pub use data_loader::{
    generate_synthetic, load_pair, load_series, write_synthetic, LoadError, LoadedData,
    SyntheticSpec,
};
pub use export::{read_signals_csv, save_artifacts};
pub use metrics::PerformanceMetrics;
pub use orchestrator::{
    run_batch, run_continuous, stop_on_interrupt, Job, OrchestratorConfig, OrchestratorError,
    OrchestratorReport, Parallelism, RunOutcome, RunStatus, Tally,
};
pub use runner::{run_backtest_from_data, run_single_backtest, BacktestResult, RunError};

#[cfg(test)]
mod send_sync_checks {
    use super::*;

    fn assert_send<T: Send>() {}
    fn assert_sync<T: Sync>() {}

    #[test]
    fn results_cross_worker_threads() {
        assert_send::<BacktestResult>();
        assert_sync::<BacktestResult>();
        assert_send::<PerformanceMetrics>();
        assert_sync::<PerformanceMetrics>();
        assert_send::<RunOutcome>();
    }

    #[test]
    fn jobs_and_inputs_are_shareable() {
        assert_send::<Job>();
        assert_sync::<Job>();
        assert_send::<LoadedData>();
        assert_sync::<LoadedData>();
        assert_sync::<BacktestConfig>();
    }

    #[test]
    fn errors_are_send_sync() {
        assert_send::<RunError>();
        assert_sync::<RunError>();
        assert_send::<OrchestratorError>();
    }
}
