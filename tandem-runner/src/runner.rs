//! Backtest runner: wires config, data, engine and metrics together.
//!
//! Two entry points:
//! - `run_single_backtest()`: loads both CSV series named by the config, then runs. Used by the CLI.
//! - `run_backtest_from_data()`: takes pre-loaded data. Used by the orchestrator and tests.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use tandem_core::domain::{SignalRecord, TradeRecord, TIMESTAMP_FORMAT};
use tandem_core::engine::{Simulation, SimulationState};
use tandem_core::replay::{ReplayError, ReplayParams};
use tandem_core::EngineError;

use crate::config::{BacktestConfig, ConfigError};
use crate::data_loader::{load_pair, LoadError, LoadedData};
use crate::metrics::PerformanceMetrics;

/// Errors from the runner.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("data error: {0}")]
    Data(#[from] LoadError),
    #[error("engine error: {0}")]
    Engine(#[from] EngineError),
    #[error("metrics error: {0}")]
    Metrics(#[from] ReplayError),
}

/// Current schema version for persisted artifacts.
pub const SCHEMA_VERSION: u32 = 1;

/// Complete result of a single backtest run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestResult {
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    pub run_id: String,
    pub strategy: String,
    pub config: BacktestConfig,
    pub metrics: PerformanceMetrics,
    pub trades: Vec<TradeRecord>,
    pub signals: Vec<SignalRecord>,
    pub final_state: SimulationState,
    pub initial_capital: f64,
    pub final_capital: f64,
    pub dropped_fills: usize,
    pub high_steps: usize,
    /// `None` when validation was disabled, otherwise whether the replay matched the ledger.
    pub replay_reconciled: Option<bool>,
    pub dataset_hash: String,
    pub high_bars: usize,
    pub low_bars: usize,
    pub start_date: String,
    pub end_date: String,
}

fn default_schema_version() -> u32 {
    SCHEMA_VERSION
}

impl BacktestResult {
    pub fn replay_params(&self) -> ReplayParams {
        replay_params(&self.config)
    }
}

fn replay_params(config: &BacktestConfig) -> ReplayParams {
    ReplayParams {
        capital: config.backtester.capital,
        slippage: config.backtester.slippage,
        leverage: config.backtester.leverage,
    }
}

/// Run a single backtest, loading data from the files the config names.
pub fn run_single_backtest(config: &BacktestConfig) -> Result<BacktestResult, RunError> {
    let data = load_pair(config)?;
    run_backtest_from_data(config, &data)
}

/// Run a backtest on already-loaded data.
pub fn run_backtest_from_data(
    config: &BacktestConfig,
    data: &LoadedData,
) -> Result<BacktestResult, RunError> {
    let run_id = config.run_id()?;
    let sim_config = config.to_simulation_config()?;
    let simulation = Simulation::new(data.high.clone(), data.low.clone(), sim_config)?;
    let (entry, exit) = simulation.bounds()?;

    let mut strategy = config.build_strategy();
    let report = simulation.run(strategy.as_mut())?;

    let params = replay_params(config);
    let metrics = match &report.replay {
        Some(replay) => PerformanceMetrics::from_replay(&report.signals, replay, params.slippage),
        None => PerformanceMetrics::compute(&report.signals, params)?,
    };

    let replay_reconciled = if config.backtester.validate_replay {
        Some(report.replay_error.is_none())
    } else {
        None
    };
    if replay_reconciled == Some(false) {
        warn!(run_id = %run_id, "ledger and replay disagree");
    }

    let date_at = |i: usize| {
        simulation
            .high()
            .get(i)
            .map(|b| b.timestamp.format(TIMESTAMP_FORMAT).to_string())
            .unwrap_or_default()
    };

    info!(
        run_id = %run_id,
        strategy = %report.strategy,
        final_capital = report.final_capital(),
        trades = metrics.num_of_trades,
        "backtest complete"
    );

    Ok(BacktestResult {
        schema_version: SCHEMA_VERSION,
        run_id,
        strategy: report.strategy.clone(),
        config: config.clone(),
        metrics,
        initial_capital: config.backtester.capital,
        final_capital: report.final_capital(),
        dropped_fills: report.dropped_fills,
        high_steps: report.high_steps,
        replay_reconciled,
        dataset_hash: data.dataset_hash.clone(),
        high_bars: simulation.high().len(),
        low_bars: simulation.low().len(),
        start_date: date_at(entry),
        end_date: date_at(exit),
        trades: report.trades,
        signals: report.signals,
        final_state: report.final_state,
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::config::{BacktesterConfig, DataConfig, OutputConfig, StrategyConfig};
    use crate::data_loader::{generate_synthetic, SyntheticSpec};
    use std::collections::BTreeMap;
    use tandem_core::domain::{parse_timestamp, BarSeries};

    pub(crate) fn sample_config() -> BacktestConfig {
        BacktestConfig {
            data: DataConfig {
                path: "data".into(),
                files: BTreeMap::from([
                    ("1h".to_string(), "SYN_1h.csv".to_string()),
                    ("15m".to_string(), "SYN_15m.csv".to_string()),
                ]),
                entry_date: None,
                exit_date: None,
            },
            backtester: BacktesterConfig {
                high_time: "1h".into(),
                low_time: "15m".into(),
                capital: 1000.0,
                slippage: 0.0015,
                margin: 0.5,
                leverage: 1.0,
                trailing: false,
                take_profit_pct: 0.1,
                stop_loss_pct: 0.05,
                fill_tolerance_minutes: 15,
                validate_replay: true,
            },
            strategy: StrategyConfig::EmaCrossover {
                fast_period: 3,
                slow_period: 8,
            },
            output: OutputConfig::default(),
        }
    }

    pub(crate) fn sample_data() -> LoadedData {
        let spec = SyntheticSpec {
            symbol: "SYN".into(),
            start: parse_timestamp("2024-01-01").unwrap(),
            high: "1h".parse().unwrap(),
            low: "15m".parse().unwrap(),
            high_bars: 200,
            start_price: 100.0,
        };
        let (high, low) = generate_synthetic(&spec).unwrap();
        LoadedData::new(
            BarSeries::new("1h", high).unwrap(),
            BarSeries::new("15m", low).unwrap(),
        )
    }

    pub(crate) fn sample_result() -> BacktestResult {
        run_backtest_from_data(&sample_config(), &sample_data()).unwrap()
    }

    #[test]
    fn run_produces_consistent_result() {
        let result = sample_result();
        assert_eq!(result.schema_version, SCHEMA_VERSION);
        assert_eq!(result.strategy, "ema_crossover_3_8");
        assert_eq!(result.replay_reconciled, Some(true));
        assert_eq!(result.trades.len(), result.signals.len());
        assert!((result.metrics.final_balance - result.final_capital).abs() < 1e-9);
        assert!((result.metrics.total_fee - result.final_state.total_fees).abs() < 1e-9);
        assert_eq!(result.metrics.num_of_trades, result.final_state.trade_count);
        assert_eq!(result.start_date, "2024-01-01 00:00:00");
        assert_eq!(result.high_bars, 200);
    }

    #[test]
    fn run_is_deterministic() {
        let a = sample_result();
        let b = sample_result();
        assert_eq!(a.run_id, b.run_id);
        assert_eq!(a.trades, b.trades);
        assert_eq!(a.metrics, b.metrics);
        assert_eq!(a.dataset_hash, b.dataset_hash);
    }

    #[test]
    fn disabled_validation_still_yields_metrics() {
        let mut config = sample_config();
        config.backtester.validate_replay = false;
        let result = run_backtest_from_data(&config, &sample_data()).unwrap();
        assert_eq!(result.replay_reconciled, None);
        assert!((result.metrics.final_balance - result.final_capital).abs() < 1e-9);
    }

    #[test]
    fn empty_window_is_an_engine_error() {
        let mut config = sample_config();
        config.data.entry_date = Some("2030-01-01".into());
        let err = run_backtest_from_data(&config, &sample_data()).unwrap_err();
        assert!(matches!(err, RunError::Engine(_)), "{err}");
    }

    #[test]
    fn missing_files_surface_as_data_errors() {
        let err = run_single_backtest(&sample_config()).unwrap_err();
        assert!(matches!(err, RunError::Data(_)), "{err}");
    }
}
