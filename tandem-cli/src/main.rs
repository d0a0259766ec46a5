//! Tandem CLI: run, orchestrate, replay and synthetic data commands.
//!
//! Commands:
//! - `run`: execute one backtest from a TOML config file
//! - `orchestrate`: run many configs on a worker pool, once or continuously
//! - `replay`: recompute capital and metrics from a persisted signals.csv
//! - `synth`: write a seeded synthetic high/low CSV pair

use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tandem_core::domain::{parse_timestamp, Timeframe};
use tandem_core::replay::ReplayParams;
use tandem_runner::orchestrator::available_cores;
use tandem_runner::{
    read_signals_csv, run_batch, run_continuous, run_single_backtest, save_artifacts,
    stop_on_interrupt, write_synthetic, BacktestConfig, BacktestResult, Job, OrchestratorConfig,
    Parallelism, PerformanceMetrics, RunStatus, SyntheticSpec,
};
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "tandem", about = "Tandem: dual-timeframe backtesting engine")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a backtest from a TOML config file.
    Run {
        /// Path to a TOML config file.
        config: PathBuf,

        /// Override the config's output directory.
        #[arg(long)]
        output_dir: Option<PathBuf>,

        /// Print the metrics table even if the config does not ask for it.
        #[arg(long, default_value_t = false)]
        print_metrics: bool,
    },
    /// Run several configs on a worker pool.
    Orchestrate {
        /// TOML config files.
        #[arg(required = true)]
        configs: Vec<PathBuf>,

        /// Number of workers.
        #[arg(short = 'j', long, conflicts_with = "percentage")]
        jobs: Option<usize>,

        /// Percentage of available cores to use.
        #[arg(short = 'p', long)]
        percentage: Option<f64>,

        /// Keep re-dispatching the configs until Ctrl+C, `--rounds` or `--duration-secs`.
        #[arg(long, default_value_t = false)]
        continuous: bool,

        /// Continuous mode: stop after this many rounds.
        #[arg(long)]
        rounds: Option<usize>,

        /// Continuous mode: stop dispatching after this many seconds.
        #[arg(long)]
        duration_secs: Option<u64>,

        /// Skip writing artifacts.
        #[arg(long, default_value_t = false)]
        no_artifacts: bool,
    },
    /// Recompute capital and metrics from a signals.csv file.
    Replay {
        signals: PathBuf,

        #[arg(long, default_value_t = 1000.0)]
        capital: f64,

        #[arg(long, default_value_t = 0.0015)]
        slippage: f64,

        #[arg(long, default_value_t = 1.0)]
        leverage: f64,
    },
    /// Write a seeded synthetic high/low CSV pair.
    Synth {
        /// Seeds the generator and prefixes the file names.
        #[arg(long, default_value = "SYN")]
        symbol: String,

        #[arg(long, default_value = "1h")]
        high: String,

        #[arg(long, default_value = "5m")]
        low: String,

        /// Number of high bars.
        #[arg(long, default_value_t = 1000)]
        bars: usize,

        /// First bar timestamp.
        #[arg(long, default_value = "2024-01-01")]
        start: String,

        #[arg(long, default_value_t = 100.0)]
        price: f64,

        #[arg(long, default_value = "data")]
        out_dir: PathBuf,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            config,
            output_dir,
            print_metrics,
        } => run_cmd(config, output_dir, print_metrics),
        Commands::Orchestrate {
            configs,
            jobs,
            percentage,
            continuous,
            rounds,
            duration_secs,
            no_artifacts,
        } => {
            let parallelism = match (jobs, percentage) {
                (Some(n), _) => Parallelism::Jobs(n),
                (None, Some(p)) => Parallelism::Percentage(p),
                (None, None) => Parallelism::Default,
            };
            let config = OrchestratorConfig {
                parallelism,
                save_artifacts: !no_artifacts,
                max_rounds: rounds,
                deadline: duration_secs.map(Duration::from_secs),
                ..OrchestratorConfig::default()
            };
            orchestrate_cmd(configs, config, continuous)
        }
        Commands::Replay {
            signals,
            capital,
            slippage,
            leverage,
        } => replay_cmd(
            signals,
            ReplayParams {
                capital,
                slippage,
                leverage,
            },
        ),
        Commands::Synth {
            symbol,
            high,
            low,
            bars,
            start,
            price,
            out_dir,
        } => synth_cmd(symbol, &high, &low, bars, &start, price, out_dir),
    }
}

fn run_cmd(config_path: PathBuf, output_dir: Option<PathBuf>, print_metrics: bool) -> Result<()> {
    let config = BacktestConfig::from_file(&config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;

    let result = run_single_backtest(&config)?;
    print_summary(&result);
    if print_metrics || config.output.print_metrics {
        println!("{}", serde_json::to_string_pretty(&result.metrics)?);
    }

    let output_dir = output_dir.unwrap_or_else(|| config.output.dir.clone());
    let run_dir = save_artifacts(&result, &output_dir)?;
    println!("Artifacts saved to: {}", run_dir.display());
    Ok(())
}

fn orchestrate_cmd(paths: Vec<PathBuf>, config: OrchestratorConfig, continuous: bool) -> Result<()> {
    let jobs = paths
        .iter()
        .map(|path| {
            let config = BacktestConfig::from_file(path)
                .with_context(|| format!("loading {}", path.display()))?;
            Ok(Job {
                label: path.display().to_string(),
                config,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    info!(cores = available_cores(), "dispatching {} configs", jobs.len());
    let stop = Arc::new(AtomicBool::new(false));
    if let Err(err) = stop_on_interrupt(Arc::clone(&stop)) {
        warn!(error = %err, "Ctrl+C handler not installed; stop with --rounds or --duration-secs");
    }
    let report = if continuous {
        run_continuous(&jobs, &config, &stop)?
    } else {
        run_batch(&jobs, &config, &stop)?
    };

    for outcome in &report.outcomes {
        match &outcome.status {
            RunStatus::Completed(summary) => println!(
                "[round {}] {} -> {} capital {:.2} ({} trades)",
                outcome.round, outcome.label, summary.run_id, summary.final_capital, summary.trades
            ),
            RunStatus::Failed(err) => {
                println!("[round {}] {} FAILED: {err}", outcome.round, outcome.label)
            }
            RunStatus::Panicked(msg) => {
                println!("[round {}] {} PANICKED: {msg}", outcome.round, outcome.label)
            }
            RunStatus::Skipped => println!("[round {}] {} skipped", outcome.round, outcome.label),
        }
    }
    let total = report.completed() + report.failed() + report.skipped();
    if report.outcomes.len() < total {
        println!("(showing the last {} outcomes)", report.outcomes.len());
    }
    println!(
        "{} workers, {} rounds: {} completed, {} failed, {} skipped",
        report.workers,
        report.rounds,
        report.completed(),
        report.failed(),
        report.skipped()
    );

    if report.completed() == 0 && report.failed() > 0 {
        bail!("every run failed");
    }
    Ok(())
}

fn replay_cmd(path: PathBuf, params: ReplayParams) -> Result<()> {
    let signals = read_signals_csv(&path)?;
    let metrics = PerformanceMetrics::compute(&signals, params)
        .with_context(|| format!("replaying {}", path.display()))?;
    println!("{}", serde_json::to_string_pretty(&metrics)?);
    Ok(())
}

fn synth_cmd(
    symbol: String,
    high: &str,
    low: &str,
    bars: usize,
    start: &str,
    price: f64,
    out_dir: PathBuf,
) -> Result<()> {
    let Some(start) = parse_timestamp(start) else {
        bail!("cannot parse start '{start}'");
    };
    let spec = SyntheticSpec {
        symbol,
        start,
        high: high.parse::<Timeframe>().with_context(|| format!("high timeframe '{high}'"))?,
        low: low.parse::<Timeframe>().with_context(|| format!("low timeframe '{low}'"))?,
        high_bars: bars,
        start_price: price,
    };
    let (high_path, low_path) = write_synthetic(&spec, &out_dir)?;
    println!("Wrote {}", high_path.display());
    println!("Wrote {}", low_path.display());
    Ok(())
}

fn print_summary(result: &BacktestResult) {
    let m = &result.metrics;
    println!("=== Backtest: {} ===", result.strategy);
    println!("Run:            {}", result.run_id);
    println!("Period:         {} to {}", result.start_date, result.end_date);
    println!("Initial:        {:.2}", result.initial_capital);
    println!("Final:          {:.2}", result.final_capital);
    println!("Net profit:     {:.2}", m.net_profit);
    println!("Max drawdown:   {:.2}%", m.max_drawdown_pct);
    println!("Sharpe:         {:.3}", m.sharpe_ratio);
    println!("Win rate:       {:.1}%", m.win_rate);
    println!("Trades:         {}", m.num_of_trades);
    println!("Total fee:      {:.2}", m.total_fee);
    println!("Dropped fills:  {}", result.dropped_fills);
    let replay = match result.replay_reconciled {
        Some(true) => "reconciled",
        Some(false) => "DIVERGED",
        None => "skipped",
    };
    println!("Replay:         {replay}");
}
