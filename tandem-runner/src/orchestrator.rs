//! Worker pool that runs many backtests in parallel.
//!
//! Each job is an independent run: it loads its own data, owns its own
//! simulation state and writes its own artifact directory. Nothing is shared
//! between workers except the stop flag. A failing or panicking run is logged
//! and recorded; it never takes down its siblings.
//!
//! Two modes:
//! - batch: every job once
//! - continuous: re-dispatch the whole job list round after round until the
//!   stop flag is raised, the round limit is hit or the deadline passes
//!
//! The report keeps running totals for every run but only the outcomes of
//! the most recent rounds.

use std::collections::VecDeque;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use rayon::prelude::*;
use serde::Serialize;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::config::BacktestConfig;
use crate::export::save_artifacts;
use crate::runner::run_single_backtest;

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("job count must be at least 1, got {0}")]
    InvalidJobs(usize),
    #[error("{percentage}% of {cores} cores leaves no workers")]
    InvalidPercentage { percentage: f64, cores: usize },
    #[error("no configs to run")]
    NoJobs,
    #[error("failed to build worker pool: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),
}

/// How many workers to start.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Parallelism {
    /// Exactly this many workers.
    Jobs(usize),
    /// This percentage of available cores, rounded down.
    Percentage(f64),
    /// Half of the available cores, at least one.
    Default,
}

impl Parallelism {
    pub fn workers(self, cores: usize) -> Result<usize, OrchestratorError> {
        match self {
            Self::Jobs(0) => Err(OrchestratorError::InvalidJobs(0)),
            Self::Jobs(n) => Ok(n),
            Self::Percentage(percentage) => {
                let n = (cores as f64 * percentage / 100.0).floor();
                if n.is_finite() && n >= 1.0 {
                    Ok(n as usize)
                } else {
                    Err(OrchestratorError::InvalidPercentage { percentage, cores })
                }
            }
            Self::Default => Ok((cores / 2).max(1)),
        }
    }
}

/// Raise `stop` on Ctrl+C. Runs already dispatched finish and write their
/// artifacts; nothing new is started.
pub fn stop_on_interrupt(stop: Arc<AtomicBool>) -> Result<(), ctrlc::Error> {
    ctrlc::set_handler(move || {
        warn!("interrupt received, finishing dispatched runs");
        stop.store(true, Ordering::Relaxed);
    })
}

pub fn available_cores() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// One configured backtest handed to the pool.
#[derive(Debug, Clone)]
pub struct Job {
    /// Shown in logs and outcomes, usually the config file path.
    pub label: String,
    pub config: BacktestConfig,
}

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub parallelism: Parallelism,
    /// Write artifacts for every successful run.
    pub save_artifacts: bool,
    /// Continuous mode: stop after this many rounds.
    pub max_rounds: Option<usize>,
    /// Continuous mode: stop dispatching once this much time has passed.
    pub deadline: Option<Duration>,
    /// Rounds whose individual outcomes are kept in the report.
    pub history_rounds: usize,
}

pub const DEFAULT_HISTORY_ROUNDS: usize = 16;

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            parallelism: Parallelism::Default,
            save_artifacts: true,
            max_rounds: None,
            deadline: None,
            history_rounds: DEFAULT_HISTORY_ROUNDS,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: String,
    pub strategy: String,
    pub final_capital: f64,
    pub trades: usize,
    pub replay_reconciled: Option<bool>,
    pub artifact_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize)]
pub enum RunStatus {
    Completed(RunSummary),
    Failed(String),
    Panicked(String),
    /// The stop flag was already raised when the job came up.
    Skipped,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunOutcome {
    pub round: usize,
    pub label: String,
    pub status: RunStatus,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Tally {
    pub completed: usize,
    /// Failed and panicked runs.
    pub failed: usize,
    pub skipped: usize,
}

impl Tally {
    fn add(&mut self, status: &RunStatus) {
        match status {
            RunStatus::Completed(_) => self.completed += 1,
            RunStatus::Failed(_) | RunStatus::Panicked(_) => self.failed += 1,
            RunStatus::Skipped => self.skipped += 1,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct OrchestratorReport {
    pub workers: usize,
    pub rounds: usize,
    /// Totals over every round.
    pub tally: Tally,
    /// Outcomes of the most recent rounds, oldest first.
    pub outcomes: VecDeque<RunOutcome>,
}

impl OrchestratorReport {
    pub fn completed(&self) -> usize {
        self.tally.completed
    }

    pub fn failed(&self) -> usize {
        self.tally.failed
    }

    pub fn skipped(&self) -> usize {
        self.tally.skipped
    }

    fn record(&mut self, outcomes: Vec<RunOutcome>, capacity: usize) {
        for outcome in outcomes {
            self.tally.add(&outcome.status);
            if self.outcomes.len() == capacity {
                self.outcomes.pop_front();
            }
            if capacity > 0 {
                self.outcomes.push_back(outcome);
            }
        }
    }
}

/// Run every job once.
pub fn run_batch(
    jobs: &[Job],
    config: &OrchestratorConfig,
    stop: &AtomicBool,
) -> Result<OrchestratorReport, OrchestratorError> {
    let config = OrchestratorConfig {
        max_rounds: Some(1),
        ..config.clone()
    };
    run_continuous(jobs, &config, stop)
}

/// Re-dispatch `jobs` round after round until stopped.
///
/// With neither `max_rounds` nor `deadline` set this only returns once
/// another thread raises `stop`.
pub fn run_continuous(
    jobs: &[Job],
    config: &OrchestratorConfig,
    stop: &AtomicBool,
) -> Result<OrchestratorReport, OrchestratorError> {
    if jobs.is_empty() {
        return Err(OrchestratorError::NoJobs);
    }
    let workers = config.parallelism.workers(available_cores())?;
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .thread_name(|i| format!("tandem-worker-{i}"))
        .build()?;

    info!(workers, jobs = jobs.len(), "orchestrator started");
    let started = Instant::now();
    let capacity = config.history_rounds.saturating_mul(jobs.len());
    let mut report = OrchestratorReport {
        workers,
        ..OrchestratorReport::default()
    };

    loop {
        if config.deadline.is_some_and(|d| started.elapsed() >= d) {
            stop.store(true, Ordering::Relaxed);
        }
        if stop.load(Ordering::Relaxed) {
            break;
        }
        if config.max_rounds.is_some_and(|max| report.rounds >= max) {
            break;
        }

        let round = report.rounds;
        let outcomes: Vec<RunOutcome> = pool.install(|| {
            jobs.par_iter()
                .map(|job| RunOutcome {
                    round,
                    label: job.label.clone(),
                    status: run_job(job, config.save_artifacts, stop),
                })
                .collect()
        });
        report.record(outcomes, capacity);
        report.rounds += 1;
    }

    info!(
        rounds = report.rounds,
        completed = report.completed(),
        failed = report.failed(),
        skipped = report.skipped(),
        "orchestrator finished"
    );
    Ok(report)
}

/// Run one job, converting errors and panics into a status.
fn run_job(job: &Job, save: bool, stop: &AtomicBool) -> RunStatus {
    if stop.load(Ordering::Relaxed) {
        return RunStatus::Skipped;
    }

    let attempt = catch_unwind(AssertUnwindSafe(|| -> anyhow::Result<RunSummary> {
        let result = run_single_backtest(&job.config)?;
        let artifact_dir = if save {
            Some(save_artifacts(&result, &job.config.output.dir)?)
        } else {
            None
        };
        Ok(RunSummary {
            run_id: result.run_id,
            strategy: result.strategy,
            final_capital: result.final_capital,
            trades: result.metrics.num_of_trades,
            replay_reconciled: result.replay_reconciled,
            artifact_dir,
        })
    }));

    match attempt {
        Ok(Ok(summary)) => {
            info!(job = %job.label, run_id = %summary.run_id, capital = summary.final_capital, "run completed");
            RunStatus::Completed(summary)
        }
        Ok(Err(err)) => {
            error!(job = %job.label, error = %format!("{err:#}"), "run failed");
            RunStatus::Failed(format!("{err:#}"))
        }
        Err(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            error!(job = %job.label, panic = %message, "run panicked");
            RunStatus::Panicked(message)
        }
    }
}
