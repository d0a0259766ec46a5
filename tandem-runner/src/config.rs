//! Typed backtest configuration, loaded from TOML and validated up front.
//!
//! ```toml
//! [data]
//! path = "data"
//! files = { "1d" = "BTC_1d.csv", "3m" = "BTC_3m.csv" }
//! entry_date = "2021-01-01"
//!
//! [backtester]
//! high_time = "1d"
//! low_time = "3m"
//! capital = 1000.0
//! slippage = 0.0015
//! margin = 0.02
//! leverage = 1.0
//! trailing = false
//! take_profit_pct = 0.1
//! stop_loss_pct = 0.05
//!
//! [strategy]
//! type = "ema_crossover"
//! fast_period = 9
//! slow_period = 12
//! ```

use chrono::{Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

use tandem_core::domain::{parse_timestamp, to_minutes, TimeframeError};
use tandem_core::engine::{SimulationConfig, DEFAULT_FILL_TOLERANCE_MINUTES};
use tandem_core::strategy::{EmaCrossover, Strategy};

/// Content hash of a configuration.
pub type RunId = String;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },

    #[error("invalid timeframe '{label}': {source}")]
    Timeframe {
        label: String,
        #[source]
        source: TimeframeError,
    },

    #[error("no data file configured for timeframe '{0}'")]
    MissingFile(String),

    #[error("failed to serialize config: {0}")]
    Serialize(#[from] serde_json::Error),
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.into(),
    }
}

/// Complete configuration for one backtest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BacktestConfig {
    pub data: DataConfig,
    pub backtester: BacktesterConfig,
    pub strategy: StrategyConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DataConfig {
    /// Base directory for the data files.
    pub path: PathBuf,
    /// Timeframe label → file name under `path`.
    pub files: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entry_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_date: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BacktesterConfig {
    pub high_time: String,
    pub low_time: String,
    pub capital: f64,
    pub slippage: f64,
    pub margin: f64,
    pub leverage: f64,
    pub trailing: bool,
    pub take_profit_pct: f64,
    pub stop_loss_pct: f64,
    #[serde(default = "default_fill_tolerance")]
    pub fill_tolerance_minutes: i64,
    #[serde(default = "default_true")]
    pub validate_replay: bool,
}

fn default_fill_tolerance() -> i64 {
    DEFAULT_FILL_TOLERANCE_MINUTES
}

fn default_true() -> bool {
    true
}

/// Strategy selection (serializable enum).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", deny_unknown_fields)]
pub enum StrategyConfig {
    /// Fast EMA above slow EMA goes long, below goes short.
    EmaCrossover { fast_period: usize, slow_period: usize },
}

impl StrategyConfig {
    /// Build the strategy, handing it the configured take-profit and stop-loss.
    pub fn build(&self, take_profit_pct: f64, stop_loss_pct: f64) -> Box<dyn Strategy> {
        match *self {
            Self::EmaCrossover {
                fast_period,
                slow_period,
            } => Box::new(EmaCrossover::new(
                fast_period,
                slow_period,
                take_profit_pct,
                stop_loss_pct,
            )),
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        match *self {
            Self::EmaCrossover {
                fast_period,
                slow_period,
            } => {
                if fast_period == 0 || slow_period == 0 {
                    return Err(invalid("strategy", "EMA periods must be at least 1"));
                }
                if fast_period >= slow_period {
                    return Err(invalid(
                        "strategy",
                        format!("fast_period {fast_period} must be below slow_period {slow_period}"),
                    ));
                }
                Ok(())
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OutputConfig {
    #[serde(default = "default_output_dir")]
    pub dir: PathBuf,
    #[serde(default)]
    pub print_metrics: bool,
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("results")
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: default_output_dir(),
            print_metrics: false,
        }
    }
}

impl BacktestConfig {
    /// Read, parse and validate a TOML config file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Parse and validate TOML text.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let bt = &self.backtester;
        if !(bt.capital.is_finite() && bt.capital > 0.0) {
            return Err(invalid("backtester.capital", format!("{} must be positive", bt.capital)));
        }
        if !(bt.leverage.is_finite() && bt.leverage > 0.0) {
            return Err(invalid("backtester.leverage", format!("{} must be positive", bt.leverage)));
        }
        if !(0.0..1.0).contains(&bt.slippage) {
            return Err(invalid("backtester.slippage", format!("{} must be in [0, 1)", bt.slippage)));
        }
        for (field, value) in [
            ("backtester.margin", bt.margin),
            ("backtester.take_profit_pct", bt.take_profit_pct),
            ("backtester.stop_loss_pct", bt.stop_loss_pct),
        ] {
            if !(value.is_finite() && value >= 0.0) {
                return Err(invalid(field, format!("{value} must be non-negative")));
            }
        }
        if bt.fill_tolerance_minutes < 0 {
            return Err(invalid(
                "backtester.fill_tolerance_minutes",
                format!("{} must be non-negative", bt.fill_tolerance_minutes),
            ));
        }

        let high = self.high_minutes()?;
        let low = self.low_minutes()?;
        if low > high {
            return Err(invalid(
                "backtester.low_time",
                format!("'{}' is coarser than high_time '{}'", bt.low_time, bt.high_time),
            ));
        }
        for label in [&bt.high_time, &bt.low_time] {
            if !self.data.files.contains_key(label) {
                return Err(ConfigError::MissingFile(label.clone()));
            }
        }

        let entry = parse_date("data.entry_date", self.data.entry_date.as_deref())?;
        let exit = parse_date("data.exit_date", self.data.exit_date.as_deref())?;
        if let (Some(entry), Some(exit)) = (entry, exit) {
            if entry > exit {
                return Err(invalid("data.entry_date", format!("{entry} is after exit_date {exit}")));
            }
        }

        self.strategy.validate()
    }

    /// Deterministic identity of this configuration (BLAKE3 over its JSON form).
    pub fn run_id(&self) -> Result<RunId, ConfigError> {
        let json = serde_json::to_string(self)?;
        Ok(blake3::hash(json.as_bytes()).to_hex().to_string())
    }

    pub fn high_minutes(&self) -> Result<u32, ConfigError> {
        timeframe_minutes(&self.backtester.high_time)
    }

    pub fn low_minutes(&self) -> Result<u32, ConfigError> {
        timeframe_minutes(&self.backtester.low_time)
    }

    pub fn high_path(&self) -> Result<PathBuf, ConfigError> {
        self.file_for(&self.backtester.high_time)
    }

    pub fn low_path(&self) -> Result<PathBuf, ConfigError> {
        self.file_for(&self.backtester.low_time)
    }

    fn file_for(&self, label: &str) -> Result<PathBuf, ConfigError> {
        self.data
            .files
            .get(label)
            .map(|file| self.data.path.join(file))
            .ok_or_else(|| ConfigError::MissingFile(label.to_string()))
    }

    pub fn entry_date(&self) -> Result<Option<NaiveDateTime>, ConfigError> {
        parse_date("data.entry_date", self.data.entry_date.as_deref())
    }

    pub fn exit_date(&self) -> Result<Option<NaiveDateTime>, ConfigError> {
        parse_date("data.exit_date", self.data.exit_date.as_deref())
    }

    /// Engine parameters for this configuration.
    pub fn to_simulation_config(&self) -> Result<SimulationConfig, ConfigError> {
        let bt = &self.backtester;
        let mut sim = SimulationConfig::new(
            bt.capital,
            Duration::minutes(i64::from(self.high_minutes()?)),
            Duration::minutes(i64::from(self.low_minutes()?)),
        );
        sim.slippage = bt.slippage;
        sim.margin = bt.margin;
        sim.leverage = bt.leverage;
        sim.trailing = bt.trailing;
        sim.take_profit_pct = bt.take_profit_pct;
        sim.stop_loss_pct = bt.stop_loss_pct;
        sim.fill_tolerance = Duration::minutes(bt.fill_tolerance_minutes);
        sim.entry_date = self.entry_date()?;
        sim.exit_date = self.exit_date()?;
        sim.validate_replay = bt.validate_replay;
        Ok(sim)
    }

    pub fn build_strategy(&self) -> Box<dyn Strategy> {
        self.strategy
            .build(self.backtester.take_profit_pct, self.backtester.stop_loss_pct)
    }
}

fn timeframe_minutes(label: &str) -> Result<u32, ConfigError> {
    to_minutes(label).map_err(|source| ConfigError::Timeframe {
        label: label.to_string(),
        source,
    })
}

fn parse_date(field: &'static str, raw: Option<&str>) -> Result<Option<NaiveDateTime>, ConfigError> {
    raw.map(|r| parse_timestamp(r).ok_or_else(|| invalid(field, format!("cannot parse '{r}' as a date"))))
        .transpose()
}
