//! Bar loading for the runner.
//!
//! Reads the high and low timeframe CSV files named by a [`BacktestConfig`]
//! into validated [`BarSeries`]. Files carry a `datetime` column plus OHLCV;
//! any timestamp layout accepted by [`parse_timestamp`] is allowed.
//!
//! Also hosts the synthetic generator used by demos and tests: a seeded
//! random walk on the low timeframe, aggregated into high bars.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

use tandem_core::domain::{parse_timestamp, Bar, BarSeries, Timeframe, TIMESTAMP_FORMAT};
use tandem_core::EngineError;

use crate::config::{BacktestConfig, ConfigError};

/// Errors from the data loading layer.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("i/o error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("csv error in {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("{path} row {row}: cannot parse timestamp '{value}'")]
    Timestamp {
        path: PathBuf,
        row: usize,
        value: String,
    },

    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("series error: {0}")]
    Engine(#[from] EngineError),

    #[error("synthetic data: {0}")]
    Synthetic(String),
}

/// On-disk row layout shared by reader and writer.
#[derive(Debug, Serialize, Deserialize)]
struct CsvBar {
    datetime: String,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    #[serde(default)]
    volume: f64,
}

/// Both series of one backtest plus their provenance hash.
#[derive(Debug, Clone)]
pub struct LoadedData {
    pub high: BarSeries,
    pub low: BarSeries,
    /// BLAKE3 over both series, high first.
    pub dataset_hash: String,
}

impl LoadedData {
    pub fn new(high: BarSeries, low: BarSeries) -> Self {
        let dataset_hash = compute_dataset_hash(&high, &low);
        Self {
            high,
            low,
            dataset_hash,
        }
    }
}

/// Load one CSV file into a series named `name`.
pub fn load_series(path: &Path, name: &str) -> Result<BarSeries, LoadError> {
    let csv_err = |source| LoadError::Csv {
        path: path.to_path_buf(),
        source,
    };
    let mut reader = csv::Reader::from_path(path).map_err(csv_err)?;

    let mut bars = Vec::new();
    for (row, record) in reader.deserialize::<CsvBar>().enumerate() {
        let raw = record.map_err(csv_err)?;
        let timestamp = parse_timestamp(&raw.datetime).ok_or_else(|| LoadError::Timestamp {
            path: path.to_path_buf(),
            row,
            value: raw.datetime.clone(),
        })?;
        bars.push(Bar {
            timestamp,
            open: raw.open,
            high: raw.high,
            low: raw.low,
            close: raw.close,
            volume: raw.volume,
        });
    }

    let insane = bars.iter().filter(|b| !b.is_sane()).count();
    if insane > 0 {
        debug!(path = %path.display(), insane, "series contains bars failing OHLC sanity");
    }

    Ok(BarSeries::new(name, bars)?)
}

/// Load the high and low series a config points at.
pub fn load_pair(config: &BacktestConfig) -> Result<LoadedData, LoadError> {
    let high_path = config.high_path()?;
    let low_path = config.low_path()?;
    let high = load_series(&high_path, &config.backtester.high_time)?;
    let low = load_series(&low_path, &config.backtester.low_time)?;
    info!(
        high = %high_path.display(),
        high_bars = high.len(),
        low = %low_path.display(),
        low_bars = low.len(),
        "loaded bar data"
    );
    Ok(LoadedData::new(high, low))
}

/// Write bars in the layout [`load_series`] reads.
pub fn write_bars_csv(path: &Path, bars: &[Bar]) -> Result<(), LoadError> {
    let csv_err = |source| LoadError::Csv {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|source| LoadError::Io {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    let mut writer = csv::Writer::from_path(path).map_err(csv_err)?;
    for bar in bars {
        writer
            .serialize(CsvBar {
                datetime: bar.timestamp.format(TIMESTAMP_FORMAT).to_string(),
                open: bar.open,
                high: bar.high,
                low: bar.low,
                close: bar.close,
                volume: bar.volume,
            })
            .map_err(csv_err)?;
    }
    writer.flush().map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Deterministic content hash over every timestamp and OHLCV value.
fn compute_dataset_hash(high: &BarSeries, low: &BarSeries) -> String {
    let mut hasher = blake3::Hasher::new();
    for series in [high, low] {
        hasher.update(series.name().as_bytes());
        for bar in series.bars() {
            hasher.update(&bar.timestamp.and_utc().timestamp().to_le_bytes());
            hasher.update(&bar.open.to_le_bytes());
            hasher.update(&bar.high.to_le_bytes());
            hasher.update(&bar.low.to_le_bytes());
            hasher.update(&bar.close.to_le_bytes());
            hasher.update(&bar.volume.to_le_bytes());
        }
    }
    hasher.finalize().to_hex().to_string()
}

// ─── Synthetic data ─────────────────────────────────────────────────

/// Shape of a generated dataset.
#[derive(Debug, Clone)]
pub struct SyntheticSpec {
    /// Seeds the generator; the same symbol always yields the same bars.
    pub symbol: String,
    pub start: NaiveDateTime,
    pub high: Timeframe,
    pub low: Timeframe,
    pub high_bars: usize,
    pub start_price: f64,
}

/// Generate matching low and high bars, returned as `(high, low)`.
///
/// The high stride must be a whole multiple of the low stride. Every high bar
/// is the OHLCV aggregate of the low bars inside its interval.
pub fn generate_synthetic(spec: &SyntheticSpec) -> Result<(Vec<Bar>, Vec<Bar>), LoadError> {
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    let (high_min, low_min) = (spec.high.minutes(), spec.low.minutes());
    if low_min == 0 || high_min % low_min != 0 {
        return Err(LoadError::Synthetic(format!(
            "high timeframe {} is not a multiple of low timeframe {}",
            spec.high, spec.low
        )));
    }
    if !(spec.start_price.is_finite() && spec.start_price > 0.0) {
        return Err(LoadError::Synthetic(format!(
            "start price {} must be positive",
            spec.start_price
        )));
    }
    let per_high = (high_min / low_min) as usize;

    let seed: [u8; 32] = *blake3::hash(spec.symbol.as_bytes()).as_bytes();
    let mut rng = StdRng::from_seed(seed);

    let low_stride = spec.low.duration();
    let mut price = spec.start_price;
    let mut low = Vec::with_capacity(spec.high_bars * per_high);
    for k in 0..spec.high_bars * per_high {
        let step: f64 = rng.gen_range(-0.004..0.004);
        let open = price;
        let close = price * (1.0 + step);
        low.push(Bar {
            timestamp: spec.start + low_stride * k as i32,
            open,
            high: open.max(close) * (1.0 + rng.gen_range(0.0..0.001)),
            low: open.min(close) * (1.0 - rng.gen_range(0.0..0.001)),
            close,
            volume: rng.gen_range(10.0..1_000.0),
        });
        price = close;
    }

    let high = low
        .chunks(per_high)
        .filter_map(|chunk| {
            let first = chunk.first()?;
            let last = chunk.last()?;
            Some(Bar {
                timestamp: first.timestamp,
                open: first.open,
                high: chunk.iter().map(|b| b.high).fold(f64::MIN, f64::max),
                low: chunk.iter().map(|b| b.low).fold(f64::MAX, f64::min),
                close: last.close,
                volume: chunk.iter().map(|b| b.volume).sum(),
            })
        })
        .collect();

    Ok((high, low))
}

/// Generate a dataset and write `{symbol}_{tf}.csv` for both timeframes into `dir`.
pub fn write_synthetic(spec: &SyntheticSpec, dir: &Path) -> Result<(PathBuf, PathBuf), LoadError> {
    let (high, low) = generate_synthetic(spec)?;
    let high_path = dir.join(format!("{}_{}.csv", spec.symbol, spec.high));
    let low_path = dir.join(format!("{}_{}.csv", spec.symbol, spec.low));
    write_bars_csv(&high_path, &high)?;
    write_bars_csv(&low_path, &low)?;
    info!(
        symbol = %spec.symbol,
        high_bars = high.len(),
        low_bars = low.len(),
        dir = %dir.display(),
        "wrote synthetic data"
    );
    Ok((high_path, low_path))
}
