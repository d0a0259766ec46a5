//! Reporting and export: JSON, CSV and Markdown artifacts.
//!
//! Every run is saved under `<output_dir>/<run_id>/`:
//! - `manifest.json`: the full `BacktestResult`, schema-versioned
//! - `trade_sheet.csv`: one row per executed order
//! - `signals.csv`: the signal stream, enough to replay the run on its own
//! - `metrics.json`, `config.json`
//! - `report.md`: human-readable summary
//!
//! Unknown schema versions are rejected on load. Each file is written to a
//! temporary sibling and renamed into place, so concurrent saves of the same
//! run never interleave.

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use tempfile::NamedTempFile;
use tandem_core::domain::{
    parse_timestamp, SignalCode, SignalKind, SignalRecord, TradeRecord, TIMESTAMP_FORMAT,
};

use crate::runner::{BacktestResult, SCHEMA_VERSION};

// ─── JSON export ────────────────────────────────────────────────────

pub fn export_json(result: &BacktestResult) -> Result<String> {
    serde_json::to_string_pretty(result).context("failed to serialize BacktestResult to JSON")
}

/// Deserialize a `BacktestResult`, rejecting unknown schema versions.
pub fn import_json(json: &str) -> Result<BacktestResult> {
    let result: BacktestResult =
        serde_json::from_str(json).context("failed to deserialize BacktestResult from JSON")?;
    if result.schema_version > SCHEMA_VERSION {
        bail!(
            "unsupported schema version {} (max supported: {})",
            result.schema_version,
            SCHEMA_VERSION
        );
    }
    Ok(result)
}

// ─── CSV export ─────────────────────────────────────────────────────

/// Trade ledger as CSV.
///
/// Columns: date_time, executed_price, capital, signal, order_status,
/// order_type, profit_loss_pct, stop_loss. A flat resulting position writes
/// stop_loss as 0.
pub fn export_trade_sheet_csv(trades: &[TradeRecord]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record([
        "date_time",
        "executed_price",
        "capital",
        "signal",
        "order_status",
        "order_type",
        "profit_loss_pct",
        "stop_loss",
    ])?;

    for t in trades {
        let row: [String; 8] = [
            t.timestamp.format(TIMESTAMP_FORMAT).to_string(),
            t.executed_price.to_string(),
            t.capital_after.to_string(),
            t.signal.value().to_string(),
            t.resulting_position.order_status().to_string(),
            t.order_kind.label().to_string(),
            t.pnl_pct.to_string(),
            t.stop_loss_level.unwrap_or(0.0).to_string(),
        ];
        wtr.write_record(&row)?;
    }

    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

/// Signal stream as CSV: datetime, open, high, low, close, volume, signals.
pub fn export_signals_csv(signals: &[SignalRecord]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record(["datetime", "open", "high", "low", "close", "volume", "signals"])?;
    for s in signals {
        wtr.write_record([
            &s.timestamp.format(TIMESTAMP_FORMAT).to_string(),
            &s.open.to_string(),
            &s.high.to_string(),
            &s.low.to_string(),
            &s.close.to_string(),
            &s.volume.to_string(),
            &s.signal.value().to_string(),
        ])?;
    }
    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

#[derive(Debug, Deserialize)]
struct SignalRow {
    datetime: String,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    #[serde(default)]
    volume: f64,
    signals: i64,
}

/// Parse a signals CSV back into records.
///
/// The file does not say which rows came from the intrabar scan, so every
/// record is read back as [`SignalKind::Market`].
pub fn parse_signals_csv(text: &str) -> Result<Vec<SignalRecord>> {
    let mut reader = csv::Reader::from_reader(text.as_bytes());
    let mut records = Vec::new();
    for (row, result) in reader.deserialize::<SignalRow>().enumerate() {
        let raw = result.with_context(|| format!("malformed signal row {row}"))?;
        let Some(timestamp) = parse_timestamp(&raw.datetime) else {
            bail!("row {row}: cannot parse timestamp '{}'", raw.datetime);
        };
        let signal = SignalCode::try_from(raw.signals).with_context(|| format!("row {row}"))?;
        records.push(SignalRecord {
            timestamp,
            open: raw.open,
            high: raw.high,
            low: raw.low,
            close: raw.close,
            volume: raw.volume,
            signal,
            kind: SignalKind::Market,
        });
    }
    Ok(records)
}

pub fn read_signals_csv(path: &Path) -> Result<Vec<SignalRecord>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    parse_signals_csv(&text).with_context(|| format!("invalid signals file {}", path.display()))
}

// ─── Artifact bundle ────────────────────────────────────────────────

/// Save the full artifact set for one run into `<output_dir>/<run_id>/`.
///
/// Re-running the same config overwrites the same directory. Returns the
/// directory path.
pub fn save_artifacts(result: &BacktestResult, output_dir: &Path) -> Result<PathBuf> {
    let run_dir = output_dir.join(&result.run_id);
    std::fs::create_dir_all(&run_dir)
        .with_context(|| format!("failed to create artifact dir: {}", run_dir.display()))?;

    let write = |name: &str, content: &str| write_atomic(&run_dir.join(name), content);

    write("manifest.json", &export_json(result)?)?;
    write("trade_sheet.csv", &export_trade_sheet_csv(&result.trades)?)?;
    write("signals.csv", &export_signals_csv(&result.signals)?)?;
    write(
        "metrics.json",
        &serde_json::to_string_pretty(&result.metrics).context("failed to serialize metrics")?,
    )?;
    write(
        "config.json",
        &serde_json::to_string_pretty(&result.config).context("failed to serialize config")?,
    )?;
    write("report.md", &generate_report(result))?;

    Ok(run_dir)
}

/// Write `content` to a temporary file next to `path`, then rename it over `path`.
fn write_atomic(path: &Path, content: &str) -> Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp = NamedTempFile::new_in(dir)
        .with_context(|| format!("failed to create temp file in {}", dir.display()))?;
    tmp.write_all(content.as_bytes())
        .with_context(|| format!("failed to write {}", path.display()))?;
    tmp.persist(path)
        .map_err(|e| e.error)
        .with_context(|| format!("failed to move {} into place", path.display()))?;
    Ok(())
}

/// Load a `BacktestResult` from an artifact directory's manifest.json.
pub fn load_artifacts(dir: &Path) -> Result<BacktestResult> {
    let manifest_path = dir.join("manifest.json");
    let json = std::fs::read_to_string(&manifest_path)
        .with_context(|| format!("failed to read {}", manifest_path.display()))?;
    import_json(&json)
}

// ─── Markdown report ────────────────────────────────────────────────

/// Single-run Markdown report.
pub fn generate_report(result: &BacktestResult) -> String {
    let mut md = String::with_capacity(2048);
    let bt = &result.config.backtester;

    md.push_str("# Backtest Report\n\n");

    md.push_str("## Metadata\n\n");
    md.push_str("| Field | Value |\n");
    md.push_str("| --- | --- |\n");
    md.push_str(&format!("| Run | {} |\n", result.run_id));
    md.push_str(&format!("| Strategy | {} |\n", result.strategy));
    md.push_str(&format!(
        "| Timeframes | {} over {} |\n",
        bt.high_time, bt.low_time
    ));
    md.push_str(&format!(
        "| Period | {} to {} |\n",
        result.start_date, result.end_date
    ));
    md.push_str(&format!(
        "| Bars | {} high, {} low |\n",
        result.high_bars, result.low_bars
    ));
    md.push_str(&format!("| Initial Capital | {:.2} |\n", result.initial_capital));
    md.push_str(&format!(
        "| Costs | slippage {}, leverage {}, margin {} |\n",
        bt.slippage, bt.leverage, bt.margin
    ));
    md.push_str(&format!("| Dataset Hash | {} |\n", result.dataset_hash));
    md.push('\n');

    let m = &result.metrics;
    md.push_str("## Performance Summary\n\n");
    md.push_str("| Metric | Value |\n");
    md.push_str("| --- | --- |\n");
    md.push_str(&format!("| Final Balance | {:.2} |\n", m.final_balance));
    md.push_str(&format!("| Net Profit | {:.2} |\n", m.net_profit));
    md.push_str(&format!("| Gross Profit | {:.2} |\n", m.gross_profit));
    md.push_str(&format!("| Gross Loss | {:.2} |\n", m.gross_loss));
    md.push_str(&format!("| Buy & Hold | {:.2} |\n", m.buy_and_hold_return));
    md.push_str(&format!("| Max Drawdown | {:.2}% |\n", m.max_drawdown_pct));
    md.push_str(&format!("| Sharpe | {:.3} |\n", m.sharpe_ratio));
    md.push_str(&format!("| Sortino | {:.3} |\n", m.sortino_ratio));
    md.push_str(&format!("| Win Rate | {:.1}% |\n", m.win_rate));
    md.push_str(&format!(
        "| Trades | {} ({} long, {} short) |\n",
        m.num_of_trades, m.total_long_trades, m.total_short_trades
    ));
    md.push_str(&format!(
        "| Avg Holding | {} |\n",
        format_secs(m.average_holding_secs)
    ));
    md.push_str(&format!(
        "| Max Holding | {} |\n",
        format_secs(m.maximum_holding_secs)
    ));
    md.push_str(&format!("| Total Fee | {:.2} |\n", m.total_fee));
    md.push('\n');

    md.push_str("## Execution\n\n");
    md.push_str(&format!("- Orders: {}\n", result.trades.len()));
    md.push_str(&format!("- High steps: {}\n", result.high_steps));
    md.push_str(&format!("- Dropped fills: {}\n", result.dropped_fills));
    let replay = match result.replay_reconciled {
        Some(true) => "reconciled",
        Some(false) => "**DIVERGED**",
        None => "not run",
    };
    md.push_str(&format!("- Replay validation: {replay}\n"));

    md
}

fn format_secs(secs: f64) -> String {
    let total = secs.round() as i64;
    let (days, rem) = (total / 86_400, total % 86_400);
    let (hours, rem) = (rem / 3_600, rem % 3_600);
    let minutes = rem / 60;
    if days > 0 {
        format!("{days}d {hours}h {minutes}m")
    } else {
        format!("{hours}h {minutes}m")
    }
}
