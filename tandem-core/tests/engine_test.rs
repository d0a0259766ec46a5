//! End-to-end scenarios for the dual-timeframe engine.
//!
//! 1. Five hourly bars, long-in/long-out strategy: two round trips
//! 2. Intrabar take-profit labelling
//! 3. Dropped fills leave the state machine where it was
//! 4. Flips, square-off and replay reconciliation with costs
//! 5. Fatal alignment and date-window handling

use chrono::{Duration, NaiveDateTime};
use tandem_core::domain::{parse_timestamp, Bar, BarSeries, OrderKind, Position, SignalCode, SignalKind};
use tandem_core::engine::{Simulation, SimulationConfig};
use tandem_core::strategy::{EmaCrossover, Rule, ScriptedStrategy};
use tandem_core::EngineError;

fn ts(raw: &str) -> NaiveDateTime {
    parse_timestamp(raw).unwrap()
}

fn bar(timestamp: NaiveDateTime, close: f64) -> Bar {
    Bar {
        timestamp,
        open: close,
        high: close + 1.0,
        low: close - 1.0,
        close,
        volume: 1000.0,
    }
}

fn hourly(closes: &[f64]) -> BarSeries {
    let start = ts("2024-01-01");
    let bars = closes
        .iter()
        .enumerate()
        .map(|(i, &c)| bar(start + Duration::hours(i as i64), c))
        .collect();
    BarSeries::new("high", bars).unwrap()
}

/// `per_hour` low bars inside each hour, every one closing at that hour's close.
fn flat_low(closes: &[f64], per_hour: i64) -> BarSeries {
    let start = ts("2024-01-01");
    let stride = 60 / per_hour;
    let bars = closes
        .iter()
        .enumerate()
        .flat_map(|(h, &c)| {
            (0..per_hour).map(move |k| bar(start + Duration::minutes(h as i64 * 60 + k * stride), c))
        })
        .collect();
    BarSeries::new("low", bars).unwrap()
}

fn base_config(low_stride_minutes: i64) -> SimulationConfig {
    let mut config = SimulationConfig::new(1000.0, Duration::hours(1), Duration::minutes(low_stride_minutes));
    config.margin = 0.5;
    config
}

fn assert_approx(actual: f64, expected: f64) {
    assert!(
        (actual - expected).abs() < 1e-9,
        "actual={actual}, expected={expected}"
    );
}

// ── 1. Five-bar round trips ─────────────────────────────────────────

#[test]
fn five_bars_long_then_exit_every_step() {
    let closes = [100.0, 101.0, 99.0, 105.0, 95.0];
    let sim = Simulation::new(hourly(&closes), flat_low(&closes, 4), base_config(15)).unwrap();
    let mut strategy = ScriptedStrategy::new(0.5, 0.5)
        .long_entry(Rule::Always)
        .long_exit(Rule::Always);
    let report = sim.run(&mut strategy).unwrap();

    assert_eq!(report.final_state.trade_count, 2);
    let codes: Vec<i64> = report.trades.iter().map(|t| t.signal.value()).collect();
    assert_eq!(codes, vec![1, -1, 1, -1]);
    assert_approx(report.final_capital(), 1000.0 * (101.0 / 100.0) * (105.0 / 99.0));
    assert_eq!(report.final_state.position, Position::Flat);
    assert_eq!(report.dropped_fills, 0);
}

#[test]
fn five_bars_second_cycle_is_squared_off() {
    let closes = [100.0, 101.0, 99.0, 105.0, 95.0];
    let sim = Simulation::new(hourly(&closes), flat_low(&closes, 4), base_config(15)).unwrap();
    let mut strategy = ScriptedStrategy::new(0.5, 0.5)
        .long_entry(Rule::Always)
        .long_exit(Rule::at([1]));
    let report = sim.run(&mut strategy).unwrap();

    assert_eq!(report.final_state.trade_count, 2);
    let last = report.trades.last().unwrap();
    assert_eq!(last.executed_price, 95.0);
    assert_eq!(last.order_kind, OrderKind::Market);
    assert_eq!(last.resulting_position.order_status(), "Squared_Off");
    assert_approx(report.final_capital(), 1000.0 * (101.0 / 100.0) * (95.0 / 99.0));
}

#[test]
fn fills_are_stamped_at_resolved_time_not_decision_time() {
    let closes = [100.0, 101.0, 99.0];
    let sim = Simulation::new(hourly(&closes), flat_low(&closes, 4), base_config(15)).unwrap();
    let mut strategy = ScriptedStrategy::new(0.5, 0.5).long_entry(Rule::at([0]));
    let report = sim.run(&mut strategy).unwrap();

    // Decision at 00:00 targets 01:00; the 00:45 bar covers it.
    assert_eq!(report.trades[0].timestamp, ts("2024-01-01 00:45:00"));
    assert_eq!(report.signals[0].timestamp, ts("2024-01-01 00:45:00"));
    assert_eq!(report.signals[0].close, 100.0);
    assert_eq!(report.signals[0].kind, SignalKind::Market);
}

// ── 2. Intrabar take-profit ─────────────────────────────────────────

#[test]
fn take_profit_reached_before_stop_is_labelled_tp() {
    let high = hourly(&[100.0, 100.0, 100.0]);
    let start = ts("2024-01-01");
    // 5-minute low bars; hour 1 climbs to 110 before ever touching 95.
    let mut low_closes = vec![100.0; 12];
    low_closes.extend([102.0, 104.0, 107.0, 109.5, 110.0, 96.0, 94.0, 100.0, 100.0, 100.0, 100.0, 100.0]);
    low_closes.extend(vec![100.0; 12]);
    let low_bars = low_closes
        .iter()
        .enumerate()
        .map(|(k, &c)| bar(start + Duration::minutes(5 * k as i64), c))
        .collect();
    let low = BarSeries::new("low", low_bars).unwrap();

    let mut config = base_config(5);
    config.trailing = false;
    let sim = Simulation::new(high, low, config).unwrap();
    let mut strategy = ScriptedStrategy::new(0.1, 0.05).long_entry(Rule::at([0]));
    let report = sim.run(&mut strategy).unwrap();

    let exit = &report.trades[1];
    assert_eq!(exit.order_kind, OrderKind::TakeProfit);
    assert_eq!(exit.order_kind.label(), "TP");
    assert_eq!(exit.timestamp, ts("2024-01-01 01:20:00"));
    assert_eq!(exit.executed_price, 110.0);
    assert_eq!(exit.signal, SignalCode::Sell);
}

#[test]
fn losing_intrabar_exit_with_wide_margin_is_stop_loss() {
    let closes = [100.0, 94.0, 94.0];
    let sim = Simulation::new(hourly(&closes), flat_low(&closes, 4), base_config(15)).unwrap();
    let mut strategy = ScriptedStrategy::new(0.1, 0.05).long_entry(Rule::at([0]));
    let report = sim.run(&mut strategy).unwrap();

    let exit = &report.trades[1];
    assert_eq!(exit.order_kind, OrderKind::StopLoss);
    assert_eq!(exit.timestamp, ts("2024-01-01 01:00:00"));
    assert_approx(exit.pnl_pct, -0.06);
}

#[test]
fn losing_intrabar_exit_with_tight_margin_is_margin_call() {
    let closes = [100.0, 97.0, 97.0];
    let mut config = base_config(15);
    config.margin = 0.02;
    let sim = Simulation::new(hourly(&closes), flat_low(&closes, 4), config).unwrap();
    let mut strategy = ScriptedStrategy::new(0.1, 0.05).long_entry(Rule::at([0]));
    let report = sim.run(&mut strategy).unwrap();

    assert_eq!(report.trades[1].order_kind, OrderKind::MarginCall);
}

/// Hour 0 flat at 100, hour 1 from `path` (twelve 5-minute closes), hour 2 flat at 100.
fn five_minute_low(path: [f64; 12]) -> BarSeries {
    let start = ts("2024-01-01");
    let closes: Vec<f64> = std::iter::repeat(100.0)
        .take(12)
        .chain(path)
        .chain(std::iter::repeat(100.0).take(12))
        .collect();
    let bars = closes
        .iter()
        .enumerate()
        .map(|(k, &c)| bar(start + Duration::minutes(5 * k as i64), c))
        .collect();
    BarSeries::new("low", bars).unwrap()
}

#[test]
fn trailing_stop_hit_in_profit_is_labelled_tp() {
    let low = five_minute_low([102.0, 104.0, 106.0, 108.0, 105.0, 102.0, 101.0, 100.0, 100.0, 100.0, 100.0, 100.0]);
    let mut config = base_config(5);
    config.trailing = true;
    let sim = Simulation::new(hourly(&[100.0, 100.0, 100.0]), low, config).unwrap();
    let mut strategy = ScriptedStrategy::new(0.1, 0.05).long_entry(Rule::at([0]));
    let report = sim.run(&mut strategy).unwrap();

    // Extreme 108 puts the trailing stop at 102.6; the 102 close fires it.
    let exit = &report.trades[1];
    assert_eq!(exit.timestamp, ts("2024-01-01 01:25:00"));
    assert_eq!(exit.executed_price, 102.0);
    assert_approx(exit.pnl_pct, 0.02);
    assert_eq!(exit.order_kind, OrderKind::TakeProfit);
    assert_eq!(report.signals[1].kind, SignalKind::Intrabar);
}

#[test]
fn leverage_pulls_margin_level_inside_the_stop() {
    let low = five_minute_low([99.0, 97.5, 96.0, 100.0, 100.0, 100.0, 100.0, 100.0, 100.0, 100.0, 100.0, 100.0]);
    let mut config = base_config(5);
    config.margin = 0.2;
    config.leverage = 10.0;
    let sim = Simulation::new(hourly(&[100.0, 100.0, 100.0]), low, config).unwrap();
    let mut strategy = ScriptedStrategy::new(0.1, 0.05).long_entry(Rule::at([0]));
    let report = sim.run(&mut strategy).unwrap();

    // Margin level 98 sits above the 95 hard stop, so 97.5 fires it.
    let exit = &report.trades[1];
    assert_eq!(exit.timestamp, ts("2024-01-01 01:05:00"));
    assert_eq!(exit.executed_price, 97.5);
    assert_approx(exit.pnl_pct, -0.25);
    assert_eq!(exit.order_kind, OrderKind::MarginCall);
}

// ── 3. Dropped fills ────────────────────────────────────────────────

#[test]
fn dropped_fill_leaves_state_and_retries_next_step() {
    let high = hourly(&[100.0, 102.0, 104.0, 106.0]);
    let start = ts("2024-01-01");
    // 5-minute bars up to 00:50, then a gap until 01:20: nothing within
    // 15 minutes of the 01:00 target and nothing covering it from before.
    let minutes: Vec<i64> = (0..=10).map(|k| k * 5).chain((16..48).map(|k| k * 5)).collect();
    let low_bars = minutes
        .iter()
        .map(|&m| bar(start + Duration::minutes(m), 100.0))
        .collect();
    let low = BarSeries::new("low", low_bars).unwrap();

    let mut config = base_config(5);
    config.fill_tolerance = Duration::minutes(15);
    let sim = Simulation::new(high, low, config).unwrap();
    let mut strategy = ScriptedStrategy::new(0.5, 0.5).long_entry(Rule::at([0, 1]));
    let report = sim.run(&mut strategy).unwrap();

    assert_eq!(report.dropped_fills, 1);
    // The step-1 decision is the first trade, filled just before 02:00.
    let first = &report.trades[0];
    assert_eq!(first.signal, SignalCode::Buy);
    assert_eq!(first.executed_price, 102.0);
    assert_eq!(first.timestamp, ts("2024-01-01 01:55:00"));
}

#[test]
fn only_dropped_decisions_produce_no_trades() {
    let high = hourly(&[100.0, 102.0, 104.0]);
    let start = ts("2024-01-01");
    let minutes: Vec<i64> = (0..=10).map(|k| k * 5).chain((16..36).map(|k| k * 5)).collect();
    let low_bars = minutes
        .iter()
        .map(|&m| bar(start + Duration::minutes(m), 100.0))
        .collect();
    let low = BarSeries::new("low", low_bars).unwrap();

    let sim = Simulation::new(high, low, base_config(5)).unwrap();
    let mut strategy = ScriptedStrategy::new(0.5, 0.5).long_entry(Rule::at([0]));
    let report = sim.run(&mut strategy).unwrap();

    assert!(report.trades.is_empty());
    assert_eq!(report.final_state.position, Position::Flat);
    assert_eq!(report.final_capital(), 1000.0);
}

// ── 4. Flips, costs and replay ──────────────────────────────────────

#[test]
fn flip_is_a_single_order_with_one_fee() {
    let closes = [100.0, 98.0, 96.0, 97.0];
    let mut config = base_config(15);
    config.slippage = 0.001;
    let sim = Simulation::new(hourly(&closes), flat_low(&closes, 4), config).unwrap();
    let mut strategy = ScriptedStrategy::new(0.5, 0.5)
        .short_entry(Rule::at([0]))
        .long_entry(Rule::at([2]));
    let report = sim.run(&mut strategy).unwrap();

    let codes: Vec<i64> = report.trades.iter().map(|t| t.signal.value()).collect();
    assert_eq!(codes, vec![-1, 2, -1]);
    assert_eq!(report.signals.len(), 3);
    assert_eq!(report.trades[0].fee, 0.0);
    assert!(report.trades[1..].iter().all(|t| t.fee > 0.0));

    let fees: f64 = report.trades.iter().map(|t| t.fee).sum();
    assert_approx(fees, report.final_state.total_fees);

    let replay = report.reconciled_replay().unwrap().unwrap();
    assert_approx(replay.final_capital, report.final_capital());
    assert_eq!(replay.round_trips, 2);
}

#[test]
fn flat_round_trip_charges_one_fee() {
    let closes = [100.0, 100.0, 100.0];
    let mut config = base_config(15);
    config.slippage = 0.01;
    let sim = Simulation::new(hourly(&closes), flat_low(&closes, 4), config).unwrap();
    let mut strategy = ScriptedStrategy::new(0.5, 0.5)
        .long_entry(Rule::at([0]))
        .long_exit(Rule::at([1]));
    let report = sim.run(&mut strategy).unwrap();

    assert_eq!(report.trades.len(), 2);
    assert_eq!(report.trades[0].fee, 0.0);
    assert_approx(report.trades[0].capital_after, 1000.0);
    assert_approx(report.trades[1].fee, 10.0);
    assert_approx(report.final_capital(), 990.0);
    assert_approx(report.final_state.total_fees, 10.0);

    let replay = report.reconciled_replay().unwrap().unwrap();
    assert_approx(replay.total_fees, 10.0);
}

#[test]
fn ema_crossover_run_reconciles_with_replay() {
    let closes: Vec<f64> = (0..120)
        .map(|i| 100.0 + 10.0 * (i as f64 / 7.0).sin() + i as f64 * 0.05)
        .collect();
    let mut config = base_config(15);
    config.slippage = 0.0015;
    config.leverage = 2.0;
    let sim = Simulation::new(hourly(&closes), flat_low(&closes, 4), config).unwrap();
    let mut strategy = EmaCrossover::new(3, 8, 0.1, 0.05);
    let report = sim.run(&mut strategy).unwrap();

    assert!(!report.trades.is_empty());
    assert!(report.reconciled_replay().is_ok());
    let replay = report.replay.as_ref().unwrap();
    assert!((replay.total_fees - report.final_state.total_fees).abs() < 1e-9);
    assert_eq!(replay.final_position, Position::Flat);
}

#[test]
fn replay_validation_can_be_disabled() {
    let closes = [100.0, 101.0];
    let mut config = base_config(15);
    config.validate_replay = false;
    let sim = Simulation::new(hourly(&closes), flat_low(&closes, 4), config).unwrap();
    let report = sim.run(&mut ScriptedStrategy::new(0.1, 0.05)).unwrap();
    assert!(report.replay.is_none());
    assert!(report.replay_error.is_none());
}

// ── 5. Fatal errors and windows ─────────────────────────────────────

#[test]
fn low_series_ending_early_is_an_alignment_error() {
    let closes = [100.0, 101.0, 102.0, 103.0];
    let low = flat_low(&closes[..2], 4);
    let sim = Simulation::new(hourly(&closes), low, base_config(15)).unwrap();
    let err = sim.run(&mut ScriptedStrategy::new(0.1, 0.05)).unwrap_err();
    assert!(matches!(err, EngineError::Alignment { high_index: 2, .. }));
}

#[test]
fn date_window_limits_the_loop() {
    let closes = [100.0, 101.0, 102.0, 103.0, 104.0, 105.0];
    let mut config = base_config(15);
    config.entry_date = Some(ts("2024-01-01 02:00:00"));
    config.exit_date = Some(ts("2024-01-01 04:30:00"));
    let sim = Simulation::new(hourly(&closes), flat_low(&closes, 4), config).unwrap();
    assert_eq!(sim.bounds().unwrap(), (2, 4));
    assert_eq!(sim.low().first().unwrap().timestamp, ts("2024-01-01 02:00:00"));
    assert_eq!(sim.low().last().unwrap().timestamp, ts("2024-01-01 04:30:00"));

    let mut strategy = ScriptedStrategy::new(0.5, 0.5).long_entry(Rule::Always);
    let report = sim.run(&mut strategy).unwrap();
    assert_eq!(report.high_steps, 2);
    assert_eq!(report.trades[0].executed_price, 102.0);
    // Squared off at the exit bar (04:00).
    assert_eq!(report.trades.last().unwrap().executed_price, 104.0);
}
