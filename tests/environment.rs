use chrono::{Duration, TimeZone, Utc};
use fxgym::models::{Bar, Direction, ExitReason};
use fxgym::observation::ObservationWindow;
use fxgym::{
    Action, EnvError, EnvState, EnvironmentConfig, InstrumentConfig, MarketSimulationEnvironment,
    PriceSeries,
};
use std::sync::Once;

fn ensure_test_env() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = env_logger::builder().is_test(true).try_init();
    });
}

fn bars(prices: &[(f64, f64, f64, f64)]) -> Vec<Bar> {
    let start = Utc.with_ymd_and_hms(2025, 1, 6, 0, 0, 0).unwrap();
    prices
        .iter()
        .enumerate()
        .map(|(idx, &(open, high, low, close))| Bar {
            timestamp: start + Duration::hours(idx as i64),
            open,
            high,
            low,
            close,
            volume: 10.0,
            features: vec![idx as f64, close - open],
        })
        .collect()
}

fn series(prices: &[(f64, f64, f64, f64)]) -> PriceSeries {
    PriceSeries::new(
        "GOOG",
        bars(prices),
        vec!["idx".to_string(), "body".to_string()],
    )
    .unwrap()
}

fn quiet(price: f64) -> (f64, f64, f64, f64) {
    (price, price + 0.1, price - 0.1, price)
}

fn config(window_size: usize) -> EnvironmentConfig {
    EnvironmentConfig {
        instrument: InstrumentConfig {
            symbol: "GOOG".to_string(),
            pip_size: 0.01,
        },
        window_size,
        stop_loss_pips: vec![200.0, 500.0],
        take_profit_pips: vec![300.0, 1000.0],
        starting_equity: 1000.0,
        reward_scale: 1.0,
        max_holding_bars: None,
        ruin_equity: None,
    }
}

fn environment(prices: &[(f64, f64, f64, f64)], window_size: usize) -> MarketSimulationEnvironment {
    MarketSimulationEnvironment::new(series(prices), config(window_size)).unwrap()
}

#[test]
fn test_observation_never_reads_future_bars() {
    ensure_test_env();
    let prices: Vec<_> = (0..20).map(|i| quiet(100.0 + i as f64)).collect();
    let original = ObservationWindow::new(series(&prices), 5).unwrap();

    let mut perturbed_prices = prices.clone();
    for price in perturbed_prices.iter_mut().skip(11) {
        *price = quiet(1_000.0);
    }
    let perturbed = ObservationWindow::new(series(&perturbed_prices), 5).unwrap();

    for step in 4..=10 {
        assert_eq!(original.observe(step).unwrap(), perturbed.observe(step).unwrap());
    }
    assert_ne!(original.observe(11).unwrap(), perturbed.observe(11).unwrap());
}

#[test]
fn test_long_and_short_pnl_signs() {
    ensure_test_env();
    let prices = [quiet(100.0), quiet(100.0), quiet(100.0), quiet(103.5), quiet(103.5), quiet(103.5)];

    let mut long_env = environment(&prices, 2);
    long_env.reset().unwrap();
    long_env.step(Action::open_long(1, 1)).unwrap();
    long_env.step(Action::Hold).unwrap();
    let closed = long_env.step(Action::CloseExplicit).unwrap();
    let trade = closed.info.last_trade_info.unwrap();
    assert_eq!(trade.direction, Direction::Long);
    assert!((trade.pnl - 3.5).abs() < 1e-9);

    let mut short_env = environment(&prices, 2);
    short_env.reset().unwrap();
    short_env.step(Action::open_short(1, 1)).unwrap();
    short_env.step(Action::Hold).unwrap();
    let closed = short_env.step(Action::CloseExplicit).unwrap();
    assert!((closed.info.last_trade_info.unwrap().pnl + 3.5).abs() < 1e-9);
    assert!((short_env.equity() - 996.5).abs() < 1e-9);
}

#[test]
fn test_stop_loss_wins_when_bar_crosses_both_thresholds() {
    ensure_test_env();
    let prices = [
        quiet(100.0),
        quiet(100.0),
        quiet(100.0),
        (100.0, 110.0, 90.0, 100.0),
        quiet(100.0),
    ];
    let mut env = environment(&prices, 2);
    env.reset().unwrap();
    env.step(Action::open_long(0, 0)).unwrap();

    let result = env.step(Action::Hold).unwrap();
    let trade = result.info.last_trade_info.unwrap();
    assert_eq!(trade.exit_reason, ExitReason::StopLoss);
    assert!((trade.exit_price - 98.0).abs() < 1e-9);
    assert!((trade.pnl + 2.0).abs() < 1e-9);
    assert!((result.reward + 2.0).abs() < 1e-9);
}

#[test]
fn test_explicit_close_takes_precedence_over_thresholds() {
    ensure_test_env();
    let prices = [
        quiet(100.0),
        quiet(100.0),
        quiet(100.0),
        (101.0, 110.0, 90.0, 100.0),
        quiet(100.0),
    ];
    let mut env = environment(&prices, 2);
    env.reset().unwrap();
    env.step(Action::open_long(0, 0)).unwrap();

    let result = env.step(Action::CloseExplicit).unwrap();
    let trade = result.info.last_trade_info.unwrap();
    assert_eq!(trade.exit_reason, ExitReason::Explicit);
    assert!((trade.exit_price - 101.0).abs() < 1e-9);
}

#[test]
fn test_final_step_force_closes_open_position_once() {
    ensure_test_env();
    let prices = [quiet(100.0), quiet(100.0), quiet(101.0), quiet(102.0), (102.0, 102.5, 101.5, 102.25)];
    let mut env = environment(&prices, 2);
    env.reset().unwrap();

    env.step(Action::open_long(1, 1)).unwrap();
    let before_last = env.step(Action::Hold).unwrap();
    assert!(!before_last.done);
    assert_eq!(before_last.info.step_index, prices.len() - 2);

    let last = env.step(Action::Hold).unwrap();
    assert!(last.done);
    assert_eq!(env.state(), EnvState::Done);
    assert_eq!(env.trade_history().len(), 1);
    let trade = last.info.last_trade_info.unwrap();
    assert_eq!(trade.exit_reason, ExitReason::EndOfData);
    assert!((trade.exit_price - 102.25).abs() < 1e-9);
    assert!((trade.pnl - 1.25).abs() < 1e-9);
    assert!(env.position().is_none());

    assert!(matches!(env.step(Action::Hold), Err(EnvError::InvalidState(_))));
}

#[test]
fn test_reset_is_idempotent() {
    ensure_test_env();
    let prices: Vec<_> = (0..8).map(|i| quiet(100.0 + i as f64)).collect();
    let mut env = environment(&prices, 3);

    let first = env.reset().unwrap();
    let second = env.reset().unwrap();
    assert_eq!(first, second);

    env.step(Action::open_short(0, 1)).unwrap();
    env.step(Action::CloseExplicit).unwrap();
    assert_eq!(env.trade_history().len(), 1);

    let third = env.reset().unwrap();
    assert_eq!(first, third);
    assert_eq!(env.state(), EnvState::Flat);
    assert_eq!(env.equity(), 1000.0);
    assert!(env.trade_history().is_empty());
    assert!(env.equity_curve().is_empty());
    assert!(env.last_trade_info().is_none());
    assert_eq!(env.current_step_index(), Some(2));
}

#[test]
fn test_identical_action_streams_are_deterministic() {
    ensure_test_env();
    let prices: Vec<_> = (0..40)
        .map(|i| {
            let mid = 100.0 + (i as f64 * 0.7).sin() * 4.0;
            (mid, mid + 1.5, mid - 1.5, mid + 0.3)
        })
        .collect();
    let actions: Vec<usize> = (0..40).map(|i| (i * 7) % 10).collect();

    let run = || {
        let mut env = environment(&prices, 4);
        env.reset().unwrap();
        for index in &actions {
            if env.step_discrete(*index).unwrap().done {
                break;
            }
        }
        (env.trade_history().to_vec(), env.equity_curve().to_vec())
    };

    let (trades_a, curve_a) = run();
    let (trades_b, curve_b) = run();
    assert!(!trades_a.is_empty());
    assert_eq!(trades_a, trades_b);
    assert_eq!(curve_a, curve_b);

    let expected: f64 = 1000.0 + trades_a.iter().map(|trade| trade.pnl).sum::<f64>();
    assert!((curve_a.last().unwrap().equity - expected).abs() < 1e-9);
}

#[test]
fn test_short_series_is_rejected() {
    ensure_test_env();
    let prices = [quiet(100.0); 3];
    let result = MarketSimulationEnvironment::new(series(&prices), config(3));
    assert!(matches!(result, Err(EnvError::Configuration(_))));
}
