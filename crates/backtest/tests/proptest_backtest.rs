use backtest::{run, ParamGrid, ParamSweep, PerformanceMetrics};
use chrono::{Duration, TimeZone, Utc};
use common::{PriceBar, StrategyParameters};
use proptest::prelude::*;

fn bars(closes: &[f64]) -> Vec<PriceBar> {
    let start = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
    closes
        .iter()
        .enumerate()
        .map(|(i, &c)| PriceBar::flat(start + Duration::days(i as i64), c))
        .collect()
}

proptest! {
    /// Without a full lookback window no position is ever taken.
    #[test]
    fn short_series_keeps_constant_equity(
        closes in prop::collection::vec(1.0f64..10_000.0, 0..20),
        devfactor in 0.1f64..4.0,
        stake in 1u64..1_000,
    ) {
        let params = StrategyParameters::new(20, devfactor, stake);
        let result = run(&bars(&closes), &params, 100_000.0).unwrap();
        prop_assert_eq!(result.equity_curve.len(), closes.len());
        prop_assert!(result.equity_curve.values().iter().all(|&v| v == 100_000.0));
        prop_assert!(result.final_position.is_flat());
    }

    /// A window with zero spread has no z-score, so a flat market never trades.
    #[test]
    fn flat_market_never_enters(
        price in 0.01f64..100_000.0,
        len in 1usize..120,
        lookback in 1usize..40,
        devfactor in 0.01f64..3.0,
    ) {
        let params = StrategyParameters::new(lookback, devfactor, 10);
        let result = run(&bars(&vec![price; len]), &params, 50_000.0).unwrap();
        prop_assert!(result.trades.is_empty());
        prop_assert!(result.final_position.is_flat());
        prop_assert_eq!(result.final_value, 50_000.0);
    }

    /// Metrics are always finite and drawdown is never positive.
    #[test]
    fn metrics_are_finite_for_random_walks(
        steps in prop::collection::vec(-5.0f64..5.0, 2..150),
        lookback in 2usize..30,
        devfactor in 0.5f64..3.0,
    ) {
        let mut price = 500.0;
        let closes: Vec<f64> = steps
            .iter()
            .map(|s| {
                price = (price + s).max(1.0);
                price
            })
            .collect();
        let params = StrategyParameters::new(lookback, devfactor, 5);
        let result = run(&bars(&closes), &params, 10_000.0).unwrap();
        let m = PerformanceMetrics::from_equity(&result.equity_curve.values());
        prop_assert!(m.total_return.is_finite());
        prop_assert!(m.sharpe_ratio.is_finite());
        prop_assert!(m.max_drawdown <= 0.0);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    /// Worker scheduling never changes the ranked output.
    #[test]
    fn sweep_output_is_independent_of_parallelism(
        closes in prop::collection::vec(50.0f64..150.0, 30..90),
    ) {
        let series = bars(&closes);
        let grid = ParamGrid {
            periods: vec![5, 10],
            devfactors: vec![1.0, 2.0],
            stakes: vec![10, 20],
            rsi: None,
        };
        let parallel = ParamSweep::new().run(&series, &grid, 100_000.0).unwrap();
        let sequential = ParamSweep::new()
            .with_parallelism(false)
            .run(&series, &grid, 100_000.0)
            .unwrap();
        prop_assert_eq!(parallel, sequential);
    }
}

#[test]
fn twenty_flat_bars_give_zero_metrics() {
    let result = run(
        &bars(&[100.0; 20]),
        &StrategyParameters::new(20, 2.0, 100),
        100_000.0,
    )
    .unwrap();
    let m = PerformanceMetrics::from_equity(&result.equity_curve.values());
    assert_eq!(result.final_value, 100_000.0);
    assert_eq!(m.sharpe_ratio, 0.0);
    assert_eq!(m.max_drawdown, 0.0);
}
