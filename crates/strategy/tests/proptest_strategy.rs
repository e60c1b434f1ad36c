use common::{RsiParameters, Signal, StrategyParameters};
use proptest::prelude::*;
use strategy::indicators::RollingWindow;
use strategy::StrategyCore;

fn naive_mean_std(window: &[f64]) -> (f64, f64) {
    let n = window.len() as f64;
    let mean = window.iter().sum::<f64>() / n;
    let var = window.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    (mean, var.sqrt())
}

proptest! {
    /// The incremental window agrees with a from-scratch computation.
    #[test]
    fn rolling_stats_match_naive_recompute(
        values in prop::collection::vec(1.0f64..1_000.0, 1..200),
        capacity in 2usize..30,
    ) {
        let mut window = RollingWindow::new(capacity);
        for (i, &v) in values.iter().enumerate() {
            window.push(v);
            if i + 1 >= capacity {
                let (mean, std) = naive_mean_std(&values[i + 1 - capacity..=i]);
                let got_mean = window.mean().unwrap();
                let got_std = window.std_dev().unwrap();
                prop_assert!((got_mean - mean).abs() <= 1e-9 * mean.abs().max(1.0));
                prop_assert!((got_std - std).abs() <= 1e-6 * (1.0 + std), "{} vs {}", got_std, std);
            } else {
                prop_assert!(window.mean().is_none());
            }
        }
    }

    /// Enter is only emitted from Flat and Exit only from an open position.
    #[test]
    fn positions_are_never_doubled(
        steps in prop::collection::vec(-8.0f64..8.0, 1..300),
        lookback in 2usize..25,
        threshold in 0.2f64..2.5,
        with_rsi in any::<bool>(),
    ) {
        let mut params = StrategyParameters::new(lookback, threshold, 10);
        if with_rsi {
            params = params.with_rsi(RsiParameters { period: 5, lower: 40.0, upper: 60.0 });
        }
        let mut core = StrategyCore::new(params).unwrap();
        let mut price = 200.0;
        for step in steps {
            price = (price + step).max(1.0);
            let before = core.position();
            match core.observe(&price) {
                Signal::Enter { size, .. } => {
                    prop_assert!(before.is_flat());
                    prop_assert!(size >= 10);
                    prop_assert_eq!(core.position().size(), size);
                }
                Signal::Exit => {
                    prop_assert!(!before.is_flat());
                    prop_assert!(core.position().is_flat());
                }
                Signal::Hold => prop_assert_eq!(core.position(), before),
            }
        }
    }

    /// A window with zero spread never produces an entry.
    #[test]
    fn constant_prices_never_enter(
        price in 0.001f64..1e6,
        lookback in 1usize..50,
        threshold in 0.01f64..3.0,
    ) {
        let mut core = StrategyCore::new(StrategyParameters::new(lookback, threshold, 1)).unwrap();
        for _ in 0..(lookback * 3) {
            prop_assert_eq!(core.observe(&price), Signal::Hold);
        }
    }
}
