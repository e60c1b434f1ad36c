//! Parameter sweep over a Cartesian grid of strategy parameters.

use std::cmp::Ordering;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use common::{Error, PriceBar, Result, RsiParameters, StrategyParameters};
use strategy::GridConfig;

use crate::engine::{self, EquityCurve};
use crate::metrics::PerformanceMetrics;

/// Parameter grid specification.
///
/// Every combination of the three dimensions is one grid point. RSI
/// settings, when present, are shared by all points.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamGrid {
    pub periods: Vec<usize>,
    pub devfactors: Vec<f64>,
    pub stakes: Vec<u64>,
    pub rsi: Option<RsiParameters>,
}

impl ParamGrid {
    pub fn from_config(cfg: &GridConfig, rsi: Option<RsiParameters>) -> Self {
        Self {
            periods: cfg.period.clone(),
            devfactors: cfg.devfactor.clone(),
            stakes: cfg.stake.clone(),
            rsi,
        }
    }

    /// Returns the total number of grid points.
    pub fn size(&self) -> usize {
        self.periods.len() * self.devfactors.len() * self.stakes.len()
    }

    /// All grid points, in canonical (period, devfactor, stake) order.
    pub fn points(&self) -> Vec<StrategyParameters> {
        let mut points = Vec::with_capacity(self.size());
        for &period in &self.periods {
            for &devfactor in &self.devfactors {
                for &stake in &self.stakes {
                    points.push(StrategyParameters {
                        lookback_period: period,
                        deviation_threshold: devfactor,
                        stake,
                        rsi: self.rsi,
                    });
                }
            }
        }
        points
    }
}

/// One row of sweep output. `metrics` is `None` for a failed grid point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepResult {
    pub parameters: StrategyParameters,
    pub metrics: Option<PerformanceMetrics>,
    pub error: Option<String>,
}

/// Results from a parameter sweep.
#[derive(Debug, Clone, PartialEq)]
pub struct SweepReport {
    /// Successful grid points, best first.
    pub ranked: Vec<SweepResult>,
    /// Failed grid points, in canonical parameter order.
    pub failed: Vec<SweepResult>,
    /// Equity curves of successful points in canonical order, when requested.
    pub curves: Vec<(StrategyParameters, EquityCurve)>,
}

impl SweepReport {
    pub fn best(&self) -> Option<&SweepResult> {
        self.ranked.first()
    }
}

/// Parameter sweep executor.
///
/// Grid points share only the read-only price series, so they run on a
/// rayon worker pool without coordination. Results are gathered by the
/// pool's ordered collector and ranked afterwards.
#[derive(Debug, Clone)]
pub struct ParamSweep {
    parallel: bool,
    threads: Option<usize>,
    keep_curves: bool,
}

impl Default for ParamSweep {
    fn default() -> Self {
        Self::new()
    }
}

impl ParamSweep {
    pub fn new() -> Self {
        Self {
            parallel: true,
            threads: None,
            keep_curves: false,
        }
    }

    /// Enables or disables parallel execution.
    pub fn with_parallelism(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Bound the worker pool. `None` uses one worker per core.
    pub fn with_threads(mut self, threads: Option<usize>) -> Self {
        self.threads = threads;
        self
    }

    /// Keep every successful run's equity curve in the report.
    pub fn with_curves(mut self, keep: bool) -> Self {
        self.keep_curves = keep;
        self
    }

    /// Run every grid point and rank the outcomes.
    ///
    /// A failing grid point becomes a failed row; only a worker pool that
    /// cannot be built is an error.
    pub fn run(
        &self,
        series: &[PriceBar],
        grid: &ParamGrid,
        initial_cash: f64,
    ) -> Result<SweepReport> {
        let points = grid.points();
        info!(points = points.len(), bars = series.len(), "Starting parameter sweep");

        let run_point = |params: &StrategyParameters| {
            (*params, engine::run(series, params, initial_cash))
        };

        let outcomes: Vec<_> = if !self.parallel {
            points.iter().map(run_point).collect()
        } else if let Some(threads) = self.threads {
            rayon::ThreadPoolBuilder::new()
                .num_threads(threads)
                .build()
                .map_err(|e| Error::Other(format!("failed to build sweep worker pool: {e}")))?
                .install(|| points.par_iter().map(run_point).collect::<Vec<_>>())
        } else {
            points.par_iter().map(run_point).collect()
        };

        let mut rows = Vec::with_capacity(outcomes.len());
        let mut curves = Vec::new();
        for (parameters, outcome) in outcomes {
            match outcome {
                Ok(result) => {
                    let metrics =
                        PerformanceMetrics::from_equity(&result.equity_curve.values());
                    rows.push(SweepResult {
                        parameters,
                        metrics: Some(metrics),
                        error: None,
                    });
                    if self.keep_curves {
                        curves.push((parameters, result.equity_curve));
                    }
                }
                Err(e) => {
                    error!(params = %parameters, error = %e, "Sweep grid point failed");
                    rows.push(SweepResult {
                        parameters,
                        metrics: None,
                        error: Some(e.to_string()),
                    });
                }
            }
        }

        let (ranked, failed) = rank(rows);
        if let Some(best) = ranked.first() {
            info!(
                best = %best.parameters,
                sharpe = best.metrics.map(|m| m.sharpe_ratio),
                failed = failed.len(),
                "Parameter sweep complete"
            );
        }
        Ok(SweepReport {
            ranked,
            failed,
            curves,
        })
    }
}

/// Split rows into (ranked successes, failures).
///
/// Successes sort by Sharpe descending, then total return descending,
/// then canonical parameter order ascending.
pub fn rank(rows: Vec<SweepResult>) -> (Vec<SweepResult>, Vec<SweepResult>) {
    let (mut ranked, mut failed): (Vec<_>, Vec<_>) =
        rows.into_iter().partition(|r| r.metrics.is_some());
    ranked.sort_by(compare_rows);
    failed.sort_by(|a, b| a.parameters.canonical_cmp(&b.parameters));
    (ranked, failed)
}

fn compare_rows(a: &SweepResult, b: &SweepResult) -> Ordering {
    let (Some(ma), Some(mb)) = (a.metrics, b.metrics) else {
        return a.parameters.canonical_cmp(&b.parameters);
    };
    mb.sharpe_ratio
        .total_cmp(&ma.sharpe_ratio)
        .then(mb.total_return.total_cmp(&ma.total_return))
        .then_with(|| a.parameters.canonical_cmp(&b.parameters))
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};

    use super::*;

    fn series() -> Vec<PriceBar> {
        let start = Utc.with_ymd_and_hms(2023, 1, 2, 0, 0, 0).unwrap();
        (0..300)
            .map(|i| {
                let wave = ((i as f64) * 0.37).sin() * 6.0 + ((i * 7919) % 23) as f64 * 0.4;
                PriceBar::flat(start + Duration::days(i), 100.0 + wave)
            })
            .collect()
    }

    fn grid() -> ParamGrid {
        ParamGrid {
            periods: vec![10, 20],
            devfactors: vec![1.5, 2.0],
            stakes: vec![50, 100],
            rsi: None,
        }
    }

    fn row(period: usize, sharpe: f64, total_return: f64) -> SweepResult {
        SweepResult {
            parameters: StrategyParameters::new(period, 2.0, 100),
            metrics: Some(PerformanceMetrics {
                total_return,
                sharpe_ratio: sharpe,
                max_drawdown: 0.0,
                final_equity: 0.0,
            }),
            error: None,
        }
    }

    #[test]
    fn grid_points_are_cartesian_in_canonical_order() {
        let points = grid().points();
        assert_eq!(points.len(), 8);
        assert_eq!(points[0], StrategyParameters::new(10, 1.5, 50));
        assert_eq!(points[1], StrategyParameters::new(10, 1.5, 100));
        assert_eq!(points[7], StrategyParameters::new(20, 2.0, 100));
    }

    #[test]
    fn eight_point_sweep_is_ranked_by_sharpe() {
        let report = ParamSweep::new().run(&series(), &grid(), 100_000.0).unwrap();
        assert_eq!(report.ranked.len(), 8);
        assert!(report.failed.is_empty());
        let sharpes: Vec<f64> = report
            .ranked
            .iter()
            .map(|r| r.metrics.unwrap().sharpe_ratio)
            .collect();
        assert!(sharpes.windows(2).all(|w| w[0] >= w[1]), "{sharpes:?}");
    }

    #[test]
    fn parallel_and_sequential_sweeps_agree() {
        let data = series();
        let par = ParamSweep::new().run(&data, &grid(), 100_000.0).unwrap();
        let seq = ParamSweep::new()
            .with_parallelism(false)
            .run(&data, &grid(), 100_000.0)
            .unwrap();
        let pooled = ParamSweep::new()
            .with_threads(Some(2))
            .run(&data, &grid(), 100_000.0)
            .unwrap();
        assert_eq!(par, seq);
        assert_eq!(par, pooled);
    }

    #[test]
    fn failed_points_are_isolated_and_unranked() {
        let mut g = grid();
        g.periods.push(0);
        let report = ParamSweep::new().run(&series(), &g, 100_000.0).unwrap();
        assert_eq!(report.ranked.len(), 8);
        assert_eq!(report.failed.len(), 4);
        assert!(report
            .failed
            .iter()
            .all(|r| r.metrics.is_none() && r.error.is_some()));
    }

    #[test]
    fn ties_break_on_total_return_then_parameters() {
        let (ranked, _) = rank(vec![
            row(30, 1.0, 0.1),
            row(10, 1.0, 0.1),
            row(20, 1.0, 0.2),
            row(40, 2.0, -0.5),
        ]);
        let periods: Vec<usize> = ranked.iter().map(|r| r.parameters.lookback_period).collect();
        assert_eq!(periods, vec![40, 20, 10, 30]);
    }

    #[test]
    fn curves_kept_on_request() {
        let report = ParamSweep::new()
            .with_curves(true)
            .run(&series(), &grid(), 10_000.0)
            .unwrap();
        assert_eq!(report.curves.len(), 8);
        assert!(report.curves.iter().all(|(_, c)| c.len() == 300));
    }
}
