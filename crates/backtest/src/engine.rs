use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use common::{Error, PositionState, PriceBar, Result, Signal, StrategyParameters};
use strategy::StrategyCore;

use crate::broker::{Broker, SimBroker, Trade};

/// Portfolio value carried into one bar.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EquityPoint {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

/// Append-only, time-ordered sequence of portfolio values, one per bar.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EquityCurve {
    points: Vec<EquityPoint>,
}

impl EquityCurve {
    pub fn with_capacity(n: usize) -> Self {
        Self {
            points: Vec::with_capacity(n),
        }
    }

    pub fn push(&mut self, timestamp: DateTime<Utc>, value: f64) {
        debug_assert!(
            self.points.last().map_or(true, |p| p.timestamp < timestamp),
            "equity points must be strictly increasing in time"
        );
        self.points.push(EquityPoint { timestamp, value });
    }

    pub fn points(&self) -> &[EquityPoint] {
        &self.points
    }

    pub fn values(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.value).collect()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn last_value(&self) -> Option<f64> {
        self.points.last().map(|p| p.value)
    }
}

/// Everything a finished run produces.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationResult {
    pub equity_curve: EquityCurve,
    pub final_position: PositionState,
    pub final_cash: f64,
    /// Mark-to-market value after the last bar's decision.
    pub final_value: f64,
    pub trades: Vec<Trade>,
}

/// Replay `series` through a fresh strategy core and simulated broker.
///
/// Errors only for unusable inputs (invalid parameters or initial cash).
/// A malformed series is logged and yields a flat `initial_cash` curve.
pub fn run(
    series: &[PriceBar],
    params: &StrategyParameters,
    initial_cash: f64,
) -> Result<SimulationResult> {
    if !initial_cash.is_finite() || initial_cash <= 0.0 {
        return Err(Error::InvalidParameters(format!(
            "initial cash must be positive, got {initial_cash}"
        )));
    }
    let core = StrategyCore::new(*params)?;

    if let Err(e) = validate_series(series) {
        warn!(error = %e, bars = series.len(), "Unusable price series, holding cash");
        return Ok(degenerate(series, initial_cash));
    }

    Ok(run_with_broker(series, core, SimBroker::new(initial_cash)))
}

/// Drive `core` over an already-validated series using any broker.
pub fn run_with_broker<B: Broker>(
    series: &[PriceBar],
    mut core: StrategyCore,
    mut broker: B,
) -> SimulationResult {
    let mut equity_curve = EquityCurve::with_capacity(series.len());
    let mut trades = Vec::new();

    for bar in series {
        // 1. Value carried into the bar, before any decision
        let value = broker.mark_to_market(bar.close);
        equity_curve.push(bar.timestamp, value);

        // 2-4. Decide and fill at the close
        match core.observe(bar) {
            Signal::Enter { direction, size } => {
                debug!(date = %bar.date(), %direction, size, price = bar.close, "Enter");
                broker.open(direction, size, bar.close, bar.timestamp);
            }
            Signal::Exit => {
                if let Some(trade) = broker.close(bar.close, bar.timestamp) {
                    debug!(date = %bar.date(), pnl = trade.pnl, price = bar.close, "Exit");
                    trades.push(trade);
                }
            }
            Signal::Hold => {}
        }
        debug_assert_eq!(core.position(), broker.snapshot().position);
    }

    let final_value = match series.last() {
        Some(bar) => broker.mark_to_market(bar.close),
        None => broker.snapshot().value,
    };
    let snapshot = broker.snapshot();

    SimulationResult {
        equity_curve,
        final_position: snapshot.position,
        final_cash: snapshot.cash,
        final_value,
        trades,
    }
}

/// Closes must be finite and timestamps strictly increasing.
pub fn validate_series(series: &[PriceBar]) -> Result<()> {
    for (i, bar) in series.iter().enumerate() {
        if !bar.close.is_finite() {
            return Err(Error::Data(format!(
                "bar {i} ({}) has non-finite close {}",
                bar.timestamp, bar.close
            )));
        }
    }
    if let Some(w) = series.windows(2).find(|w| w[1].timestamp <= w[0].timestamp) {
        return Err(Error::Data(format!(
            "timestamps not strictly increasing at {}",
            w[1].timestamp
        )));
    }
    Ok(())
}

fn degenerate(series: &[PriceBar], initial_cash: f64) -> SimulationResult {
    let equity_curve = EquityCurve {
        points: series
            .iter()
            .map(|bar| EquityPoint {
                timestamp: bar.timestamp,
                value: initial_cash,
            })
            .collect(),
    };
    SimulationResult {
        equity_curve,
        final_position: PositionState::Flat,
        final_cash: initial_cash,
        final_value: initial_cash,
        trades: Vec::new(),
    }
}
