//! Risk/return statistics derived from a finished equity curve.
//!
//! Every function here is a pure function of its input and returns a
//! defined number: degenerate inputs (too few points, zero variance,
//! zero equity) map to `0.0` rather than NaN or infinity.

use serde::{Deserialize, Serialize};

const TRADING_DAYS_PER_YEAR: f64 = 252.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    pub total_return: f64,
    pub sharpe_ratio: f64,
    /// Most negative peak-to-trough decline, as a fraction (always <= 0).
    pub max_drawdown: f64,
    pub final_equity: f64,
}

impl PerformanceMetrics {
    pub fn from_equity(equity: &[f64]) -> Self {
        Self {
            total_return: total_return(equity),
            sharpe_ratio: sharpe_ratio(&returns(equity)),
            max_drawdown: max_drawdown(equity),
            final_equity: equity.last().copied().unwrap_or(0.0),
        }
    }
}

/// Simple per-bar returns `equity[i] / equity[i-1] - 1`.
pub fn returns(equity: &[f64]) -> Vec<f64> {
    equity
        .windows(2)
        .map(|w| if w[0] == 0.0 { 0.0 } else { w[1] / w[0] - 1.0 })
        .collect()
}

/// Annualised Sharpe ratio, `mean / std * sqrt(252)`, using the
/// population standard deviation.
pub fn sharpe_ratio(returns: &[f64]) -> f64 {
    if returns.is_empty() {
        return 0.0;
    }
    let n = returns.len() as f64;
    let mean = returns.iter().sum::<f64>() / n;
    let variance = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / n;
    let std = variance.sqrt();
    // Rounding noise on a constant return series is still zero volatility
    if std == 0.0 || std < 1e-12 * mean.abs() {
        return 0.0;
    }
    finite_or_zero(mean / std * TRADING_DAYS_PER_YEAR.sqrt())
}

/// `min_i((equity[i] - peak[i]) / peak[i])` where `peak` is the running maximum.
pub fn max_drawdown(equity: &[f64]) -> f64 {
    let Some(&first) = equity.first() else {
        return 0.0;
    };
    let mut peak = first;
    let mut worst = 0.0f64;
    for &value in equity {
        if value > peak {
            peak = value;
        }
        if peak > 0.0 {
            worst = worst.min((value - peak) / peak);
        }
    }
    finite_or_zero(worst)
}

/// `equity[last] / equity[0] - 1`.
pub fn total_return(equity: &[f64]) -> f64 {
    match (equity.first(), equity.last()) {
        (Some(&first), Some(&last)) if first != 0.0 => finite_or_zero(last / first - 1.0),
        _ => 0.0,
    }
}

fn finite_or_zero(v: f64) -> f64 {
    if v.is_finite() {
        v
    } else {
        0.0
    }
}
