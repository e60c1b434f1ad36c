//! Artifact encoding: equity JSON, metrics JSON and the sweep summary CSV,
//! plus the store keys they are written under.

use serde::{Deserialize, Serialize};

use common::{Result, StrategyParameters};

use crate::engine::EquityCurve;
use crate::metrics::PerformanceMetrics;
use crate::sweep::{SweepReport, SweepResult};

/// One entry of the equity artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EquityRecord {
    /// `YYYY-MM-DD`
    pub date: String,
    pub value: f64,
}

/// Metrics artifact body.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricsReport {
    pub sharpe_ratio: f64,
    pub max_drawdown: f64,
}

impl From<&PerformanceMetrics> for MetricsReport {
    fn from(m: &PerformanceMetrics) -> Self {
        Self {
            sharpe_ratio: m.sharpe_ratio,
            max_drawdown: m.max_drawdown,
        }
    }
}

/// Row of `sweep_summary_<symbol>.csv`. Metric cells are empty for failed points.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryRow {
    pub period: usize,
    pub devfactor: f64,
    pub stake: u64,
    pub total_return: Option<f64>,
    pub sharpe: Option<f64>,
    pub max_drawdown: Option<f64>,
    pub final_pnl: Option<f64>,
}

impl From<&SweepResult> for SummaryRow {
    fn from(r: &SweepResult) -> Self {
        Self {
            period: r.parameters.lookback_period,
            devfactor: r.parameters.deviation_threshold,
            stake: r.parameters.stake,
            total_return: r.metrics.map(|m| m.total_return),
            sharpe: r.metrics.map(|m| m.sharpe_ratio),
            max_drawdown: r.metrics.map(|m| m.max_drawdown),
            final_pnl: r.metrics.map(|m| m.final_equity),
        }
    }
}

pub fn equity_records(curve: &EquityCurve) -> Vec<EquityRecord> {
    curve
        .points()
        .iter()
        .map(|p| EquityRecord {
            date: p.timestamp.format("%Y-%m-%d").to_string(),
            value: p.value,
        })
        .collect()
}

pub fn encode_equity(curve: &EquityCurve) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec_pretty(&equity_records(curve))?)
}

pub fn decode_equity(body: &[u8]) -> Result<Vec<EquityRecord>> {
    Ok(serde_json::from_slice(body)?)
}

pub fn encode_metrics(metrics: &PerformanceMetrics) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec_pretty(&MetricsReport::from(metrics))?)
}

/// Ranked rows first, failed rows after.
pub fn encode_sweep_summary(report: &SweepReport) -> Result<Vec<u8>> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    for row in report.ranked.iter().chain(&report.failed) {
        wtr.serialize(SummaryRow::from(row))?;
    }
    wtr.into_inner()
        .map_err(|e| common::Error::Other(format!("failed to flush sweep summary: {e}")))
}

pub fn decode_sweep_summary(body: &[u8]) -> Result<Vec<SummaryRow>> {
    let mut rdr = csv::Reader::from_reader(body);
    let rows = rdr.deserialize().collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn equity_key(symbol: &str, kind: &str) -> String {
    format!("pnl_{}_{kind}.json", symbol.to_lowercase())
}

pub fn metrics_key(symbol: &str, kind: &str) -> String {
    format!("metrics_{}_{kind}.json", symbol.to_lowercase())
}

pub fn sweep_run_key(symbol: &str, params: &StrategyParameters) -> String {
    format!(
        "pnl_sweep/{}/pnl_{}_{:?}_{}.json",
        symbol.to_uppercase(),
        params.lookback_period,
        params.deviation_threshold,
        params.stake
    )
}

pub fn sweep_summary_key(symbol: &str) -> String {
    format!("sweep_summary_{}.csv", symbol.to_lowercase())
}

pub fn spread_equity_key(left: &str, right: &str) -> String {
    format!("pnl_spread_{}_{}.json", left.to_lowercase(), right.to_lowercase())
}

pub const SPREAD_METRICS_KEY: &str = "metrics_spread.json";
