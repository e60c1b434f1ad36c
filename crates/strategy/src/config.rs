use std::collections::HashMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use common::{Error, Result, RsiParameters, StrategyParameters};

use crate::StrategyKind;

/// Top-level strategy config file (TOML).
///
/// Example `config/strategy.toml`:
/// ```toml
/// [strategy]
/// kind = "mean_reversion_rsi"
/// symbol = "AAPL"
/// start = "2022-01-01"
/// end = "2025-05-31"
/// cash = 100000.0
///
/// [strategy.params]
/// period = 20
/// devfactor = 2.0
/// stake = 100
/// rsi_period = 14
/// rsi_lower = 30.0
/// rsi_upper = 70.0
///
/// [sweep]
/// period = [10, 20, 30]
/// devfactor = [1.5, 2.0, 2.5]
/// stake = [50, 100, 200]
///
/// [[live]]
/// symbol = "BTCUSDT"
/// warmup = 20
/// ```
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StrategyFileConfig {
    pub strategy: StrategyConfig,
    #[serde(default)]
    pub sweep: GridConfig,
    #[serde(default)]
    pub live: Vec<LiveInstrumentConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StrategyConfig {
    pub kind: StrategyKind,
    /// Instrument the historical runs read, e.g. "AAPL".
    pub symbol: String,
    /// Dates are quoted strings: `start = "2022-01-01"`.
    pub start: NaiveDate,
    pub end: NaiveDate,
    #[serde(default = "default_cash")]
    pub cash: f64,
    /// Indicator-specific parameters.
    #[serde(default)]
    pub params: HashMap<String, toml::Value>,
}

/// Cartesian sweep grid. Each dimension is an enumerable list.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct GridConfig {
    pub period: Vec<usize>,
    pub devfactor: Vec<f64>,
    pub stake: Vec<u64>,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            period: vec![10, 20, 30],
            devfactor: vec![1.5, 2.0, 2.5],
            stake: vec![50, 100, 200],
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LiveInstrumentConfig {
    pub symbol: String,
    /// Number of recent closes used to seed the indicators before trading.
    #[serde(default)]
    pub warmup: Option<usize>,
    /// Candle interval of the tick stream, e.g. "1m" or "1d".
    #[serde(default = "default_interval")]
    pub interval: String,
}

impl LiveInstrumentConfig {
    /// Closes to seed with: `warmup` when set, otherwise one full lookback window.
    pub fn warmup_len(&self, lookback_period: usize) -> usize {
        self.warmup.unwrap_or(lookback_period)
    }
}

fn default_cash() -> f64 {
    100_000.0
}

fn default_interval() -> String {
    "1d".to_string()
}

impl StrategyFileConfig {
    pub fn load(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read strategy config at '{path}': {e}")))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let cfg: Self = toml::from_str(content)?;
        if cfg.strategy.start > cfg.strategy.end {
            return Err(Error::Config(format!(
                "strategy.start {} is after strategy.end {}",
                cfg.strategy.start, cfg.strategy.end
            )));
        }
        if !cfg.strategy.cash.is_finite() || cfg.strategy.cash <= 0.0 {
            return Err(Error::Config("strategy.cash must be positive".into()));
        }
        Ok(cfg)
    }
}

impl StrategyConfig {
    /// Resolve the explicit parameter set for a run.
    ///
    /// Unset keys take the classic defaults (period 20, devfactor 2.0,
    /// stake 100, RSI 14 / 30 / 70). RSI settings are attached only for
    /// the RSI-enhanced kind.
    pub fn parameters(&self) -> Result<StrategyParameters> {
        let mut params = StrategyParameters::new(
            param_usize(&self.params, "period", 20)?,
            param_f64(&self.params, "devfactor", 2.0)?,
            param_usize(&self.params, "stake", 100)? as u64,
        );
        if self.kind == StrategyKind::MeanReversionRsi {
            params = params.with_rsi(RsiParameters {
                period: param_usize(&self.params, "rsi_period", 14)?,
                lower: param_f64(&self.params, "rsi_lower", 30.0)?,
                upper: param_f64(&self.params, "rsi_upper", 70.0)?,
            });
        }
        params.validate()?;
        Ok(params)
    }
}

fn param_f64(params: &HashMap<String, toml::Value>, key: &str, default: f64) -> Result<f64> {
    match params.get(key) {
        None => Ok(default),
        Some(toml::Value::Float(v)) => Ok(*v),
        Some(toml::Value::Integer(v)) => Ok(*v as f64),
        Some(other) => Err(Error::Config(format!("param '{key}' must be a number, got {other}"))),
    }
}

fn param_usize(params: &HashMap<String, toml::Value>, key: &str, default: usize) -> Result<usize> {
    match params.get(key) {
        None => Ok(default),
        Some(toml::Value::Integer(v)) if *v >= 0 => Ok(*v as usize),
        Some(other) => Err(Error::Config(format!(
            "param '{key}' must be a non-negative integer, got {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EXAMPLE: &str = r#"
[strategy]
kind = "mean_reversion_rsi"
symbol = "AAPL"
start = "2022-01-01"
end = "2025-05-31"

[strategy.params]
period = 30
devfactor = 2
stake = 50
rsi_upper = 75.0

[sweep]
period = [10, 20]
devfactor = [1.5, 2.0]
stake = [50, 100]

[[live]]
symbol = "BTCUSDT"
warmup = 40
"#;

    #[test]
    fn parses_full_file() {
        let cfg = StrategyFileConfig::parse(EXAMPLE).unwrap();
        assert_eq!(cfg.strategy.kind, StrategyKind::MeanReversionRsi);
        assert_eq!(cfg.strategy.cash, 100_000.0);
        assert_eq!(cfg.sweep.period, vec![10, 20]);
        assert_eq!(cfg.live[0].symbol, "BTCUSDT");
        assert_eq!(cfg.live[0].warmup, Some(40));
        assert_eq!(cfg.live[0].interval, "1d");
        assert_eq!(cfg.live[0].warmup_len(30), 40);

        let params = cfg.strategy.parameters().unwrap();
        assert_eq!(params.lookback_period, 30);
        assert_eq!(params.deviation_threshold, 2.0);
        assert_eq!(params.stake, 50);
        let rsi = params.rsi.unwrap();
        assert_eq!((rsi.period, rsi.lower, rsi.upper), (14, 30.0, 75.0));
    }

    #[test]
    fn sweep_grid_defaults_to_three_by_three_by_three() {
        let cfg = StrategyFileConfig::parse(
            r#"
[strategy]
kind = "mean_reversion"
symbol = "MSFT"
start = "2022-01-01"
end = "2022-12-31"
"#,
        )
        .unwrap();
        assert_eq!(cfg.sweep, GridConfig::default());
        assert!(cfg.live.is_empty());
        let params = cfg.strategy.parameters().unwrap();
        assert!(params.rsi.is_none());
        assert_eq!(params.lookback_period, 20);
    }

    #[test]
    fn missing_warmup_seeds_one_lookback_window() {
        let cfg = StrategyFileConfig::parse(
            r#"
[strategy]
kind = "mean_reversion"
symbol = "MSFT"
start = "2022-01-01"
end = "2022-12-31"

[[live]]
symbol = "ETHUSDT"
"#,
        )
        .unwrap();
        assert_eq!(cfg.live[0].warmup, None);
        assert_eq!(cfg.live[0].warmup_len(20), 20);
    }

    #[test]
    fn wrong_param_type_is_a_config_error() {
        let cfg = StrategyFileConfig::parse(
            r#"
[strategy]
kind = "mean_reversion"
symbol = "MSFT"
start = "2022-01-01"
end = "2022-12-31"

[strategy.params]
period = "twenty"
"#,
        )
        .unwrap();
        assert!(matches!(cfg.strategy.parameters(), Err(Error::Config(_))));
    }

    #[test]
    fn inverted_date_range_is_rejected() {
        let err = StrategyFileConfig::parse(
            r#"
[strategy]
kind = "mean_reversion"
symbol = "MSFT"
start = "2023-01-01"
end = "2022-12-31"
"#,
        )
        .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
