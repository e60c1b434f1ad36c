use std::str::FromStr;

use crate::{Error, Result, TradingMode};

/// Runtime configuration loaded from environment variables at startup.
///
/// Strategy parameters do not live here; they come from the strategy TOML
/// file named by `strategy_config_path`.
#[derive(Debug, Clone)]
pub struct Config {
    // Storage
    pub database_url: String,
    pub artifact_dir: String,

    // Strategy config file path
    pub strategy_config_path: String,

    // Live trading
    pub trading_mode: TradingMode,
    pub binance_api_key: Option<String>,
    pub binance_secret: Option<String>,
    pub order_max_attempts: u32,
    pub order_backoff_ms: u64,

    // Sweep worker pool size; `None` uses every available core.
    pub sweep_threads: Option<usize>,
}

impl Config {
    /// Load configuration from the process environment.
    /// Loads `.env` if present.
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv(); // ignore error if .env not present
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let trading_mode = match lookup("TRADING_MODE")
            .unwrap_or_else(|| "paper".to_string())
            .to_lowercase()
            .as_str()
        {
            "paper" => TradingMode::Paper,
            "live" => TradingMode::Live,
            other => {
                return Err(Error::Config(format!(
                    "TRADING_MODE must be 'paper' or 'live', got: '{other}'"
                )))
            }
        };

        let binance_api_key = lookup("BINANCE_API_KEY");
        let binance_secret = lookup("BINANCE_SECRET");
        if trading_mode == TradingMode::Live
            && (binance_api_key.is_none() || binance_secret.is_none())
        {
            return Err(Error::Config(
                "BINANCE_API_KEY and BINANCE_SECRET are required when TRADING_MODE=live".into(),
            ));
        }

        let order_max_attempts: u32 = parsed(&lookup, "ORDER_MAX_ATTEMPTS")?.unwrap_or(3);
        if order_max_attempts == 0 {
            return Err(Error::Config("ORDER_MAX_ATTEMPTS must be at least 1".into()));
        }

        Ok(Config {
            database_url: lookup("DATABASE_URL")
                .unwrap_or_else(|| "sqlite://market_data.db".to_string()),
            artifact_dir: lookup("ARTIFACT_DIR").unwrap_or_else(|| "artifacts".to_string()),
            strategy_config_path: lookup("STRATEGY_CONFIG_PATH")
                .unwrap_or_else(|| "config/strategy.toml".to_string()),
            trading_mode,
            binance_api_key,
            binance_secret,
            order_max_attempts,
            order_backoff_ms: parsed(&lookup, "ORDER_BACKOFF_MS")?.unwrap_or(500),
            sweep_threads: parsed(&lookup, "SWEEP_THREADS")?,
        })
    }
}

fn parsed<F, T>(lookup: &F, key: &str) -> Result<Option<T>>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| Error::Config(format!("{key}='{raw}' is invalid: {e}"))),
    }
}
