mod live;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::info;
use tracing_subscriber::EnvFilter;

use backtest::report;
use backtest::{spread_series, ParamGrid, ParamSweep, PerformanceMetrics};
use common::{ArtifactStore, Config, DataProvider, StrategyParameters};
use store::{FileStore, SqliteStore};
use strategy::StrategyFileConfig;

#[derive(Parser)]
#[command(name = "meanrev", about = "Mean-reversion backtesting, parameter sweeps and live trading")]
struct Cli {
    /// Strategy file; overrides STRATEGY_CONFIG_PATH.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Where run artifacts are written.
    #[arg(long, global = true, value_enum, default_value_t = ArtifactTarget::Files)]
    artifacts: ArtifactTarget,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, ValueEnum)]
enum ArtifactTarget {
    /// Files under ARTIFACT_DIR.
    Files,
    /// The `artifacts` table of the price database.
    Database,
}

#[derive(Subcommand)]
enum Command {
    /// Load a daily OHLCV CSV into the price database.
    Ingest {
        symbol: String,
        csv: PathBuf,
    },
    /// Single backtest of the configured strategy.
    Backtest {
        /// Instrument to test instead of `strategy.symbol`.
        #[arg(long)]
        symbol: Option<String>,
    },
    /// Backtest the configured strategy on the close spread `left - right`.
    Spread { left: String, right: String },
    /// Run the configured parameter grid and rank the results.
    Sweep {
        #[arg(long)]
        symbol: Option<String>,
        /// Worker threads; overrides SWEEP_THREADS.
        #[arg(long)]
        threads: Option<usize>,
    },
    /// Trade the `[[live]]` instruments until Ctrl-C.
    Live,
}

#[tokio::main]
async fn main() -> Result<()> {
    // ── Logging ──────────────────────────────────────────────────────────────
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // ── Config ────────────────────────────────────────────────────────────────
    let cli = Cli::parse();
    let cfg = Config::from_env().context("invalid environment configuration")?;
    let strategy_path = cli
        .config
        .clone()
        .unwrap_or_else(|| PathBuf::from(&cfg.strategy_config_path));
    let strategy_file = StrategyFileConfig::load(&strategy_path.to_string_lossy())
        .with_context(|| format!("loading {}", strategy_path.display()))?;

    // ── Storage ───────────────────────────────────────────────────────────────
    let db = SqliteStore::connect(&cfg.database_url)
        .await
        .with_context(|| format!("opening {}", cfg.database_url))?;
    let artifacts: Arc<dyn ArtifactStore> = match cli.artifacts {
        ArtifactTarget::Files => Arc::new(FileStore::new(&cfg.artifact_dir)),
        ArtifactTarget::Database => Arc::new(db.clone()),
    };

    match cli.command {
        Command::Ingest { symbol, csv } => {
            let bars = store::import_csv(&csv)?;
            let n = db.save_series(&symbol, &bars).await?;
            info!(symbol = %symbol, bars = n, "Ingest complete");
        }
        Command::Backtest { symbol } => {
            let symbol = symbol.unwrap_or_else(|| strategy_file.strategy.symbol.clone());
            run_backtest(&db, artifacts.as_ref(), &strategy_file, &symbol).await?;
        }
        Command::Spread { left, right } => {
            run_spread(&db, artifacts.as_ref(), &strategy_file, &left, &right).await?;
        }
        Command::Sweep { symbol, threads } => {
            let symbol = symbol.unwrap_or_else(|| strategy_file.strategy.symbol.clone());
            let threads = threads.or(cfg.sweep_threads);
            run_sweep(&db, artifacts.as_ref(), &strategy_file, &symbol, threads).await?;
        }
        Command::Live => live::run(&cfg, &strategy_file, &db).await?,
    }
    Ok(())
}

async fn load_series(
    db: &SqliteStore,
    file: &StrategyFileConfig,
    symbol: &str,
) -> Result<Vec<common::PriceBar>> {
    let s = &file.strategy;
    let series = db.get_series(symbol, s.start, s.end).await?;
    if series.is_empty() {
        bail!(
            "no bars stored for {symbol} between {} and {}; run `meanrev ingest` first",
            s.start,
            s.end
        );
    }
    Ok(series)
}

async fn run_backtest(
    db: &SqliteStore,
    artifacts: &dyn ArtifactStore,
    file: &StrategyFileConfig,
    symbol: &str,
) -> Result<()> {
    let params = file.strategy.parameters()?;
    let series = load_series(db, file, symbol).await?;
    let result = backtest::run(&series, &params, file.strategy.cash)?;
    let metrics = PerformanceMetrics::from_equity(&result.equity_curve.values());

    let kind = file.strategy.kind.to_string();
    artifacts
        .put(
            &report::equity_key(symbol, &kind),
            &report::encode_equity(&result.equity_curve)?,
        )
        .await?;
    artifacts
        .put(&report::metrics_key(symbol, &kind), &report::encode_metrics(&metrics)?)
        .await?;

    info!(
        symbol = %symbol,
        params = %params,
        final_value = result.final_value,
        trades = result.trades.len(),
        sharpe = metrics.sharpe_ratio,
        max_drawdown = metrics.max_drawdown,
        "Backtest complete"
    );
    Ok(())
}

async fn run_spread(
    db: &SqliteStore,
    artifacts: &dyn ArtifactStore,
    file: &StrategyFileConfig,
    left: &str,
    right: &str,
) -> Result<()> {
    let base = file.strategy.parameters()?;
    let params = StrategyParameters {
        stake: 1,
        ..base
    };
    let left_series = load_series(db, file, left).await?;
    let right_series = load_series(db, file, right).await?;
    let spread = spread_series(&left_series, &right_series);
    info!(left = %left, right = %right, bars = spread.len(), "Spread series built");

    let result = backtest::run(&spread, &params, file.strategy.cash)?;
    let metrics = PerformanceMetrics::from_equity(&result.equity_curve.values());
    artifacts
        .put(
            &report::spread_equity_key(left, right),
            &report::encode_equity(&result.equity_curve)?,
        )
        .await?;
    artifacts
        .put(report::SPREAD_METRICS_KEY, &report::encode_metrics(&metrics)?)
        .await?;

    info!(
        sharpe = metrics.sharpe_ratio,
        max_drawdown = metrics.max_drawdown,
        trades = result.trades.len(),
        "Spread backtest complete"
    );
    Ok(())
}

async fn run_sweep(
    db: &SqliteStore,
    artifacts: &dyn ArtifactStore,
    file: &StrategyFileConfig,
    symbol: &str,
    threads: Option<usize>,
) -> Result<()> {
    let base = file.strategy.parameters()?;
    let grid = ParamGrid::from_config(&file.sweep, base.rsi);
    let series = load_series(db, file, symbol).await?;

    let cash = file.strategy.cash;
    let results = tokio::task::spawn_blocking(move || {
        ParamSweep::new()
            .with_threads(threads)
            .with_curves(true)
            .run(&series, &grid, cash)
    })
    .await
    .context("sweep worker panicked")??;

    for (params, curve) in &results.curves {
        artifacts
            .put(&report::sweep_run_key(symbol, params), &report::encode_equity(curve)?)
            .await?;
    }
    artifacts
        .put(
            &report::sweep_summary_key(symbol),
            &report::encode_sweep_summary(&results)?,
        )
        .await?;

    for (rank, row) in results.ranked.iter().take(5).enumerate() {
        if let Some(m) = row.metrics {
            info!(
                rank = rank + 1,
                params = %row.parameters,
                sharpe = m.sharpe_ratio,
                total_return = m.total_return,
                "Top result"
            );
        }
    }
    Ok(())
}
