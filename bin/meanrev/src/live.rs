use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use common::{Config, DataProvider, ExecutionGateway, Tick, TradingMode};
use engine::{
    stop_requested, BinanceGateway, BinanceStream, LiveEngine, OrderExecutor, RetryPolicy,
    TraderOutcome,
};
use paper::PaperGateway;
use store::SqliteStore;
use strategy::{StrategyCore, StrategyFileConfig};

/// Trade every `[[live]]` instrument until Ctrl-C or until all loops end.
pub async fn run(cfg: &Config, file: &StrategyFileConfig, db: &SqliteStore) -> Result<()> {
    if file.live.is_empty() {
        bail!("no [[live]] instruments configured");
    }
    let params = file.strategy.parameters()?;

    // ── Exchange gateway (injected based on TRADING_MODE) ─────────────────────
    let paper = PaperGateway::new();
    let gateway: Arc<dyn ExecutionGateway> = match cfg.trading_mode {
        TradingMode::Live => {
            let (Some(key), Some(secret)) = (&cfg.binance_api_key, &cfg.binance_secret) else {
                bail!("BINANCE_API_KEY and BINANCE_SECRET are required for live trading");
            };
            info!("Live trading mode, using BinanceGateway");
            Arc::new(BinanceGateway::new(key, secret)?)
        }
        TradingMode::Paper => {
            info!("Paper trading mode, using PaperGateway");
            Arc::new(paper.clone())
        }
    };
    let executor = Arc::new(OrderExecutor::new(gateway, RetryPolicy::from_config(cfg)));

    // ── Traders ───────────────────────────────────────────────────────────────
    let (mut engine, handle) = LiveEngine::new(executor);
    for instrument in &file.live {
        let core = StrategyCore::with_kind(file.strategy.kind, params)?;
        let n = instrument.warmup_len(params.lookback_period);
        let warmup = recent_closes(db, &instrument.symbol, n).await?;
        if warmup.len() < n {
            warn!(symbol = %instrument.symbol, wanted = n, got = warmup.len(), "Short warmup history");
        }
        engine.add_instrument(&instrument.symbol, core).prime(warmup);
    }

    // ── Market data ───────────────────────────────────────────────────────────
    // Paper fills need the price before the trader sees the tick, so streams
    // publish to a relay that updates the paper book first.
    let (raw_tx, raw_rx) = broadcast::channel::<Tick>(1024);
    let mut streams = Vec::new();
    for instrument in &file.live {
        let stream = BinanceStream::new(
            &instrument.symbol,
            &instrument.interval,
            raw_tx.clone(),
            handle.shutdown_signal(),
        );
        streams.push(tokio::spawn(stream.run()));
    }
    drop(raw_tx);
    let relay = tokio::spawn(relay_ticks(
        raw_rx,
        handle.tick_sender(),
        paper,
        handle.shutdown_signal(),
    ));

    // ── Shutdown ──────────────────────────────────────────────────────────────
    let ctrl_c = {
        let handle = handle.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                handle.shutdown();
            }
        })
    };

    let outcomes = engine.run().await;
    handle.shutdown();
    ctrl_c.abort();
    for (instrument, stream) in file.live.iter().zip(streams) {
        join_stream(&instrument.symbol, stream).await;
    }
    relay.await.context("tick relay panicked")?;

    let mut fatal = 0;
    for (symbol, outcome) in &outcomes {
        match outcome {
            TraderOutcome::Stopped => info!(symbol = %symbol, "Stopped"),
            TraderOutcome::Fatal(reason) => {
                fatal += 1;
                error!(symbol = %symbol, reason = %reason, "Terminated");
            }
        }
    }
    if fatal > 0 {
        bail!("{fatal} of {} instrument loops terminated with errors", outcomes.len());
    }
    Ok(())
}

/// Wait for a stream task. Returns false if it panicked or was cancelled.
async fn join_stream(symbol: &str, stream: JoinHandle<()>) -> bool {
    match stream.await {
        Ok(()) => true,
        Err(e) => {
            warn!(symbol = %symbol, error = %e, "Tick stream task did not complete");
            false
        }
    }
}

/// Last `n` stored closes for `symbol`, oldest first.
async fn recent_closes(db: &SqliteStore, symbol: &str, n: usize) -> Result<Vec<f64>> {
    let today = Utc::now().date_naive();
    let bars = db
        .get_series(symbol, DateTime::<Utc>::UNIX_EPOCH.date_naive(), today)
        .await?;
    let skip = bars.len().saturating_sub(n);
    Ok(bars.iter().skip(skip).map(|b| b.close).collect())
}

async fn relay_ticks(
    mut raw: broadcast::Receiver<Tick>,
    out: broadcast::Sender<Tick>,
    paper: PaperGateway,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        let tick = tokio::select! {
            _ = stop_requested(&mut shutdown) => break,
            msg = raw.recv() => match msg {
                Ok(tick) => tick,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Tick relay lagged");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
        };
        paper.update_price(&tick.symbol, tick.price).await;
        let _ = out.send(tick);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn panicked_stream_is_reported() {
        let clean = tokio::spawn(async {});
        assert!(join_stream("BTCUSDT", clean).await);

        let crashed = tokio::spawn(async { panic!("socket task crashed") });
        assert!(!join_stream("ETHUSDT", crashed).await);
    }
}
