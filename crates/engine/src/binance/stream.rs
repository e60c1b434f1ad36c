use std::time::Duration;

use chrono::{TimeZone, Utc};
use futures_util::StreamExt;
use serde::Deserialize;
use tokio::sync::{broadcast, watch};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};
use url::Url;

use common::{Error, Result, Tick};

use crate::lifecycle::stop_requested;

const MAX_BACKOFF: Duration = Duration::from_secs(60);

/// Binance kline WebSocket stream for a single symbol.
///
/// Publishes one `Tick` per closed candle, priced at the candle close, on
/// a broadcast channel. Reconnects with exponential backoff until the
/// shutdown flag is raised.
pub struct BinanceStream {
    symbol: String,
    interval: String,
    tick_tx: broadcast::Sender<Tick>,
    shutdown: watch::Receiver<bool>,
}

impl BinanceStream {
    pub fn new(
        symbol: impl Into<String>,
        interval: impl Into<String>,
        tick_tx: broadcast::Sender<Tick>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            interval: interval.into(),
            tick_tx,
            shutdown,
        }
    }

    /// Run the stream loop until shutdown. Call this inside a `tokio::spawn`.
    pub async fn run(mut self) {
        let mut backoff = Duration::from_secs(1);

        loop {
            if *self.shutdown.borrow() {
                break;
            }
            info!(symbol = %self.symbol, interval = %self.interval, "Connecting to Binance kline stream");

            let mut shutdown = self.shutdown.clone();
            let result = tokio::select! {
                _ = stop_requested(&mut shutdown) => break,
                res = self.connect_once() => res,
            };
            let delay = match result {
                Ok(()) => {
                    info!(symbol = %self.symbol, "Kline stream closed cleanly");
                    backoff = Duration::from_secs(1);
                    Duration::from_secs(1)
                }
                Err(e) => {
                    warn!(symbol = %self.symbol, error = %e, backoff = ?backoff, "Kline stream error, reconnecting");
                    let delay = backoff;
                    backoff = (backoff * 2).min(MAX_BACKOFF);
                    delay
                }
            };
            tokio::select! {
                _ = stop_requested(&mut self.shutdown) => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }
        info!(symbol = %self.symbol, "Kline stream stopped");
    }

    async fn connect_once(&self) -> Result<()> {
        let url = kline_url(&self.symbol, &self.interval)?;
        let (ws_stream, _) = connect_async(url)
            .await
            .map_err(|e| Error::WebSocket(e.to_string()))?;
        let (_, mut read) = ws_stream.split();

        while let Some(msg) = read.next().await {
            let msg = msg.map_err(|e| Error::WebSocket(e.to_string()))?;
            if let Message::Text(text) = msg {
                match parse_closed_kline(&self.symbol, &text) {
                    Ok(Some(tick)) => {
                        debug!(symbol = %tick.symbol, price = tick.price, "Candle closed");
                        // No receivers is not an error
                        let _ = self.tick_tx.send(tick);
                    }
                    Ok(None) => {}
                    Err(e) => warn!(error = %e, "Failed to parse kline event"),
                }
            }
        }
        Ok(())
    }
}

fn kline_url(symbol: &str, interval: &str) -> Result<Url> {
    let raw = format!(
        "wss://stream.binance.com:9443/ws/{}@kline_{interval}",
        symbol.to_lowercase()
    );
    Url::parse(&raw).map_err(|e| Error::WebSocket(e.to_string()))
}

#[derive(Deserialize)]
struct KlineEvent {
    k: KlineData,
}

#[derive(Deserialize)]
struct KlineData {
    #[serde(rename = "c")]
    close: String,
    #[serde(rename = "x")]
    is_closed: bool,
    #[serde(rename = "T")]
    close_time_ms: i64,
}

/// `Ok(None)` for non-kline messages and for candles still in progress.
fn parse_closed_kline(symbol: &str, text: &str) -> Result<Option<Tick>> {
    let value: serde_json::Value = serde_json::from_str(text)?;
    if value.get("e").and_then(|v| v.as_str()) != Some("kline") {
        return Ok(None);
    }
    let event: KlineEvent = serde_json::from_value(value)?;
    if !event.k.is_closed {
        return Ok(None);
    }

    let price: f64 = event
        .k
        .close
        .parse()
        .map_err(|e| Error::Exchange(format!("bad kline close '{}': {e}", event.k.close)))?;
    let timestamp = Utc
        .timestamp_millis_opt(event.k.close_time_ms)
        .single()
        .ok_or_else(|| Error::Exchange(format!("bad kline time {}", event.k.close_time_ms)))?;

    Ok(Some(Tick {
        symbol: symbol.to_string(),
        price,
        timestamp,
    }))
}
