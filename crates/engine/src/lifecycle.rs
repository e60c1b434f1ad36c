use std::sync::Arc;

use tokio::sync::{broadcast, watch};
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use common::Tick;
use strategy::StrategyCore;

use crate::executor::OrderExecutor;
use crate::trader::{InstrumentTrader, TraderOutcome};

/// Cloneable handle for feeding ticks and requesting shutdown.
#[derive(Clone)]
pub struct LiveHandle {
    tick_tx: broadcast::Sender<Tick>,
    shutdown_tx: Arc<watch::Sender<bool>>,
}

impl LiveHandle {
    /// Sender that tick streams publish on.
    pub fn tick_sender(&self) -> broadcast::Sender<Tick> {
        self.tick_tx.clone()
    }

    /// Receiver for the shutdown flag, for tasks that run beside the traders.
    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown_tx.subscribe()
    }

    /// Ask every trader to stop. Pending fill waits are cancelled.
    pub fn shutdown(&self) {
        info!("Live engine shutdown requested");
        self.shutdown_tx.send_replace(true);
    }
}

/// Resolves once the shutdown flag is set. A dropped sender counts as shutdown.
pub async fn stop_requested(shutdown: &mut watch::Receiver<bool>) {
    while !*shutdown.borrow_and_update() {
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}

/// Runs one trading loop per instrument, all sharing one executor and tick feed.
pub struct LiveEngine {
    executor: Arc<OrderExecutor>,
    handle: LiveHandle,
    traders: Vec<InstrumentTrader>,
}

impl LiveEngine {
    pub fn new(executor: Arc<OrderExecutor>) -> (Self, LiveHandle) {
        let (tick_tx, _) = broadcast::channel(1024);
        let (shutdown_tx, _) = watch::channel(false);
        let handle = LiveHandle {
            tick_tx,
            shutdown_tx: Arc::new(shutdown_tx),
        };
        let engine = Self {
            executor,
            handle: handle.clone(),
            traders: Vec::new(),
        };
        (engine, handle)
    }

    /// Register an instrument. Its tick subscription starts now, so ticks
    /// published before `run` are not lost.
    pub fn add_instrument(
        &mut self,
        symbol: impl Into<String>,
        core: StrategyCore,
    ) -> &mut InstrumentTrader {
        let trader = InstrumentTrader::new(
            symbol,
            core,
            self.executor.clone(),
            self.handle.tick_tx.subscribe(),
            self.handle.shutdown_signal(),
        );
        self.traders.push(trader);
        let last = self.traders.len() - 1;
        &mut self.traders[last]
    }

    pub fn instruments(&self) -> Vec<String> {
        self.traders.iter().map(|t| t.symbol().to_string()).collect()
    }

    /// Run every trader to completion and report how each one ended.
    ///
    /// A fatal or panicking trader is reported and the others keep running.
    pub async fn run(self) -> Vec<(String, TraderOutcome)> {
        let LiveEngine { handle, traders, .. } = self;
        // Keep our own sender out of the way so a closed feed can end the run
        drop(handle);

        info!(instruments = traders.len(), "Live engine starting");
        let mut set = JoinSet::new();
        for trader in traders {
            set.spawn(async move {
                let symbol = trader.symbol().to_string();
                let outcome = trader.run().await;
                (symbol, outcome)
            });
        }

        let mut outcomes = Vec::new();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((symbol, TraderOutcome::Fatal(reason))) => {
                    error!(symbol = %symbol, reason = %reason, "Trader terminated");
                    outcomes.push((symbol, TraderOutcome::Fatal(reason)));
                }
                Ok((symbol, outcome)) => {
                    info!(symbol = %symbol, "Trader stopped");
                    outcomes.push((symbol, outcome));
                }
                Err(e) => {
                    warn!(error = %e, "Trader task did not complete");
                    outcomes.push(("<unknown>".to_string(), TraderOutcome::Fatal(e.to_string())));
                }
            }
        }
        outcomes.sort_by(|a, b| a.0.cmp(&b.0));
        info!("Live engine stopped");
        outcomes
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;
    use chrono::Utc;

    use common::{Error, ExecutionGateway, Fill, Order, Result, StrategyParameters};

    use super::*;
    use crate::executor::RetryPolicy;

    /// Rejects every order for ETHUSDT, fills everything else.
    struct PartialGateway;

    #[async_trait]
    impl ExecutionGateway for PartialGateway {
        async fn submit_order(&self, order: &Order) -> Result<Fill> {
            if order.symbol == "ETHUSDT" {
                return Err(Error::Exchange("symbol halted".into()));
            }
            Ok(Fill {
                order_id: order.id.clone(),
                symbol: order.symbol.clone(),
                side: order.side,
                fill_price: 1.0,
                quantity: order.quantity,
                timestamp: Utc::now(),
            })
        }

        async fn current_price(&self, _symbol: &str) -> Result<f64> {
            Ok(1.0)
        }
    }

    fn tick(symbol: &str, price: f64) -> Tick {
        Tick {
            symbol: symbol.into(),
            price,
            timestamp: Utc::now(),
        }
    }

    fn engine() -> (LiveEngine, LiveHandle) {
        let policy = RetryPolicy {
            max_attempts: 2,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(1),
        };
        let executor = Arc::new(OrderExecutor::new(Arc::new(PartialGateway), policy));
        let (mut engine, handle) = LiveEngine::new(executor);
        for symbol in ["BTCUSDT", "ETHUSDT"] {
            let core = StrategyCore::new(StrategyParameters::new(4, 1.5, 1)).unwrap();
            engine.add_instrument(symbol, core).prime([100.0, 100.0, 100.0]);
        }
        (engine, handle)
    }

    #[tokio::test]
    async fn one_fatal_instrument_does_not_stop_the_others() {
        let (engine, handle) = engine();
        assert_eq!(engine.instruments(), vec!["BTCUSDT", "ETHUSDT"]);
        let run = tokio::spawn(engine.run());

        let feed = handle.tick_sender();
        feed.send(tick("ETHUSDT", 80.0)).unwrap();
        feed.send(tick("BTCUSDT", 80.0)).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!run.is_finished(), "healthy trader should still be running");

        handle.shutdown();
        let outcomes = tokio::time::timeout(Duration::from_secs(5), run)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(outcomes[0], ("BTCUSDT".to_string(), TraderOutcome::Stopped));
        assert!(matches!(outcomes[1].1, TraderOutcome::Fatal(_)));
    }

    #[tokio::test]
    async fn closing_the_feed_stops_every_trader() {
        let (engine, handle) = engine();
        let run = tokio::spawn(engine.run());
        drop(handle);

        let outcomes = tokio::time::timeout(Duration::from_secs(5), run)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(outcomes.len(), 2);
        assert!(outcomes.iter().all(|(_, o)| *o == TraderOutcome::Stopped));
    }
}
