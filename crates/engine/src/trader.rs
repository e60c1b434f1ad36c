use std::sync::Arc;

use tokio::sync::{broadcast, watch};
use tracing::{debug, error, info, warn};

use common::{Order, PositionState, Signal, Tick};
use strategy::StrategyCore;

use crate::executor::OrderExecutor;
use crate::lifecycle::stop_requested;

/// How an instrument loop ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TraderOutcome {
    /// Shutdown was requested or the tick feed closed.
    Stopped,
    /// An order could not be executed; the loop gave up on this instrument.
    Fatal(String),
}

/// Trading loop for one instrument.
///
/// Ticks for other symbols are ignored. While an order is in flight no
/// further ticks are consumed, so at most one order per instrument is
/// ever outstanding.
pub struct InstrumentTrader {
    symbol: String,
    core: StrategyCore,
    executor: Arc<OrderExecutor>,
    ticks: broadcast::Receiver<Tick>,
    shutdown: watch::Receiver<bool>,
}

impl InstrumentTrader {
    pub fn new(
        symbol: impl Into<String>,
        core: StrategyCore,
        executor: Arc<OrderExecutor>,
        ticks: broadcast::Receiver<Tick>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            core,
            executor,
            ticks,
            shutdown,
        }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn position(&self) -> PositionState {
        self.core.position()
    }

    /// Seed the rolling statistics from recent closes without trading.
    pub fn prime<I: IntoIterator<Item = f64>>(&mut self, closes: I) {
        let mut n = 0usize;
        for close in closes {
            self.core.prime(close);
            n += 1;
        }
        debug!(symbol = %self.symbol, closes = n, "Strategy primed");
    }

    /// Run until shutdown, feed closure, or a fatal execution error.
    pub async fn run(mut self) -> TraderOutcome {
        info!(symbol = %self.symbol, kind = %self.core.kind(), "Trader started");
        loop {
            let tick = tokio::select! {
                biased;
                _ = stop_requested(&mut self.shutdown) => {
                    info!(symbol = %self.symbol, "Trader stopping");
                    return TraderOutcome::Stopped;
                }
                msg = self.ticks.recv() => match msg {
                    Ok(tick) => tick,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(symbol = %self.symbol, skipped, "Trader lagged behind tick feed");
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        info!(symbol = %self.symbol, "Tick feed closed");
                        return TraderOutcome::Stopped;
                    }
                },
            };
            if tick.symbol != self.symbol {
                continue;
            }

            let Some(order) = self.decide(&tick) else {
                continue;
            };

            // A shutdown abandons the pending fill wait before the loop exits
            let result = tokio::select! {
                biased;
                _ = stop_requested(&mut self.shutdown) => {
                    warn!(symbol = %self.symbol, order_id = %order.id, "Shutdown with order in flight, fill wait cancelled");
                    return TraderOutcome::Stopped;
                }
                res = self.executor.execute(&order) => res,
            };
            if let Err(e) = result {
                error!(symbol = %self.symbol, error = %e, "Order execution failed, stopping trader");
                return TraderOutcome::Fatal(e.to_string());
            }
        }
    }

    /// Feed one tick to the core and translate its signal into an order.
    fn decide(&mut self, tick: &Tick) -> Option<Order> {
        let before = self.core.position();
        match self.core.observe(tick) {
            Signal::Enter { direction, size } => {
                info!(symbol = %self.symbol, %direction, size, price = tick.price, "Entry signal");
                Some(Order::market(&self.symbol, direction.entry_side(), size as f64))
            }
            Signal::Exit => {
                let direction = before.direction()?;
                info!(symbol = %self.symbol, %direction, price = tick.price, "Exit signal");
                Some(Order::market(
                    &self.symbol,
                    direction.exit_side(),
                    before.size() as f64,
                ))
            }
            Signal::Hold => None,
        }
    }
}
