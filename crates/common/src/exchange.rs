use async_trait::async_trait;

use crate::{Fill, Order, Result};

/// Abstraction over the live order-execution venue.
///
/// `BinanceGateway` implements this for live trading.
/// `PaperGateway` implements this for paper trading.
///
/// Only the `OrderExecutor` in `crates/engine` calls `submit_order`; the
/// strategy layer never touches a gateway directly.
#[async_trait]
pub trait ExecutionGateway: Send + Sync {
    /// Submit an order and wait for its fill confirmation.
    async fn submit_order(&self, order: &Order) -> Result<Fill>;

    /// Get the latest price for an instrument.
    async fn current_price(&self, symbol: &str) -> Result<f64>;
}
