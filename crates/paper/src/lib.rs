use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use tracing::{debug, info};

use common::{Error, ExecutionGateway, Fill, Order, OrderSide, Result};

/// Simulated execution venue for paper trading.
///
/// Market orders fill immediately at the last price seen for the symbol,
/// with no slippage or fees. Nothing is ever sent to a real exchange.
#[derive(Debug, Clone)]
pub struct PaperGateway {
    /// Latest known price per symbol, updated via `update_price`.
    prices: Arc<RwLock<HashMap<String, f64>>>,
    /// Net signed quantity per symbol: positive long, negative short.
    positions: Arc<RwLock<HashMap<String, f64>>>,
    /// Most recent fills, oldest first, at most `fill_capacity` of them.
    fills: Arc<RwLock<VecDeque<Fill>>>,
    fill_capacity: usize,
}

/// Fills kept in the paper ledger before the oldest are dropped.
pub const DEFAULT_FILL_CAPACITY: usize = 10_000;

impl Default for PaperGateway {
    fn default() -> Self {
        Self::with_fill_capacity(DEFAULT_FILL_CAPACITY)
    }
}

impl PaperGateway {
    pub fn new() -> Self {
        info!("PaperGateway initialized");
        Self::default()
    }

    /// Gateway whose fill ledger keeps only the latest `capacity` fills.
    pub fn with_fill_capacity(capacity: usize) -> Self {
        Self {
            prices: Arc::default(),
            positions: Arc::default(),
            fills: Arc::new(RwLock::new(VecDeque::new())),
            fill_capacity: capacity.max(1),
        }
    }

    /// Record the latest price for a symbol (called by the tick feed).
    pub async fn update_price(&self, symbol: &str, price: f64) {
        self.prices.write().await.insert(symbol.to_string(), price);
    }

    /// Net signed quantity held in `symbol`.
    pub async fn net_position(&self, symbol: &str) -> f64 {
        self.positions.read().await.get(symbol).copied().unwrap_or(0.0)
    }

    /// Retained fills, oldest first. Positions still reflect every fill.
    pub async fn fills(&self) -> Vec<Fill> {
        self.fills.read().await.iter().cloned().collect()
    }
}

#[async_trait]
impl ExecutionGateway for PaperGateway {
    async fn submit_order(&self, order: &Order) -> Result<Fill> {
        if !order.quantity.is_finite() || order.quantity <= 0.0 {
            return Err(Error::Execution(format!(
                "order {} has invalid quantity {}",
                order.id, order.quantity
            )));
        }
        let fill_price = self.current_price(&order.symbol).await?;

        let fill = Fill {
            order_id: order.id.clone(),
            symbol: order.symbol.clone(),
            side: order.side,
            fill_price,
            quantity: order.quantity,
            timestamp: Utc::now(),
        };

        let signed = match order.side {
            OrderSide::Buy => order.quantity,
            OrderSide::Sell => -order.quantity,
        };
        let net = {
            let mut positions = self.positions.write().await;
            let net = positions.entry(order.symbol.clone()).or_insert(0.0);
            *net += signed;
            *net
        };
        {
            let mut fills = self.fills.write().await;
            if fills.len() == self.fill_capacity {
                fills.pop_front();
            }
            fills.push_back(fill.clone());
        }

        debug!(
            symbol = %order.symbol,
            side = %order.side,
            price = fill_price,
            qty = order.quantity,
            net,
            "Paper fill simulated"
        );
        Ok(fill)
    }

    async fn current_price(&self, symbol: &str) -> Result<f64> {
        self.prices.read().await.get(symbol).copied().ok_or_else(|| {
            Error::Exchange(format!(
                "PaperGateway has no price for '{symbol}'. Ensure ticks are flowing."
            ))
        })
    }
}
