use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use common::{Config, Error, ExecutionGateway, Fill, Order, Result};

/// Bounded exponential backoff for order submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total submissions, including the first. Always at least 1.
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            max_attempts: cfg.order_max_attempts.max(1),
            initial_backoff: Duration::from_millis(cfg.order_backoff_ms),
            ..Self::default()
        }
    }

    /// Delay after the failed attempt number `attempt` (1-based).
    pub fn backoff_after(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

/// Submits orders to the execution gateway, retrying transient failures.
///
/// This is the ONLY component that calls `ExecutionGateway::submit_order`.
/// Retries reuse the order id so a venue that deduplicates client ids never
/// sees a second order.
pub struct OrderExecutor {
    gateway: Arc<dyn ExecutionGateway>,
    policy: RetryPolicy,
}

impl OrderExecutor {
    pub fn new(gateway: Arc<dyn ExecutionGateway>, policy: RetryPolicy) -> Self {
        Self { gateway, policy }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Submit `order` and wait for its fill.
    ///
    /// Returns `Error::Execution` once every attempt has failed.
    pub async fn execute(&self, order: &Order) -> Result<Fill> {
        let attempts = self.policy.max_attempts.max(1);
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            info!(
                symbol = %order.symbol,
                side = %order.side,
                qty = order.quantity,
                attempt,
                "Submitting order"
            );
            match self.gateway.submit_order(order).await {
                Ok(fill) => {
                    info!(
                        symbol = %fill.symbol,
                        side = %fill.side,
                        price = fill.fill_price,
                        qty = fill.quantity,
                        "Order filled"
                    );
                    return Ok(fill);
                }
                Err(e) => {
                    last_error = e.to_string();
                    if attempt < attempts {
                        let delay = self.policy.backoff_after(attempt);
                        warn!(
                            symbol = %order.symbol,
                            attempt,
                            error = %e,
                            backoff = ?delay,
                            "Order submission failed, retrying"
                        );
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }

        Err(Error::Execution(format!(
            "order {} for {} failed after {attempts} attempts: {last_error}",
            order.id, order.symbol
        )))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use async_trait::async_trait;
    use chrono::Utc;

    use common::OrderSide;

    use super::*;

    /// Fails the first `failures` submissions, then fills at 100.
    struct FlakyGateway {
        failures: u32,
        calls: AtomicU32,
    }

    #[async_trait]
    impl ExecutionGateway for FlakyGateway {
        async fn submit_order(&self, order: &Order) -> Result<Fill> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.failures {
                return Err(Error::Http("connection reset".into()));
            }
            Ok(Fill {
                order_id: order.id.clone(),
                symbol: order.symbol.clone(),
                side: order.side,
                fill_price: 100.0,
                quantity: order.quantity,
                timestamp: Utc::now(),
            })
        }

        async fn current_price(&self, _symbol: &str) -> Result<f64> {
            Ok(100.0)
        }
    }

    fn policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(4),
        }
    }

    #[test]
    fn backoff_doubles_up_to_the_cap() {
        let p = RetryPolicy {
            max_attempts: 10,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_millis(500),
        };
        assert_eq!(p.backoff_after(1), Duration::from_millis(100));
        assert_eq!(p.backoff_after(2), Duration::from_millis(200));
        assert_eq!(p.backoff_after(3), Duration::from_millis(400));
        assert_eq!(p.backoff_after(4), Duration::from_millis(500));
        assert_eq!(p.backoff_after(40), Duration::from_millis(500));
    }

    #[tokio::test]
    async fn transient_failures_are_retried() {
        let gateway = Arc::new(FlakyGateway {
            failures: 2,
            calls: AtomicU32::new(0),
        });
        let executor = OrderExecutor::new(gateway.clone(), policy(3));
        let order = Order::market("BTCUSDT", OrderSide::Buy, 1.0);

        let fill = executor.execute(&order).await.unwrap();
        assert_eq!(fill.order_id, order.id);
        assert_eq!(gateway.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn exhausted_retries_are_execution_errors() {
        let gateway = Arc::new(FlakyGateway {
            failures: u32::MAX,
            calls: AtomicU32::new(0),
        });
        let executor = OrderExecutor::new(gateway.clone(), policy(2));
        let order = Order::market("BTCUSDT", OrderSide::Sell, 1.0);

        let err = executor.execute(&order).await.unwrap_err();
        assert!(matches!(err, Error::Execution(_)));
        assert_eq!(gateway.calls.load(Ordering::SeqCst), 2);
    }
}
