use async_trait::async_trait;
use chrono::Utc;
use hmac::{Hmac, Mac};
use reqwest::Client;
use serde::Deserialize;
use sha2::Sha256;
use tracing::debug;

use common::{Error, ExecutionGateway, Fill, Order, Result};

const BASE_URL: &str = "https://api.binance.com";

type HmacSha256 = Hmac<Sha256>;

/// Binance spot REST gateway: signed market orders and ticker prices.
pub struct BinanceGateway {
    api_key: String,
    secret: String,
    base_url: String,
    http: Client,
}

impl BinanceGateway {
    pub fn new(api_key: impl Into<String>, secret: impl Into<String>) -> Result<Self> {
        let http = Client::builder()
            .use_rustls_tls()
            .build()
            .map_err(|e| Error::Http(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            api_key: api_key.into(),
            secret: secret.into(),
            base_url: BASE_URL.to_string(),
            http,
        })
    }

    /// Point the gateway at another host, e.g. the spot testnet.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn sign(&self, query: &str) -> Result<String> {
        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
            .map_err(|e| Error::Exchange(format!("invalid signing key: {e}")))?;
        mac.update(query.as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    async fn signed_post(&self, path: &str, params: &str) -> Result<String> {
        let ts = Utc::now().timestamp_millis();
        let query = format!("{params}&timestamp={ts}");
        let signature = self.sign(&query)?;
        let body = format!("{query}&signature={signature}");
        let url = format!("{}{path}", self.base_url);

        let resp = self
            .http
            .post(&url)
            .header("X-MBX-APIKEY", &self.api_key)
            .header("Content-Type", "application/x-www-form-urlencoded")
            .body(body)
            .send()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;

        let status = resp.status();
        let text = resp.text().await.map_err(|e| Error::Http(e.to_string()))?;
        if !status.is_success() {
            return Err(Error::Exchange(format!("HTTP {status}: {text}")));
        }
        Ok(text)
    }
}

/// Form parameters for a market order. The client order id makes a
/// resubmitted order a duplicate the venue rejects instead of a second fill.
fn market_order_params(order: &Order) -> String {
    format!(
        "symbol={}&side={}&type=MARKET&quantity={}&newClientOrderId={}&newOrderRespType=FULL",
        order.symbol.to_uppercase(),
        order.side,
        order.quantity,
        order.id
    )
}

/// Quantity-weighted average over the partial fills of one order.
fn average_fill_price(fills: &[FillDetail]) -> Option<f64> {
    let mut notional = 0.0;
    let mut qty = 0.0;
    for f in fills {
        let price: f64 = f.price.parse().ok()?;
        let q: f64 = f.qty.parse().ok()?;
        notional += price * q;
        qty += q;
    }
    (qty > 0.0).then(|| notional / qty)
}

#[async_trait]
impl ExecutionGateway for BinanceGateway {
    async fn submit_order(&self, order: &Order) -> Result<Fill> {
        let params = market_order_params(order);
        debug!(symbol = %order.symbol, side = %order.side, qty = order.quantity, "Submitting order to Binance");
        let body = self.signed_post("/api/v3/order", &params).await?;

        let resp: OrderResponse =
            serde_json::from_str(&body).map_err(|e| Error::Exchange(e.to_string()))?;
        let fill_price = match average_fill_price(&resp.fills) {
            Some(price) => price,
            None => self.current_price(&order.symbol).await?,
        };
        let quantity = resp
            .executed_qty
            .parse::<f64>()
            .ok()
            .filter(|q| *q > 0.0)
            .unwrap_or(order.quantity);

        Ok(Fill {
            order_id: resp.client_order_id,
            symbol: order.symbol.clone(),
            side: order.side,
            fill_price,
            quantity,
            timestamp: Utc::now(),
        })
    }

    async fn current_price(&self, symbol: &str) -> Result<f64> {
        let url = format!(
            "{}/api/v3/ticker/price?symbol={}",
            self.base_url,
            symbol.to_uppercase()
        );
        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;

        let ticker: PriceTicker = resp.json().await.map_err(|e| Error::Http(e.to_string()))?;
        ticker
            .price
            .parse::<f64>()
            .map_err(|e| Error::Exchange(e.to_string()))
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrderResponse {
    client_order_id: String,
    #[serde(default)]
    executed_qty: String,
    #[serde(default)]
    fills: Vec<FillDetail>,
}

#[derive(Deserialize)]
struct FillDetail {
    price: String,
    qty: String,
}

#[derive(Deserialize)]
struct PriceTicker {
    price: String,
}

#[cfg(test)]
mod tests {
    use common::OrderSide;

    use super::*;

    #[test]
    fn signature_matches_binance_reference_vector() {
        // Example from the Binance API documentation for SIGNED endpoints
        let gateway = BinanceGateway::new(
            "vmPUZE6mv9SD5VNHk4HlWFsOr6aKE2zvsw0MuIgwCIPy6utIco14y7Ju91duEh8A",
            "NhqPtmdSJYdKjVHjA7PZj4Mge3R5YNiP1e3UZjInClVN65XAbvqqM6A7H5fATj0j",
        )
        .unwrap();
        let query = "symbol=LTCBTC&side=BUY&type=LIMIT&timeInForce=GTC&quantity=1&price=0.1&recvWindow=5000&timestamp=1499827319559";
        assert_eq!(
            gateway.sign(query).unwrap(),
            "c8db56825ae71d6d79447849e617115f4a920fa2acdcab2b053c4b2838bd6b71"
        );
    }

    #[test]
    fn market_order_carries_client_id() {
        let order = Order::market("btcusdt", OrderSide::Sell, 0.25);
        let params = market_order_params(&order);
        assert!(params.starts_with("symbol=BTCUSDT&side=SELL&type=MARKET&quantity=0.25"));
        assert!(params.contains(&format!("newClientOrderId={}", order.id)));
    }

    #[test]
    fn order_response_fills_are_volume_weighted() {
        let body = r#"{
            "symbol": "BTCUSDT", "orderId": 28, "clientOrderId": "abc",
            "executedQty": "3.0",
            "fills": [
                {"price": "100.0", "qty": "1.0", "commission": "0", "commissionAsset": "BNB"},
                {"price": "103.0", "qty": "2.0", "commission": "0", "commissionAsset": "BNB"}
            ]
        }"#;
        let resp: OrderResponse = serde_json::from_str(body).unwrap();
        assert_eq!(resp.client_order_id, "abc");
        assert_eq!(average_fill_price(&resp.fills), Some(102.0));
        assert_eq!(average_fill_price(&[]), None);
    }
}
