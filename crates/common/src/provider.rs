use async_trait::async_trait;
use chrono::NaiveDate;

use crate::{PriceBar, Result};

/// Source of historical OHLCV bars.
#[async_trait]
pub trait DataProvider: Send + Sync {
    /// Bars for `symbol` whose date falls in `start..=end`, ascending by timestamp.
    async fn get_series(&self, symbol: &str, start: NaiveDate, end: NaiveDate)
        -> Result<Vec<PriceBar>>;
}

/// Key → blob store for simulation outputs.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Write (or overwrite) the artifact stored under `key`.
    async fn put(&self, key: &str, body: &[u8]) -> Result<()>;

    /// Read an artifact. `Ok(None)` if nothing is stored under `key`.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;
}
