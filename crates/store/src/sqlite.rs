use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Days, NaiveDate, NaiveTime, SecondsFormat, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use tracing::{debug, info};

use common::{parse_timestamp, ArtifactStore, DataProvider, Error, PriceBar, Result};

/// SQLite-backed price history and artifact table.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (creating if missing) the database at `url` and apply migrations.
    pub async fn connect(url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;
        Self::from_pool(pool).await
    }

    pub async fn from_pool(pool: SqlitePool) -> Result<Self> {
        sqlx::migrate!("../../migrations")
            .run(&pool)
            .await
            .map_err(|e| Error::Database(e.into()))?;
        info!("Database ready");
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Replace every stored bar of `symbol` with `bars`.
    pub async fn save_series(&self, symbol: &str, bars: &[PriceBar]) -> Result<usize> {
        let symbol = symbol.to_uppercase();
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM price_bars WHERE symbol = ?")
            .bind(&symbol)
            .execute(&mut *tx)
            .await?;
        for bar in bars {
            sqlx::query(
                "INSERT OR REPLACE INTO price_bars (symbol, ts, open, high, low, close, volume)
                 VALUES (?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(&symbol)
            .bind(ts_key(bar.timestamp))
            .bind(bar.open)
            .bind(bar.high)
            .bind(bar.low)
            .bind(bar.close)
            .bind(bar.volume)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        info!(symbol = %symbol, bars = bars.len(), "Price series saved");
        Ok(bars.len())
    }
}

fn ts_key(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn day_start(date: NaiveDate) -> String {
    ts_key(date.and_time(NaiveTime::MIN).and_utc())
}

#[async_trait]
impl DataProvider for SqliteStore {
    async fn get_series(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<PriceBar>> {
        let symbol = symbol.to_uppercase();
        let upper = end
            .checked_add_days(Days::new(1))
            .map(day_start)
            .unwrap_or_else(|| "9999".to_string());

        let rows: Vec<(String, f64, f64, f64, f64, f64)> = sqlx::query_as(
            "SELECT ts, open, high, low, close, volume FROM price_bars
             WHERE symbol = ? AND ts >= ? AND ts < ?
             ORDER BY ts ASC",
        )
        .bind(&symbol)
        .bind(day_start(start))
        .bind(upper)
        .fetch_all(&self.pool)
        .await?;

        let bars = rows
            .into_iter()
            .map(|(ts, open, high, low, close, volume)| {
                Ok(PriceBar {
                    timestamp: parse_timestamp(&ts)?,
                    open,
                    high,
                    low,
                    close,
                    volume,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        debug!(symbol = %symbol, %start, %end, bars = bars.len(), "Loaded price series");
        Ok(bars)
    }
}

#[async_trait]
impl ArtifactStore for SqliteStore {
    async fn put(&self, key: &str, body: &[u8]) -> Result<()> {
        sqlx::query(
            "INSERT INTO artifacts (key, body, updated_at) VALUES (?, ?, ?)
             ON CONFLICT(key) DO UPDATE SET body = excluded.body, updated_at = excluded.updated_at",
        )
        .bind(key)
        .bind(body)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let body: Option<Vec<u8>> = sqlx::query_scalar("SELECT body FROM artifacts WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(body)
    }
}
