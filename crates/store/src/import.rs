use std::io::Read;
use std::path::Path;

use serde::Deserialize;
use tracing::{info, warn};

use common::{parse_timestamp, PriceBar, Result};

#[derive(Debug, Deserialize)]
struct CsvRow {
    #[serde(rename = "Date", alias = "date", alias = "Datetime")]
    date: String,
    #[serde(rename = "Open", alias = "open")]
    open: f64,
    #[serde(rename = "High", alias = "high")]
    high: f64,
    #[serde(rename = "Low", alias = "low")]
    low: f64,
    #[serde(rename = "Close", alias = "close")]
    close: f64,
    #[serde(rename = "Volume", alias = "volume")]
    volume: Option<f64>,
}

/// Read a daily OHLCV CSV export from disk. See [`parse_csv`].
pub fn import_csv(path: impl AsRef<Path>) -> Result<Vec<PriceBar>> {
    let path = path.as_ref();
    let file = std::fs::File::open(path)?;
    let bars = parse_csv(file)?;
    info!(path = %path.display(), bars = bars.len(), "Imported price CSV");
    Ok(bars)
}

/// Parse `Date,Open,High,Low,Close,Volume` rows; other columns are ignored.
///
/// The result is ascending by timestamp with duplicate timestamps removed
/// (first occurrence wins). A missing volume cell reads as zero.
pub fn parse_csv<R: Read>(reader: R) -> Result<Vec<PriceBar>> {
    let mut rdr = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
    let mut bars = Vec::new();
    for row in rdr.deserialize() {
        let row: CsvRow = row?;
        bars.push(PriceBar {
            timestamp: parse_timestamp(&row.date)?,
            open: row.open,
            high: row.high,
            low: row.low,
            close: row.close,
            volume: row.volume.unwrap_or(0.0),
        });
    }

    bars.sort_by_key(|b| b.timestamp);
    let before = bars.len();
    bars.dedup_by_key(|b| b.timestamp);
    if bars.len() < before {
        warn!(dropped = before - bars.len(), "Duplicate dates dropped");
    }
    Ok(bars)
}
