use std::cmp::Ordering;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// One aggregated OHLCV observation. Immutable once produced by a data provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceBar {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl PriceBar {
    /// A bar whose open/high/low/close all equal `price`, with zero volume.
    pub fn flat(timestamp: DateTime<Utc>, price: f64) -> Self {
        Self {
            timestamp,
            open: price,
            high: price,
            low: price,
            close: price,
            volume: 0.0,
        }
    }

    pub fn date(&self) -> NaiveDate {
        self.timestamp.date_naive()
    }
}

/// Live price update for one instrument.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tick {
    pub symbol: String,
    pub price: f64,
    pub timestamp: DateTime<Utc>,
}

/// Anything the strategy core can read a single decision price from.
pub trait PriceObservation {
    fn price(&self) -> f64;
}

impl PriceObservation for PriceBar {
    fn price(&self) -> f64 {
        self.close
    }
}

impl PriceObservation for Tick {
    fn price(&self) -> f64 {
        self.price
    }
}

impl PriceObservation for f64 {
    fn price(&self) -> f64 {
        *self
    }
}

/// Parse an ISO-8601 date (`2024-01-31`) or timestamp (RFC 3339 or
/// `2024-01-31 15:30:00`) into a UTC instant. Plain dates map to midnight.
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
        return Ok(Utc.from_utc_datetime(&naive));
    }
    let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|e| Error::Data(format!("unparseable date '{raw}': {e}")))?;
    Ok(Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN)))
}

/// Direction of an open position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Long,
    Short,
}

impl Direction {
    /// Order side that opens a position in this direction.
    pub fn entry_side(self) -> OrderSide {
        match self {
            Direction::Long => OrderSide::Buy,
            Direction::Short => OrderSide::Sell,
        }
    }

    /// Order side that closes a position in this direction.
    pub fn exit_side(self) -> OrderSide {
        match self {
            Direction::Long => OrderSide::Sell,
            Direction::Short => OrderSide::Buy,
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Long => write!(f, "long"),
            Direction::Short => write!(f, "short"),
        }
    }
}

/// Position held by a single strategy instance.
///
/// Sizes are always strictly positive; a zero-sized position is `Flat`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PositionState {
    #[default]
    Flat,
    Long(u64),
    Short(u64),
}

impl PositionState {
    pub fn open(direction: Direction, size: u64) -> Self {
        debug_assert!(size > 0, "open positions must have a positive size");
        match direction {
            Direction::Long => PositionState::Long(size),
            Direction::Short => PositionState::Short(size),
        }
    }

    pub fn is_flat(&self) -> bool {
        matches!(self, PositionState::Flat)
    }

    pub fn size(&self) -> u64 {
        match self {
            PositionState::Flat => 0,
            PositionState::Long(size) | PositionState::Short(size) => *size,
        }
    }

    pub fn direction(&self) -> Option<Direction> {
        match self {
            PositionState::Flat => None,
            PositionState::Long(_) => Some(Direction::Long),
            PositionState::Short(_) => Some(Direction::Short),
        }
    }

    /// Positive for long, negative for short, zero when flat.
    pub fn signed_size(&self) -> f64 {
        match self {
            PositionState::Flat => 0.0,
            PositionState::Long(size) => *size as f64,
            PositionState::Short(size) => -(*size as f64),
        }
    }
}

/// Decision emitted by the strategy core for one observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Signal {
    Enter { direction: Direction, size: u64 },
    Exit,
    Hold,
}

/// Momentum confirmation settings for the RSI-enhanced strategy.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RsiParameters {
    pub period: usize,
    pub lower: f64,
    pub upper: f64,
}

/// Complete, explicit parameterisation of one strategy instance.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StrategyParameters {
    /// Rolling window length for the moving average and standard deviation.
    pub lookback_period: usize,
    /// Absolute z-score beyond which a position is entered.
    pub deviation_threshold: f64,
    /// Base order size in shares.
    pub stake: u64,
    /// Present only for the RSI-enhanced variant.
    pub rsi: Option<RsiParameters>,
}

impl StrategyParameters {
    pub fn new(lookback_period: usize, deviation_threshold: f64, stake: u64) -> Self {
        Self {
            lookback_period,
            deviation_threshold,
            stake,
            rsi: None,
        }
    }

    pub fn with_rsi(mut self, rsi: RsiParameters) -> Self {
        self.rsi = Some(rsi);
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.lookback_period == 0 {
            return Err(Error::InvalidParameters(
                "lookback_period must be positive".into(),
            ));
        }
        if !self.deviation_threshold.is_finite() || self.deviation_threshold <= 0.0 {
            return Err(Error::InvalidParameters(format!(
                "deviation_threshold must be a positive finite number, got {}",
                self.deviation_threshold
            )));
        }
        if self.stake == 0 {
            return Err(Error::InvalidParameters("stake must be positive".into()));
        }
        if let Some(rsi) = &self.rsi {
            if rsi.period < 2 {
                return Err(Error::InvalidParameters(format!(
                    "rsi_period must be >= 2, got {}",
                    rsi.period
                )));
            }
            let in_range = |v: f64| (0.0..=100.0).contains(&v);
            if !in_range(rsi.lower) || !in_range(rsi.upper) || rsi.lower >= rsi.upper {
                return Err(Error::InvalidParameters(format!(
                    "rsi bounds must satisfy 0 <= lower < upper <= 100, got {}..{}",
                    rsi.lower, rsi.upper
                )));
            }
        }
        Ok(())
    }

    /// Total order used to break ranking ties: lookback, threshold, stake, then RSI settings.
    pub fn canonical_cmp(&self, other: &Self) -> Ordering {
        self.lookback_period
            .cmp(&other.lookback_period)
            .then(self.deviation_threshold.total_cmp(&other.deviation_threshold))
            .then(self.stake.cmp(&other.stake))
            .then_with(|| match (&self.rsi, &other.rsi) {
                (None, None) => Ordering::Equal,
                (None, Some(_)) => Ordering::Less,
                (Some(_), None) => Ordering::Greater,
                (Some(a), Some(b)) => a
                    .period
                    .cmp(&b.period)
                    .then(a.lower.total_cmp(&b.lower))
                    .then(a.upper.total_cmp(&b.upper)),
            })
    }
}

impl std::fmt::Display for StrategyParameters {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "period={} devfactor={} stake={}",
            self.lookback_period, self.deviation_threshold, self.stake
        )?;
        if let Some(rsi) = &self.rsi {
            write!(f, " rsi={}/{}/{}", rsi.period, rsi.lower, rsi.upper)?;
        }
        Ok(())
    }
}

/// Side of a trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl std::fmt::Display for OrderSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderSide::Buy => write!(f, "BUY"),
            OrderSide::Sell => write!(f, "SELL"),
        }
    }
}

/// A market order to be submitted to the execution gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: String,
    pub symbol: String,
    pub side: OrderSide,
    pub quantity: f64,
}

impl Order {
    pub fn market(symbol: impl Into<String>, side: OrderSide, quantity: f64) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            symbol: symbol.into(),
            side,
            quantity,
        }
    }
}

/// Confirmation of a filled order returned by the gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fill {
    pub order_id: String,
    pub symbol: String,
    pub side: OrderSide,
    pub fill_price: f64,
    pub quantity: f64,
    pub timestamp: DateTime<Utc>,
}

/// Whether live orders go to the real venue or the paper gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradingMode {
    Live,
    Paper,
}

impl std::fmt::Display for TradingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TradingMode::Live => write!(f, "live"),
            TradingMode::Paper => write!(f, "paper"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_dates_as_midnight_utc() {
        let ts = parse_timestamp("2024-03-01").unwrap();
        assert_eq!(ts.to_rfc3339(), "2024-03-01T00:00:00+00:00");
    }

    #[test]
    fn parses_rfc3339_and_space_separated_timestamps() {
        let a = parse_timestamp("2024-03-01T15:30:00Z").unwrap();
        let b = parse_timestamp("2024-03-01 15:30:00").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn rejects_garbage_dates() {
        assert!(matches!(parse_timestamp("yesterday"), Err(Error::Data(_))));
    }

    #[test]
    fn position_sizes_and_signs() {
        assert_eq!(PositionState::Flat.size(), 0);
        assert_eq!(PositionState::Long(5).signed_size(), 5.0);
        assert_eq!(PositionState::Short(5).signed_size(), -5.0);
        assert_eq!(
            PositionState::open(Direction::Short, 3),
            PositionState::Short(3)
        );
        assert_eq!(PositionState::Long(1).direction(), Some(Direction::Long));
    }

    #[test]
    fn validate_rejects_malformed_parameters() {
        assert!(StrategyParameters::new(20, 2.0, 100).validate().is_ok());
        assert!(StrategyParameters::new(0, 2.0, 100).validate().is_err());
        assert!(StrategyParameters::new(20, 0.0, 100).validate().is_err());
        assert!(StrategyParameters::new(20, f64::NAN, 100).validate().is_err());
        assert!(StrategyParameters::new(20, 2.0, 0).validate().is_err());

        let bad_rsi = StrategyParameters::new(20, 2.0, 100).with_rsi(RsiParameters {
            period: 14,
            lower: 70.0,
            upper: 30.0,
        });
        assert!(bad_rsi.validate().is_err());
    }

    #[test]
    fn canonical_order_is_lookback_then_threshold_then_stake() {
        let a = StrategyParameters::new(10, 2.0, 100);
        let b = StrategyParameters::new(10, 1.5, 200);
        let c = StrategyParameters::new(20, 1.0, 50);
        let mut all = vec![c, a, b];
        all.sort_by(|x, y| x.canonical_cmp(y));
        assert_eq!(all, vec![b, a, c]);
    }
}
