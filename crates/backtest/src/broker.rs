use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use common::{Direction, PositionState};

/// Cash, position and mark-to-market value of one run at one instant.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PortfolioSnapshot {
    pub cash: f64,
    pub position: PositionState,
    pub value: f64,
}

/// A completed entry → exit round trip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub direction: Direction,
    pub size: u64,
    pub entry_time: DateTime<Utc>,
    pub entry_price: f64,
    pub exit_time: DateTime<Utc>,
    pub exit_price: f64,
    pub pnl: f64,
}

/// Bookkeeping seam between the simulation loop and cash/position state.
///
/// Fills are immediate and complete at the given price.
pub trait Broker {
    /// Open a position. Only called while flat.
    fn open(&mut self, direction: Direction, size: u64, price: f64, at: DateTime<Utc>);

    /// Close the whole open position, realising P&L into cash.
    /// Returns `None` if already flat.
    fn close(&mut self, price: f64, at: DateTime<Utc>) -> Option<Trade>;

    /// Revalue the open position at `price` and return the new portfolio value.
    fn mark_to_market(&mut self, price: f64) -> f64;

    fn snapshot(&self) -> PortfolioSnapshot;
}

/// In-memory broker for historical runs. One per run; never shared.
#[derive(Debug, Clone)]
pub struct SimBroker {
    cash: f64,
    position: PositionState,
    entry: Option<(f64, DateTime<Utc>)>,
    value: f64,
}

impl SimBroker {
    pub fn new(initial_cash: f64) -> Self {
        Self {
            cash: initial_cash,
            position: PositionState::Flat,
            entry: None,
            value: initial_cash,
        }
    }
}

impl Broker for SimBroker {
    fn open(&mut self, direction: Direction, size: u64, price: f64, at: DateTime<Utc>) {
        debug_assert!(self.position.is_flat(), "open called with a live position");
        let notional = size as f64 * price;
        match direction {
            // Long: pay for the shares
            Direction::Long => self.cash -= notional,
            // Short: receive proceeds, owe the shares back
            Direction::Short => self.cash += notional,
        }
        self.position = PositionState::open(direction, size);
        self.entry = Some((price, at));
        debug!(%direction, size, price, cash = self.cash, "Position opened");
    }

    fn close(&mut self, price: f64, at: DateTime<Utc>) -> Option<Trade> {
        let direction = self.position.direction()?;
        let size = self.position.size();
        let (entry_price, entry_time) = self.entry.take()?;
        let notional = size as f64 * price;

        let pnl = match direction {
            Direction::Long => {
                self.cash += notional;
                size as f64 * (price - entry_price)
            }
            Direction::Short => {
                self.cash -= notional;
                size as f64 * (entry_price - price)
            }
        };
        self.position = PositionState::Flat;
        self.value = self.cash;
        debug!(%direction, size, price, pnl, cash = self.cash, "Position closed");

        Some(Trade {
            direction,
            size,
            entry_time,
            entry_price,
            exit_time: at,
            exit_price: price,
            pnl,
        })
    }

    fn mark_to_market(&mut self, price: f64) -> f64 {
        self.value = self.cash + self.position.signed_size() * price;
        self.value
    }

    fn snapshot(&self) -> PortfolioSnapshot {
        PortfolioSnapshot {
            cash: self.cash,
            position: self.position,
            value: self.value,
        }
    }
}
