pub mod binance;
pub mod executor;
pub mod lifecycle;
pub mod trader;

pub use binance::{BinanceGateway, BinanceStream};
pub use executor::{OrderExecutor, RetryPolicy};
pub use lifecycle::{stop_requested, LiveEngine, LiveHandle};
pub use trader::{InstrumentTrader, TraderOutcome};
