pub mod rolling;
pub mod rsi;

pub use rolling::RollingWindow;
pub use rsi::RsiIndicator;
