pub mod config;
pub mod indicators;
pub mod mean_reversion;

pub use config::{GridConfig, LiveInstrumentConfig, StrategyConfig, StrategyFileConfig};
pub use mean_reversion::{
    PlainMeanReversion, RsiEnhancedMeanReversion, StrategyCore, StrategyKind,
};
