pub mod broker;
pub mod engine;
pub mod metrics;
pub mod report;
pub mod spread;
pub mod sweep;

pub use broker::{Broker, PortfolioSnapshot, SimBroker, Trade};
pub use engine::{run, run_with_broker, EquityCurve, EquityPoint, SimulationResult};
pub use metrics::PerformanceMetrics;
pub use spread::spread_series;
pub use sweep::{ParamGrid, ParamSweep, SweepReport, SweepResult};
