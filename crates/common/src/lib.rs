pub mod config;
pub mod error;
pub mod exchange;
pub mod provider;
pub mod types;

pub use config::Config;
pub use error::{Error, Result};
pub use exchange::ExecutionGateway;
pub use provider::{ArtifactStore, DataProvider};
pub use types::*;
