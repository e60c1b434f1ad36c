use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Missing, short or malformed price series.
    #[error("Data error: {0}")]
    Data(String),

    #[error("Invalid strategy parameters: {0}")]
    InvalidParameters(String),

    /// An order could not be executed within the retry budget.
    #[error("Execution error: {0}")]
    Execution(String),

    #[error("Exchange API error: {0}")]
    Exchange(String),

    #[error("WebSocket error: {0}")]
    WebSocket(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
