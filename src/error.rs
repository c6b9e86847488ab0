use std::path::PathBuf;
use thiserror::Error;

/// Errors surfaced by the backtester.
///
/// Ruin is not an error: a depleted portfolio is reset inside the
/// simulation loop.
#[derive(Error, Debug)]
pub enum BacktestError {
    // Configuration errors
    #[error("Number of simulations must be a positive integer, got {0}")]
    InvalidSimulationCount(i64),

    #[error("The file '{}' does not exist. Please check the file path and try again.", .0.display())]
    PriceFileNotFound(PathBuf),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Config file error: {0}")]
    Toml(#[from] toml::de::Error),

    // Data errors
    #[error("Invalid price data: {0}")]
    InvalidPriceData(String),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    // Persistence errors
    #[error("Action-value table error: {0}")]
    Table(String),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, BacktestError>;
