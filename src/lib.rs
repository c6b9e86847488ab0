pub mod backtest;
pub mod config;
pub mod data;
pub mod domain;
pub mod engine;
pub mod error;
pub mod evaluation;

pub use config::SimConfig;
pub use error::{BacktestError, Result};
