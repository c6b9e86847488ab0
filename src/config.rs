use crate::error::{BacktestError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Simulation configuration.
///
/// Every field has a default, so a TOML override file only needs to name
/// the values it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Rolling window for the bands and size of the cyclic state space
    pub window: usize,
    /// Band width in standard deviations
    pub num_std_dev: f64,
    pub initial_cash: f64,
    /// Steps of forced inaction after a ruin reset
    pub cooldown_period: usize,
    /// Stop-loss trigger as a fraction below the entry price (0.05 = 5%)
    pub stop_loss_fraction: f64,
    /// Largest notional a single buy may spend, and the per-step sell cap
    pub max_single_order_amount: f64,
    pub maker_fee: f64, // 0.001 (0.1%)
    pub taker_fee: f64, // 0.001 (0.1%)
    /// Base exploration rate (epsilon)
    pub exploration_rate: f64,
    /// Base learning rate (alpha)
    pub learning_rate: f64,
    /// Base discount factor (gamma)
    pub discount_factor: f64,
    /// Inclusive range the per-run open-lot cap is drawn from
    pub trade_cap_min: usize,
    pub trade_cap_max: usize,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            window: 20,
            num_std_dev: 2.0,
            initial_cash: 1_000.0,
            cooldown_period: 45,
            stop_loss_fraction: 0.05,
            max_single_order_amount: 100.0,
            maker_fee: 0.001,
            taker_fee: 0.001,
            exploration_rate: 0.2,
            learning_rate: 0.1,
            discount_factor: 0.9,
            trade_cap_min: 1,
            trade_cap_max: 10,
        }
    }
}

impl SimConfig {
    /// Load a TOML override file on top of the defaults and validate it.
    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: SimConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.window == 0 {
            return Err(invalid("window must be at least 1"));
        }
        if !(self.num_std_dev.is_finite() && self.num_std_dev >= 0.0) {
            return Err(invalid("num_std_dev must be a non-negative number"));
        }
        if !(self.initial_cash.is_finite() && self.initial_cash >= 0.0) {
            return Err(invalid("initial_cash must be a non-negative number"));
        }
        if !(0.0..1.0).contains(&self.stop_loss_fraction) {
            return Err(invalid("stop_loss_fraction must lie in [0, 1)"));
        }
        if !(self.max_single_order_amount.is_finite() && self.max_single_order_amount > 0.0) {
            return Err(invalid("max_single_order_amount must be positive"));
        }
        for (name, fee) in [("maker_fee", self.maker_fee), ("taker_fee", self.taker_fee)] {
            if !(0.0..1.0).contains(&fee) {
                return Err(invalid(&format!("{} must lie in [0, 1)", name)));
            }
        }
        if !(0.0..=1.0).contains(&self.exploration_rate) {
            return Err(invalid("exploration_rate must lie in [0, 1]"));
        }
        if !(self.learning_rate > 0.0 && self.learning_rate <= 1.0) {
            return Err(invalid("learning_rate must lie in (0, 1]"));
        }
        if !(0.0..=1.0).contains(&self.discount_factor) {
            return Err(invalid("discount_factor must lie in [0, 1]"));
        }
        if self.trade_cap_min == 0 || self.trade_cap_min > self.trade_cap_max {
            return Err(invalid(
                "trade cap range must satisfy 1 <= trade_cap_min <= trade_cap_max",
            ));
        }
        Ok(())
    }
}

fn invalid(msg: &str) -> BacktestError {
    BacktestError::InvalidConfig(msg.to_string())
}
