use crate::config::SimConfig;
use serde::{Deserialize, Serialize};

/// Bounds applied after every adaptation step. The multiplicative drift is
/// unbounded on its own; over long series it would push epsilon above 1 or
/// the learning rate to zero.
const EXPLORATION_RANGE: (f64, f64) = (0.0, 1.0);
const LEARNING_RATE_RANGE: (f64, f64) = (1e-4, 1.0);
const DISCOUNT_RANGE: (f64, f64) = (0.0, 0.999);
const MAX_COOLDOWN_LENGTH: usize = 10_000;

/// Per-run learning parameters, drifting step by step with the reward sign.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdaptiveParams {
    pub exploration_rate: f64,
    pub learning_rate: f64,
    pub discount_factor: f64,
    pub cooldown_length: usize,
    /// Steps adapted so far in this run
    pub steps: u64,
    /// Steps whose reward was strictly positive
    pub positive_steps: u64,
}

impl AdaptiveParams {
    /// Fresh parameters at the configured bases.
    pub fn from_config(config: &SimConfig) -> Self {
        Self {
            exploration_rate: config.exploration_rate,
            learning_rate: config.learning_rate,
            discount_factor: config.discount_factor,
            cooldown_length: config.cooldown_period,
            steps: 0,
            positive_steps: 0,
        }
    }

    /// Adapt after a step.
    /// Profitable: explore less, learn faster, look further ahead, shorten cooldown.
    /// Otherwise the reverse.
    pub fn adapt(&mut self, reward: f64) {
        self.steps += 1;
        if reward > 0.0 {
            self.positive_steps += 1;
            self.exploration_rate *= 0.99;
            self.learning_rate *= 1.01;
            self.discount_factor *= 1.01;
            self.cooldown_length = self.cooldown_length.saturating_sub(1).max(1);
        } else {
            self.exploration_rate *= 1.01;
            self.learning_rate *= 0.99;
            self.discount_factor *= 0.99;
            self.cooldown_length = (self.cooldown_length + 1).min(MAX_COOLDOWN_LENGTH);
        }

        self.exploration_rate = self
            .exploration_rate
            .clamp(EXPLORATION_RANGE.0, EXPLORATION_RANGE.1);
        self.learning_rate = self
            .learning_rate
            .clamp(LEARNING_RATE_RANGE.0, LEARNING_RATE_RANGE.1);
        self.discount_factor = self
            .discount_factor
            .clamp(DISCOUNT_RANGE.0, DISCOUNT_RANGE.1);
    }

    /// Fraction of adapted steps with a positive reward.
    pub fn positive_ratio(&self) -> f64 {
        if self.steps == 0 {
            return 0.0;
        }
        self.positive_steps as f64 / self.steps as f64
    }
}
