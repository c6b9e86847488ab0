use crate::error::{BacktestError, Result};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// One observation of the traded asset
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub timestamp: NaiveDateTime,
    pub price: f64,
}

/// Historical prices, strictly increasing in time.
/// Immutable once built; the simulation only ever reads it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PriceSeries {
    points: Vec<PricePoint>,
}

impl PriceSeries {
    pub fn new(points: Vec<PricePoint>) -> Result<Self> {
        for (i, p) in points.iter().enumerate() {
            if !p.price.is_finite() || p.price < 0.0 {
                return Err(BacktestError::InvalidPriceData(format!(
                    "price at row {} is not a non-negative number: {}",
                    i, p.price
                )));
            }
        }
        for i in 1..points.len() {
            if points[i].timestamp <= points[i - 1].timestamp {
                return Err(BacktestError::InvalidPriceData(format!(
                    "timestamps not strictly increasing at row {} ({} after {})",
                    i,
                    points[i].timestamp,
                    points[i - 1].timestamp
                )));
            }
        }
        Ok(Self { points })
    }

    pub fn points(&self) -> &[PricePoint] {
        &self.points
    }

    pub fn prices(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.price).collect()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn last(&self) -> Option<&PricePoint> {
        self.points.last()
    }
}

/// The three actions the policy can take. Discriminants double as table
/// column indices and as the greedy tie-break order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Action {
    Buy = 0,
    Sell = 1,
    Hold = 2,
}

impl Action {
    pub const COUNT: usize = 3;
    pub const ALL: [Action; 3] = [Action::Buy, Action::Sell, Action::Hold];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Action::Buy => "buy",
            Action::Sell => "sell",
            Action::Hold => "hold",
        };
        write!(f, "{}", name)
    }
}

/// One open buy position
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lot {
    pub entry_price: f64,
    pub quantity: f64, // in base units, never negative
    pub stop_loss_price: f64,
}

impl Lot {
    pub fn open(entry_price: f64, quantity: f64, stop_loss_fraction: f64) -> Self {
        Self {
            entry_price,
            quantity,
            stop_loss_price: entry_price * (1.0 - stop_loss_fraction),
        }
    }

    pub fn is_stopped_out(&self, price: f64) -> bool {
        self.quantity > 0.0 && self.stop_loss_price >= price
    }
}

/// Rolling mean with symmetric standard-deviation bands
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bands {
    pub middle: f64,
    pub upper: f64,
    pub lower: f64,
}
