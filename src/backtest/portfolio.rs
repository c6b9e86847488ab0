use crate::config::SimConfig;
use crate::domain::*;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Cash plus a FIFO book of open lots, for a single asset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Portfolio {
    pub cash: f64,
    /// Open lots, oldest first
    pub lots: Vec<Lot>,
    pub total_fees: f64,
    pub transactions: Vec<Transaction>,
    pub config: SimConfig,
    /// Maximum number of simultaneously open lots, if limited
    pub trade_cap: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionKind {
    #[serde(rename = "buy")]
    Buy,
    #[serde(rename = "sell")]
    Sell,
    #[serde(rename = "sell (stop-loss)")]
    StopLoss,
    #[serde(rename = "hold")]
    Hold,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reason {
    BuySignal,
    SellSignal,
    StopLoss,
    HoldSignal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub step: usize,
    pub timestamp: NaiveDateTime,
    #[serde(rename = "type")]
    pub kind: TransactionKind,
    pub quantity: f64,
    pub price: f64,
    /// Signed change in cash, fees included
    pub cash_delta: f64,
    pub fee: f64,
    pub reason: Reason,
}

impl Portfolio {
    pub fn new(config: SimConfig, trade_cap: Option<usize>) -> Self {
        Self {
            cash: config.initial_cash,
            lots: Vec::new(),
            total_fees: 0.0,
            transactions: Vec::new(),
            config,
            trade_cap,
        }
    }

    /// Back to the initial cash with nothing open and an empty log.
    pub fn reset(&mut self) {
        self.cash = self.config.initial_cash;
        self.lots.clear();
        self.total_fees = 0.0;
        self.transactions.clear();
    }

    /// Open a new lot with up to `max_single_order_amount` of cash.
    /// Returns false (and records nothing) when no order can be placed.
    pub fn apply_buy(&mut self, step: usize, point: &PricePoint) -> bool {
        let price = point.price;
        if self.cash <= 0.0 || price <= 0.0 {
            return false;
        }
        if let Some(cap) = self.trade_cap {
            if self.lots.len() >= cap {
                return false;
            }
        }

        // The maker fee comes out of cash on top of the notional, so the
        // notional shrinks when the budget is the whole remaining balance.
        let budget = self.cash.min(self.config.max_single_order_amount);
        let notional = budget.min(self.cash / (1.0 + self.config.maker_fee));
        let quantity = notional / price;
        let fee = notional * self.config.maker_fee;

        self.cash -= notional + fee;
        self.total_fees += fee;
        self.lots
            .push(Lot::open(price, quantity, self.config.stop_loss_fraction));
        self.transactions.push(Transaction {
            step,
            timestamp: point.timestamp,
            kind: TransactionKind::Buy,
            quantity,
            price,
            cash_delta: -(notional + fee),
            fee,
            reason: Reason::BuySignal,
        });
        true
    }

    /// Sell oldest lots first until the per-step order cap is filled.
    /// Returns the number of lots touched.
    pub fn apply_sell(&mut self, step: usize, point: &PricePoint) -> usize {
        let mut remaining = self.order_quantity_cap(point.price);
        let mut touched = 0;

        for i in 0..self.lots.len() {
            if remaining <= 0.0 {
                break;
            }
            if self.lots[i].quantity <= 0.0 {
                continue;
            }
            let quantity = self.lots[i].quantity.min(remaining);
            self.fill_lot(i, quantity, step, point, TransactionKind::Sell, Reason::SellSignal);
            remaining -= quantity;
            touched += 1;
        }

        self.drop_drained_lots();
        touched
    }

    pub fn apply_hold(&mut self, step: usize, point: &PricePoint) {
        self.transactions.push(Transaction {
            step,
            timestamp: point.timestamp,
            kind: TransactionKind::Hold,
            quantity: 0.0,
            price: point.price,
            cash_delta: 0.0,
            fee: 0.0,
            reason: Reason::HoldSignal,
        });
    }

    /// Liquidate every lot whose stop has been hit, each independently
    /// capped by the single-order size. Returns the number of lots touched.
    pub fn apply_stop_losses(&mut self, step: usize, point: &PricePoint) -> usize {
        let cap = self.order_quantity_cap(point.price);
        let mut touched = 0;

        for i in 0..self.lots.len() {
            if !self.lots[i].is_stopped_out(point.price) {
                continue;
            }
            let quantity = self.lots[i].quantity.min(cap);
            self.fill_lot(i, quantity, step, point, TransactionKind::StopLoss, Reason::StopLoss);
            touched += 1;
        }

        self.drop_drained_lots();
        touched
    }

    /// Cash plus mark-to-market value of every open lot.
    pub fn total_value(&self, price: f64) -> f64 {
        self.cash + self.lots.iter().map(|l| l.quantity * price).sum::<f64>()
    }

    pub fn shares_held(&self) -> f64 {
        self.lots.iter().map(|l| l.quantity).sum()
    }

    /// Quantity-weighted entry price of what is still held; 0 when flat.
    pub fn average_cost_per_share(&self) -> f64 {
        let shares = self.shares_held();
        if shares <= 0.0 {
            return 0.0;
        }
        let cost: f64 = self.lots.iter().map(|l| l.entry_price * l.quantity).sum();
        cost / shares
    }

    /// Largest quantity one order may move at `price`.
    fn order_quantity_cap(&self, price: f64) -> f64 {
        if price > 0.0 {
            self.config.max_single_order_amount / price
        } else {
            f64::INFINITY
        }
    }

    fn fill_lot(
        &mut self,
        index: usize,
        quantity: f64,
        step: usize,
        point: &PricePoint,
        kind: TransactionKind,
        reason: Reason,
    ) {
        let proceeds = quantity * point.price;
        let fee = proceeds * self.config.taker_fee;

        self.lots[index].quantity -= quantity;
        self.cash += proceeds - fee;
        self.total_fees += fee;
        self.transactions.push(Transaction {
            step,
            timestamp: point.timestamp,
            kind,
            quantity,
            price: point.price,
            cash_delta: proceeds - fee,
            fee,
            reason,
        });
    }

    fn drop_drained_lots(&mut self) {
        self.lots.retain(|l| l.quantity > 0.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn point(price: f64) -> PricePoint {
        PricePoint {
            timestamp: NaiveDate::from_ymd_opt(2024, 1, 1)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap(),
            price,
        }
    }

    fn fee_free_config() -> SimConfig {
        SimConfig {
            initial_cash: 1_000.0,
            max_single_order_amount: 100.0,
            maker_fee: 0.0,
            taker_fee: 0.0,
            stop_loss_fraction: 0.05,
            ..SimConfig::default()
        }
    }

    fn fee_free_portfolio() -> Portfolio {
        Portfolio::new(fee_free_config(), None)
    }

    fn assert_value_consistent(port: &Portfolio, price: f64) {
        let recomputed = port.cash + port.lots.iter().map(|l| l.quantity * price).sum::<f64>();
        assert!((port.total_value(price) - recomputed).abs() < 1e-9);
    }

    #[test]
    fn test_buy_opens_lot_with_stop() {
        let mut port = fee_free_portfolio();
        assert!(port.apply_buy(0, &point(100.0)));
        assert_eq!(port.lots.len(), 1);
        let lot = &port.lots[0];
        assert!((lot.quantity - 1.0).abs() < 1e-12);
        assert!((lot.stop_loss_price - 95.0).abs() < 1e-10);
        assert!((port.cash - 900.0).abs() < 1e-10);
        let tx = &port.transactions[0];
        assert_eq!(tx.kind, TransactionKind::Buy);
        assert_eq!(tx.reason, Reason::BuySignal);
        assert!((tx.cash_delta + 100.0).abs() < 1e-10);
    }

    #[test]
    fn test_constant_price_buys_preserve_value() {
        let mut port = fee_free_portfolio();
        for step in 0..25 {
            let opened = port.apply_buy(step, &point(100.0));
            // 1000 of cash funds exactly ten orders of 100
            assert_eq!(opened, step < 10);
            assert_eq!(port.apply_stop_losses(step, &point(100.0)), 0);
            assert_eq!(port.total_value(100.0), 1_000.0);
        }
        assert_eq!(port.lots.len(), 10);
        assert!(port.lots.iter().all(|l| l.quantity == 1.0));
        assert_eq!(port.total_fees, 0.0);
    }

    #[test]
    fn test_maker_fee_charged_on_buy() {
        let config = SimConfig {
            maker_fee: 0.01,
            ..fee_free_config()
        };
        let mut port = Portfolio::new(config, None);
        port.apply_buy(0, &point(100.0));
        assert!((port.total_fees - 1.0).abs() < 1e-10);
        assert!((port.cash - 899.0).abs() < 1e-10);
        assert!((port.transactions[0].fee - 1.0).abs() < 1e-10);
    }

    #[test]
    fn test_buy_with_last_cash_keeps_cash_non_negative() {
        let config = SimConfig {
            initial_cash: 50.0,
            maker_fee: 0.01,
            ..fee_free_config()
        };
        let mut port = Portfolio::new(config, None);
        assert!(port.apply_buy(0, &point(10.0)));
        assert!(port.cash.abs() < 1e-9);
        assert!(port.cash >= -1e-12);
        assert!((port.total_fees + port.lots[0].quantity * 10.0 - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_buy_noop_without_cash() {
        let config = SimConfig {
            initial_cash: 0.0,
            ..fee_free_config()
        };
        let mut port = Portfolio::new(config, None);
        assert!(!port.apply_buy(0, &point(100.0)));
        assert!(port.transactions.is_empty());
        assert!(port.lots.is_empty());
    }

    #[test]
    fn test_trade_cap_blocks_buys() {
        let mut port = Portfolio::new(fee_free_config(), Some(2));
        assert!(port.apply_buy(0, &point(100.0)));
        assert!(port.apply_buy(1, &point(100.0)));
        assert!(!port.apply_buy(2, &point(100.0)));
        assert_eq!(port.lots.len(), 2);
        assert_eq!(port.transactions.len(), 2);
    }

    #[test]
    fn test_sell_is_fifo_and_capped() {
        let mut port = fee_free_portfolio();
        port.apply_buy(0, &point(100.0)); // 1.0 @ 100
        port.apply_buy(1, &point(50.0)); // 2.0 @ 50

        // cap at 100 / 80 = 1.25 units: drains the first lot, 0.25 from the second
        let touched = port.apply_sell(2, &point(80.0));
        assert_eq!(touched, 2);
        assert_eq!(port.lots.len(), 1);
        assert_eq!(port.lots[0].entry_price, 50.0);
        assert!((port.lots[0].quantity - 1.75).abs() < 1e-10);

        let sells: Vec<_> = port
            .transactions
            .iter()
            .filter(|t| t.kind == TransactionKind::Sell)
            .collect();
        assert_eq!(sells.len(), 2);
        assert!((sells[0].quantity - 1.0).abs() < 1e-10);
        assert!((sells[1].quantity - 0.25).abs() < 1e-10);
        assert_value_consistent(&port, 80.0);
    }

    #[test]
    fn test_sell_partial_fill_leaves_remainder() {
        let config = SimConfig {
            max_single_order_amount: 1_000.0,
            ..fee_free_config()
        };
        let mut port = Portfolio::new(config, None);
        port.apply_buy(0, &point(100.0)); // 10 units
        // cap 1000 / 200 = 5 units
        port.apply_sell(1, &point(200.0));
        assert_eq!(port.lots.len(), 1);
        assert!((port.lots[0].quantity - 5.0).abs() < 1e-10);
        assert!((port.cash - 1_000.0).abs() < 1e-10);
    }

    #[test]
    fn test_sell_charges_taker_fee() {
        let config = SimConfig {
            taker_fee: 0.02,
            ..fee_free_config()
        };
        let mut port = Portfolio::new(config, None);
        port.apply_buy(0, &point(100.0));
        port.apply_sell(1, &point(100.0));
        let tx = port.transactions.last().unwrap();
        assert!((tx.fee - 2.0).abs() < 1e-10);
        assert!((tx.cash_delta - 98.0).abs() < 1e-10);
        assert!((port.cash - 998.0).abs() < 1e-10);
        assert!(port.lots.is_empty());
    }

    #[test]
    fn test_sell_without_lots_records_nothing() {
        let mut port = fee_free_portfolio();
        assert_eq!(port.apply_sell(0, &point(100.0)), 0);
        assert!(port.transactions.is_empty());
    }

    #[test]
    fn test_hold_only_logs() {
        let mut port = fee_free_portfolio();
        port.apply_hold(3, &point(100.0));
        assert_eq!(port.cash, 1_000.0);
        assert_eq!(port.transactions.len(), 1);
        assert_eq!(port.transactions[0].kind, TransactionKind::Hold);
        assert_eq!(port.transactions[0].step, 3);
    }

    #[test]
    fn test_stop_loss_fully_liquidates_lot() {
        let mut port = fee_free_portfolio();
        port.apply_buy(0, &point(100.0));
        let touched = port.apply_stop_losses(1, &point(94.0));
        assert_eq!(touched, 1);
        assert!(port.lots.is_empty());
        let tx = port.transactions.last().unwrap();
        assert_eq!(tx.kind, TransactionKind::StopLoss);
        assert_eq!(tx.reason, Reason::StopLoss);
        assert!((tx.quantity - 1.0).abs() < 1e-12);
        assert_eq!(tx.price, 94.0);
        assert!((port.cash - 994.0).abs() < 1e-10);
    }

    #[test]
    fn test_stop_loss_ignores_healthy_lots() {
        let mut port = fee_free_portfolio();
        port.apply_buy(0, &point(100.0)); // stop 95
        port.apply_buy(1, &point(90.0)); // stop 85.5
        port.apply_stop_losses(2, &point(94.0));
        assert_eq!(port.lots.len(), 1);
        assert_eq!(port.lots[0].entry_price, 90.0);
    }

    #[test]
    fn test_stop_loss_partial_fill_fires_again() {
        let config = SimConfig {
            max_single_order_amount: 500.0,
            ..fee_free_config()
        };
        let mut port = Portfolio::new(config, None);
        port.apply_buy(0, &point(100.0)); // 5 units, stop 95
        // 180 / 90 = 2 units per stop-loss fill
        port.config.max_single_order_amount = 180.0;
        port.apply_stop_losses(1, &point(90.0)); // 2 units
        assert_eq!(port.lots.len(), 1);
        assert!((port.lots[0].quantity - 3.0).abs() < 1e-10);
        port.apply_stop_losses(2, &point(90.0));
        assert!((port.lots[0].quantity - 1.0).abs() < 1e-10);
        port.apply_stop_losses(3, &point(90.0));
        assert!(port.lots.is_empty());
        let stops = port
            .transactions
            .iter()
            .filter(|t| t.kind == TransactionKind::StopLoss)
            .count();
        assert_eq!(stops, 3);
    }

    #[test]
    fn test_stop_loss_at_zero_price_drains() {
        let mut port = fee_free_portfolio();
        port.apply_buy(0, &point(100.0));
        port.apply_stop_losses(1, &point(0.0));
        assert!(port.lots.is_empty());
        assert_eq!(port.total_value(0.0), 900.0);
    }

    #[test]
    fn test_quantities_never_negative() {
        let mut port = fee_free_portfolio();
        let prices = [100.0, 120.0, 80.0, 60.0, 150.0, 30.0, 10.0, 200.0];
        for (step, &p) in prices.iter().enumerate() {
            port.apply_buy(step, &point(p));
            if step % 2 == 1 {
                port.apply_sell(step, &point(p));
            }
            port.apply_stop_losses(step, &point(p));
            assert!(port.lots.iter().all(|l| l.quantity > 0.0));
            assert_value_consistent(&port, p);
        }
    }

    #[test]
    fn test_average_cost_per_share() {
        let mut port = fee_free_portfolio();
        assert_eq!(port.average_cost_per_share(), 0.0);
        port.apply_buy(0, &point(100.0)); // 1 @ 100
        port.apply_buy(1, &point(50.0)); // 2 @ 50
        assert!((port.shares_held() - 3.0).abs() < 1e-10);
        assert!((port.average_cost_per_share() - 200.0 / 3.0).abs() < 1e-10);
    }

    #[test]
    fn test_reset_restores_initial_state() {
        let mut port = Portfolio::new(fee_free_config(), Some(3));
        port.apply_buy(0, &point(100.0));
        port.apply_hold(1, &point(100.0));
        port.reset();
        assert_eq!(port.cash, 1_000.0);
        assert!(port.lots.is_empty());
        assert!(port.transactions.is_empty());
        assert_eq!(port.total_fees, 0.0);
        assert_eq!(port.trade_cap, Some(3));
    }

    #[test]
    fn test_transaction_kind_serialized_names() {
        let json = serde_json::to_string(&TransactionKind::StopLoss).unwrap();
        assert_eq!(json, "\"sell (stop-loss)\"");
        let json = serde_json::to_string(&Reason::HoldSignal).unwrap();
        assert_eq!(json, "\"hold_signal\"");
    }
}
