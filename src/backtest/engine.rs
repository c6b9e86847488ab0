use super::portfolio::{Portfolio, Transaction, TransactionKind};
use crate::config::SimConfig;
use crate::domain::*;
use crate::engine::adaptive::AdaptiveParams;
use crate::engine::q_learning::QTable;
use crate::error::{BacktestError, Result};
use crate::evaluation::metrics::{self, RunSummary};
use chrono::NaiveDateTime;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Single-run simulation loop.
///
/// Replays a price series step by step: the policy picks an action from the
/// action-value table, the portfolio executes it, and the table learns from
/// the resulting reward. The table is owned for the duration of the run and
/// handed back with `into_table`, so runs over a shared table are sequential
/// by construction.
pub struct BacktestEngine {
    pub portfolio: Portfolio,
    pub table: QTable,
    config: SimConfig,
    rng: StdRng,
}

/// Mutable state of one run, threaded through every step.
#[derive(Debug, Clone)]
pub struct RunState {
    pub step: usize,
    /// Remaining steps of forced inaction
    pub cooldown_counter: usize,
    pub params: AdaptiveParams,
    pub ruin_count: usize,
}

impl RunState {
    pub fn new(config: &SimConfig) -> Self {
        Self {
            step: 0,
            cooldown_counter: 0,
            params: AdaptiveParams::from_config(config),
            ruin_count: 0,
        }
    }
}

/// What happened at one step, kept for inspection and plotting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
    pub step: usize,
    pub timestamp: NaiveDateTime,
    pub price: f64,
    /// Absent until the rolling window has filled
    pub bands: Option<Bands>,
    /// `None` while cooling down
    pub action: Option<Action>,
    pub reward: f64,
    pub total_value: f64,
    pub ruined: bool,
}

/// Outcome of one simulation run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationResult {
    pub run: usize,
    pub final_portfolio_value: f64,
    pub shares_held: f64,
    pub average_cost_per_share: f64,
    pub total_fees: f64,
    pub trade_cap: Option<usize>,
    pub final_params: AdaptiveParams,
    pub summary: RunSummary,
    pub transactions: Vec<Transaction>,
    #[serde(skip)]
    pub steps: Vec<StepRecord>,
}

impl BacktestEngine {
    /// Fails when the table was built for a different window.
    pub fn new(
        config: SimConfig,
        table: QTable,
        trade_cap: Option<usize>,
        seed: u64,
    ) -> Result<Self> {
        if table.states() != config.window {
            return Err(BacktestError::Table(format!(
                "action-value table has {} states but the window is {}",
                table.states(),
                config.window
            )));
        }
        Ok(Self {
            portfolio: Portfolio::new(config.clone(), trade_cap),
            table,
            config,
            rng: StdRng::seed_from_u64(seed),
        })
    }

    /// Run the whole series. Ruin resets the portfolio and the table but
    /// never stops the run.
    pub fn run(&mut self, series: &PriceSeries) -> SimulationResult {
        let mut run = RunState::new(&self.config);
        let prices = series.prices();
        let mut steps = Vec::with_capacity(series.len());

        for (i, point) in series.points().iter().enumerate() {
            // ANTI-LOOKAHEAD: the step only sees prices [0..=i]
            let record = self.step(&mut run, &prices[..=i], point);
            steps.push(record);
        }

        debug!(
            steps = steps.len(),
            ruins = run.ruin_count,
            exploration = run.params.exploration_rate,
            "simulation finished"
        );
        self.build_result(series, run, steps)
    }

    /// Advance one step. `history` ends with the current price.
    pub fn step(&mut self, run: &mut RunState, history: &[f64], point: &PricePoint) -> StepRecord {
        let step = run.step;
        let window = self.config.window;
        let bands = bollinger_bands(history, window, self.config.num_std_dev);
        let state = step % window;

        // While cooling down nothing executes; the table still learns from
        // the step as if the policy had held.
        let (action, executed) = if run.cooldown_counter > 0 {
            run.cooldown_counter -= 1;
            (Action::Hold, None)
        } else {
            let action = self
                .table
                .choose_action(state, run.params.exploration_rate, &mut self.rng);
            self.execute(action, step, point);
            self.portfolio.apply_stop_losses(step, point);
            (action, Some(action))
        };

        let total_value = self.portfolio.total_value(point.price);
        let reward = self.reward(total_value);
        let next_state = (step + 1) % window;
        self.table.update(
            state,
            action,
            reward,
            next_state,
            run.params.learning_rate,
            run.params.discount_factor,
        );

        let ruined = total_value <= 0.0;
        if ruined {
            warn!(
                step,
                date = %point.timestamp,
                value = total_value,
                "portfolio value depleted, resetting portfolio and action-value table"
            );
            self.table.reset();
            self.portfolio.reset();
            run.cooldown_counter = self.config.cooldown_period;
            run.ruin_count += 1;
        }

        run.params.adapt(reward);
        run.step += 1;

        StepRecord {
            step,
            timestamp: point.timestamp,
            price: point.price,
            bands,
            action: executed,
            reward,
            total_value,
            ruined,
        }
    }

    /// Reward is the portfolio value relative to the starting cash, not the
    /// change since the previous step. Consecutive rewards are therefore
    /// strongly correlated; the learning update relies on this absolute form.
    fn reward(&self, total_value: f64) -> f64 {
        total_value - self.config.initial_cash
    }

    fn execute(&mut self, action: Action, step: usize, point: &PricePoint) {
        match action {
            Action::Buy => {
                self.portfolio.apply_buy(step, point);
            }
            Action::Sell => {
                self.portfolio.apply_sell(step, point);
            }
            Action::Hold => self.portfolio.apply_hold(step, point),
        }
    }

    pub fn into_table(self) -> QTable {
        self.table
    }

    fn build_result(
        &self,
        series: &PriceSeries,
        run: RunState,
        steps: Vec<StepRecord>,
    ) -> SimulationResult {
        let final_price = series.last().map(|p| p.price).unwrap_or(0.0);
        let value_curve: Vec<f64> = steps.iter().map(|s| s.total_value).collect();
        let summary = metrics::calculate_summary(
            self.config.initial_cash,
            &value_curve,
            &self.portfolio.transactions,
            run.ruin_count,
        );

        SimulationResult {
            run: 0,
            final_portfolio_value: self.portfolio.total_value(final_price),
            shares_held: self.portfolio.shares_held(),
            average_cost_per_share: self.portfolio.average_cost_per_share(),
            total_fees: self.portfolio.total_fees,
            trade_cap: self.portfolio.trade_cap,
            final_params: run.params,
            summary,
            transactions: self.portfolio.transactions.clone(),
            steps,
        }
    }
}

impl SimulationResult {
    pub fn print_summary(&self) {
        let s = &self.summary;
        println!("  Final Portfolio Value: ${:>12.2}", self.final_portfolio_value);
        println!("  Shares Held:           {:>13.4}", self.shares_held);
        println!("  Average Cost Per Share: ${:>11.2}", self.average_cost_per_share);
        println!("  Total Fees:            ${:>12.2}", self.total_fees);
        println!("  Total Return:          {:>12.2}%", s.total_return_pct);
        println!("  Max Drawdown:          {:>12.2}%", s.max_drawdown_pct);
        println!(
            "  Fills:                 {} buy / {} sell / {} stop-loss / {} hold",
            s.buy_count, s.sell_count, s.stop_loss_count, s.hold_count
        );
        println!("  Ruin Resets:           {:>13}", s.ruin_count);
        println!(
            "  Profitable Steps:      {:>12.1}%",
            self.final_params.positive_ratio() * 100.0
        );
        match self.trade_cap {
            Some(cap) => println!("  Open-Lot Cap:          {:>13}", cap),
            None => println!("  Open-Lot Cap:          {:>13}", "none"),
        }
        println!(
            "  Final epsilon/alpha/gamma: {:.4} / {:.4} / {:.4}, cooldown {}",
            self.final_params.exploration_rate,
            self.final_params.learning_rate,
            self.final_params.discount_factor,
            self.final_params.cooldown_length
        );
    }

    pub fn print_transaction_log(&self) {
        println!(
            "  {:>6} {:19} {:16} {:>12} {:>12} {:>12} {:>8}  {}",
            "Step", "Date", "Type", "Quantity", "Price", "Cash Delta", "Fee", "Reason"
        );
        for t in &self.transactions {
            let kind = match t.kind {
                TransactionKind::Buy => "buy",
                TransactionKind::Sell => "sell",
                TransactionKind::StopLoss => "sell (stop-loss)",
                TransactionKind::Hold => "hold",
            };
            println!(
                "  {:>6} {:19} {:16} {:>12.6} {:>12.2} {:>+12.2} {:>8.4}  {:?}",
                t.step,
                t.timestamp.format("%Y-%m-%d %H:%M:%S").to_string(),
                kind,
                t.quantity,
                t.price,
                t.cash_delta,
                t.fee,
                t.reason
            );
        }
    }
}
