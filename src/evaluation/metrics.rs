use crate::backtest::portfolio::{Transaction, TransactionKind};
use serde::{Deserialize, Serialize};

/// Derived statistics for one simulation run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub total_return_pct: f64,
    pub max_drawdown_pct: f64,
    /// Counts over the final transaction log (the log restarts on ruin)
    pub buy_count: usize,
    pub sell_count: usize,
    pub stop_loss_count: usize,
    pub hold_count: usize,
    pub ruin_count: usize,
    pub steps: usize,
}

/// Summarise a run from its per-step value curve and transaction log.
pub fn calculate_summary(
    initial_cash: f64,
    value_curve: &[f64],
    transactions: &[Transaction],
    ruin_count: usize,
) -> RunSummary {
    let final_value = value_curve.last().copied().unwrap_or(initial_cash);
    let total_return_pct = if initial_cash > 0.0 {
        (final_value / initial_cash - 1.0) * 100.0
    } else {
        0.0
    };

    let count = |kind: TransactionKind| transactions.iter().filter(|t| t.kind == kind).count();

    RunSummary {
        total_return_pct,
        max_drawdown_pct: max_drawdown(value_curve),
        buy_count: count(TransactionKind::Buy),
        sell_count: count(TransactionKind::Sell),
        stop_loss_count: count(TransactionKind::StopLoss),
        hold_count: count(TransactionKind::Hold),
        ruin_count,
        steps: value_curve.len(),
    }
}

/// Largest peak-to-trough decline, in percent of the peak.
fn max_drawdown(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut peak = values[0];
    let mut max_dd = 0.0;

    for &val in values {
        if val > peak {
            peak = val;
        }
        if peak <= 0.0 {
            continue;
        }
        let dd = ((peak - val) / peak * 100.0).min(100.0);
        if dd > max_dd {
            max_dd = dd;
        }
    }
    max_dd
}
