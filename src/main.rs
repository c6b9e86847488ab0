use anyhow::Context;
use clap::Parser;
use qtrade::backtest::{BacktestReport, Runner};
use qtrade::engine::QTable;
use qtrade::{BacktestError, SimConfig};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "qtrade", about = "Self-learning Bollinger-band trading simulator")]
struct Cli {
    /// Number of simulations to run
    #[arg(long, default_value = "5", allow_negative_numbers = true)]
    num: i64,
    /// Price CSV with a date column and an Adj Close (or Close) column
    #[arg(long)]
    file: PathBuf,
    /// Cap open lots per run at a random count drawn from the configured range
    #[arg(long)]
    limit_trades: bool,
    /// TOML file overriding simulation parameters
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long, default_value = "42")]
    seed: u64,
    #[arg(long, default_value = "q_table.json")]
    table: PathBuf,
    #[arg(long, default_value = "simulation_results.json")]
    output: PathBuf,
    /// Skip the per-transaction listing
    #[arg(long)]
    quiet_log: bool,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    // Everything that can be rejected is checked before any simulation runs
    // or any file is written.
    if cli.num <= 0 {
        return Err(BacktestError::InvalidSimulationCount(cli.num).into());
    }
    let num_simulations = cli.num as usize;

    let config = match &cli.config {
        Some(path) => SimConfig::from_toml_file(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => {
            let config = SimConfig::default();
            config.validate()?;
            config
        }
    };

    let series = qtrade::data::load_price_csv(&cli.file)
        .with_context(|| format!("reading prices from {}", cli.file.display()))?;
    let table = QTable::load_or_zeros(&cli.table, config.window)
        .with_context(|| format!("loading action-value table from {}", cli.table.display()))?;

    println!("=== Q-Learning Bollinger Band Simulator ===");
    println!(
        "File: {}, {} prices, {} simulations, seed {}",
        cli.file.display(),
        series.len(),
        num_simulations,
        cli.seed
    );
    println!(
        "Cash: ${:.2}, window {}, k {:.1}, stop-loss {:.1}%, max order ${:.2}, trade limit: {}",
        config.initial_cash,
        config.window,
        config.num_std_dev,
        config.stop_loss_fraction * 100.0,
        config.max_single_order_amount,
        if cli.limit_trades { "on" } else { "off" }
    );

    let mut runner = Runner::new(config, num_simulations, cli.seed);
    runner.limit_trades = cli.limit_trades;
    runner.table_path = Some(cli.table.clone());

    let report = runner.run(&series, table)?;

    qtrade::data::save_results(&report.results, &cli.output)
        .with_context(|| format!("writing results to {}", cli.output.display()))?;

    print_report(&report, cli.quiet_log);
    println!(
        "\nResults saved to {}, action-value table saved to {}",
        cli.output.display(),
        cli.table.display()
    );
    Ok(())
}

fn print_report(report: &BacktestReport, quiet_log: bool) {
    if let Some(best) = report.best() {
        println!("\n========== BEST SIMULATION (run {}) ==========", best.run);
        best.print_summary();
    }

    println!("\n========== ALL SIMULATIONS ==========");
    println!(
        "  {:>4} {:>12} {:>8} {:>8} {:>6} {:>6} {:>6} {:>5}",
        "Run", "Final $", "Return%", "MaxDD%", "Buys", "Sells", "Stops", "Ruins"
    );
    for r in &report.results {
        println!(
            "  {:>4} {:>12.2} {:>+7.2}% {:>7.2}% {:>6} {:>6} {:>6} {:>5}",
            r.run,
            r.final_portfolio_value,
            r.summary.total_return_pct,
            r.summary.max_drawdown_pct,
            r.summary.buy_count,
            r.summary.sell_count,
            r.summary.stop_loss_count,
            r.summary.ruin_count
        );
    }

    for r in &report.results {
        println!("\n--- Simulation {} ---", r.run);
        r.print_summary();
        if !quiet_log {
            println!("  Transactions:");
            r.print_transaction_log();
        }
    }
}
