//! `backtest <spot_balance> <futures_balance> <config_path> <data_path>`
//!
//! Runs one backtest pass over the given market-data file, writes
//! `sample_result.csv` (balance history) and `sample_tradelog.csv`, and
//! prints total P&L.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use bog_bins::common::{init_logging, print_pnl};
use bog_core::backtester::Backtester;
use bog_core::config::ExchangeConfig;
use bog_core::io::{read_market_data, write_balance_history_csv, write_trade_log_csv};
use bog_strategies::MovingAverageCrossover;

#[derive(Parser, Debug)]
#[command(author, version, about = "Replay historical market data through the backtesting engine")]
struct Args {
    /// Starting Spot balance
    spot_balance: f64,
    /// Starting Futures balance
    futures_balance: f64,
    /// Path to the exchange configuration document
    config_path: PathBuf,
    /// Path to the market-data CSV
    data_path: PathBuf,

    #[arg(long, default_value = "info")]
    log_level: String,
    #[arg(long)]
    json_logs: bool,
}

fn run(args: &Args) -> anyhow::Result<()> {
    let exchanges = ExchangeConfig::load(&args.config_path)?;
    let records = read_market_data(&args.data_path)?;

    let strategy = MovingAverageCrossover::new(5, 20, 0.01);
    let mut backtester = Backtester::new(exchanges, args.spot_balance, args.futures_balance, strategy);
    backtester.run(&records)?;

    write_balance_history_csv("sample_result.csv", backtester.trade_log())?;
    write_trade_log_csv("sample_tradelog.csv", backtester.trade_log())?;

    let (spot, futures) = backtester.balances();
    print_pnl(args.spot_balance, args.futures_balance, spot, futures);
    Ok(())
}

fn main() -> ExitCode {
    let args = Args::parse();
    if let Err(e) = init_logging(&args.log_level, args.json_logs) {
        eprintln!("failed to initialize logging: {e:#}");
        return ExitCode::FAILURE;
    }

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("backtest failed: {e:#}");
            ExitCode::FAILURE
        }
    }
}
