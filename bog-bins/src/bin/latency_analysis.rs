//! `latency_analysis <spot_balance> <futures_balance> <config_path> <data_path>`
//!
//! Re-runs the same market-data file once per swept sending latency and
//! writes `sample_latency_analysis.csv` with the final balances of each pass.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use bog_bins::common::init_logging;
use bog_core::backtester::Backtester;
use bog_core::config::ExchangeConfig;
use bog_core::io::{read_market_data, write_latency_analysis_csv};
use bog_strategies::MovingAverageCrossover;

#[derive(Parser, Debug)]
#[command(author, version, about = "Sweep sending latency and report final balances per pass")]
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
    let rows = backtester.run_latency_analysis(&records)?;

    write_latency_analysis_csv("sample_latency_analysis.csv", &rows)?;
    println!("wrote {} latency sweep rows to sample_latency_analysis.csv", rows.len());
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
            tracing::error!("latency analysis failed: {e:#}");
            ExitCode::FAILURE
        }
    }
}
