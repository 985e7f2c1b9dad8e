//! `print-book <config_path> <data_path> <exchange> <security> <market>`
//!
//! Replays a market-data file through a bare [`OrderBook`] for one
//! instrument (no strategy, no fills applied against any order) and prints
//! the resulting ladder. Useful for sanity-checking a data file or a tick
//! size without running a full backtest.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use clap::Parser;

use bog_core::config::ExchangeConfig;
use bog_core::data::exchange::MarketType;
use bog_core::data::security::Security;
use bog_core::io::{read_market_data, MarketRecord};
use bog_core::core::order::Side;
use bog_core::orderbook::OrderBook;

#[derive(Parser, Debug)]
#[command(author, version, about = "Print the final order book ladder for one instrument")]
struct Args {
    /// Path to the exchange configuration document
    config_path: PathBuf,
    /// Path to the market-data CSV
    data_path: PathBuf,
    /// Exchange name, as it appears in the config and data file
    exchange: String,
    /// Security symbol, e.g. BTC/USDT
    security: String,
    /// Market type: spot or futures
    market: String,

    /// Levels to print per side
    #[arg(short, long, default_value = "10")]
    levels: usize,
}

fn parse_market(s: &str) -> Result<MarketType> {
    match s.to_ascii_lowercase().as_str() {
        "spot" => Ok(MarketType::Spot),
        "futures" => Ok(MarketType::Futures),
        other => bail!("unknown market type '{other}', expected spot or futures"),
    }
}

fn print_ladder(book: &OrderBook, levels: usize) {
    println!("asks (best last):");
    for (price, size) in book.top_levels(Side::Sell, levels).into_iter().rev() {
        println!("  {price:>12.4}  {size:>10.4}");
    }
    println!(
        "  -- spread: {} --",
        match (book.best_bid(), book.best_ask()) {
            (Some(bid), Some(ask)) => format!("{:.4}", ask - bid),
            _ => "n/a".to_string(),
        }
    );
    println!("bids (best first):");
    for (price, size) in book.top_levels(Side::Buy, levels) {
        println!("  {price:>12.4}  {size:>10.4}");
    }
}

fn run(args: &Args) -> Result<()> {
    let exchanges = ExchangeConfig::load(&args.config_path)?;
    let exchange = exchanges
        .get(&args.exchange)
        .with_context(|| format!("no exchange named '{}' in config", args.exchange))?;

    let security = Security::parse(&args.security)
        .with_context(|| format!("malformed security '{}', expected BASE/QUOTE", args.security))?;
    let market = parse_market(&args.market)?;

    let tick_size = exchange
        .trading_rules(market, &security)
        .map(|r| r.tick_size())
        .unwrap_or(0.01);
    let mut book = OrderBook::new(tick_size);

    let records = read_market_data(&args.data_path)?;
    let mut seen = 0usize;
    for record in &records {
        let (_, exchange_name, security_symbol, record_market) = record.common_fields();
        if exchange_name != args.exchange || record_market != market || security_symbol != security.to_string() {
            continue;
        }
        seen += 1;
        match record {
            MarketRecord::Trade { price, qty, .. } => {
                book.trade_occurred(*price, *qty);
            }
            MarketRecord::BidUpdate { bid_price, bid_size, .. }
            | MarketRecord::BuySideUpdate { price: bid_price, size: bid_size, .. } => {
                book.buy_side_updated(*bid_price, *bid_size);
            }
            MarketRecord::AskUpdate { ask_price, ask_size, .. }
            | MarketRecord::SellSideUpdate { price: ask_price, size: ask_size, .. } => {
                book.sell_side_updated(*ask_price, *ask_size);
            }
        }
    }

    println!(
        "{} records matched {} / {} / {market:?} ({} total records in file)",
        seen,
        args.exchange,
        security,
        records.len()
    );
    print_ladder(&book, args.levels);
    Ok(())
}

fn main() -> ExitCode {
    let args = Args::parse();
    bog_core::utils::init_logger("info", false);
    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("print-book failed: {e:#}");
            ExitCode::FAILURE
        }
    }
}
