//! Bog Core - an event-driven backtesting engine for exchange trading strategies.
//!
//! Bog replays recorded market data (trades, quotes and depth updates) through
//! a simulated limit order book and a user-order matching model, letting a
//! [`strategy::Strategy`] implementation trade against historical data exactly
//! as it would against a live venue.
//!
//! ## Core Modules
//! - `core`: timestamps, order construction/validation and the order state machine
//! - `data`: exchanges, trading rules and securities
//! - `orderbook`: price-level book with external and user-owned liquidity
//! - `ledger`: order log, trade log and weighted-average fill accounting
//! - `strategy`: the interface strategies implement to react to market events
//! - `backtester`: the replay driver tying the above together
//! - `config`: exchange configuration loading
//! - `io`: CSV market-data ingestion and report export
//! - `utils`: logging setup

pub mod backtester;
pub mod config;
pub mod core;
pub mod data;
pub mod io;
pub mod ledger;
pub mod orderbook;
pub mod strategy;
pub mod utils;

pub use anyhow::{Error, Result};
pub use backtester::Backtester;
pub use core::order::{Order, OrderId, OrderState, Side, Variant};
pub use core::time::Timestamp;
pub use data::exchange::{Exchange, MarginType, MarketType};
pub use data::security::Security;
pub use ledger::{OrderLog, Trade, TradeLog};
pub use orderbook::OrderBook;
pub use strategy::Strategy;

/// Convenient imports for strategy implementations and binaries.
pub mod prelude {
    pub use crate::core::order::{Order, OrderId, OrderState, Side, Variant};
    pub use crate::core::time::Timestamp;
    pub use crate::data::exchange::{Exchange, MarginType, MarketType};
    pub use crate::data::security::Security;
    pub use crate::ledger::{OrderLog, Trade, TradeLog};
    pub use crate::orderbook::OrderBook;
    pub use crate::strategy::{DepthEvent, QuoteEvent, Strategy, TradeEvent};
    pub use crate::{Error, Result};
}
