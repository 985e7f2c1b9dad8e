//! Domain error types for order validation, fills, book lookups, ledger
//! queries and the replay driver.
//!
//! Each enum is `thiserror`-derived and corresponds to one row of the error
//! taxonomy: validation failures are recoverable (the order is left
//! `Rejected` and the driver continues); book/backtest errors are fatal and
//! abort the run.

use thiserror::Error;

use crate::data::exchange::MarketType;

/// Failures during order construction or `modify`. Every variant corresponds
/// to one of the numbered validation steps.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum OrderError {
    #[error("side must be +1 (buy) or -1 (sell), got {0}")]
    InvalidSide(i8),
    #[error("exactly one of base_size/quote_size must be nonzero")]
    AmbiguousSize,
    #[error("size must be non-negative, got base={base} quote={quote}")]
    NegativeSize { base: f64, quote: f64 },
    #[error("price must be positive, got {0}")]
    NonPositivePrice(f64),
    #[error("price {price} has more decimal places than tick size {tick_size}")]
    TickMisaligned { price: f64, tick_size: f64 },
    #[error("leverage must be >= 1, got {0}")]
    InvalidLeverage(f64),
    #[error("leverage == 1 iff margin type is None (leverage={leverage}, margin={margin:?})")]
    LeverageMarginMismatch {
        leverage: f64,
        margin: crate::data::exchange::MarginType,
    },
    #[error("leverage {leverage} exceeds isolated margin cap {cap}")]
    IsolatedLeverageCapExceeded { leverage: f64, cap: f64 },
    #[error("leverage {leverage} exceeds cross margin cap {cap}")]
    CrossLeverageCapExceeded { leverage: f64, cap: f64 },
    #[error("leverage-adjusted base size {size} is below minimum base size {min}")]
    BelowMinBaseSize { size: f64, min: f64 },
    #[error("quote notional {notional} is below minimum quote value {min}")]
    BelowMinQuoteValue { notional: f64, min: f64 },
    #[error("base size {size} exceeds maximum allowed {max} for this order type")]
    AboveMaxBaseSize { size: f64, max: f64 },
    #[error("quote notional {notional} exceeds maximum allowed {max} for this order type")]
    AboveMaxQuoteValue { notional: f64, max: f64 },
    #[error("cannot modify an order that is not live")]
    NotLive,
}

/// Failures while applying a fill to an order.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum FillError {
    #[error("fill quantity must be positive, got {0}")]
    NonPositiveQuantity(f64),
    #[error("fill quantity {qty} exceeds remaining size {remaining}")]
    ExceedsRemaining { qty: f64, remaining: f64 },
    #[error("cannot fill an order in terminal state")]
    NotLive,
}

/// Failures looking up books.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum BookError {
    #[error("no order book for market {market:?} security {security}")]
    NoSuchBook { market: MarketType, security: String },
}

/// Fatal errors surfaced by the replay driver.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum BacktestError {
    #[error("unknown exchange '{0}'")]
    UnknownExchange(String),
    #[error("unknown security '{security}' on exchange '{exchange}'")]
    UnknownSecurity { exchange: String, security: String },
    #[error("malformed market-data record: {0}")]
    MalformedRecord(String),
    #[error(
        "order notional {notional} exceeds available balance {available} in market {market:?}"
    )]
    BalanceExceeded {
        notional: f64,
        available: f64,
        market: MarketType,
    },
    #[error(transparent)]
    Timestamp(#[from] crate::core::time::TimestampParseError),
}

/// Failures computing ledger aggregates.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum LedgerError {
    #[error("requested size {requested} exceeds total recorded trade size {available}")]
    InsufficientTradeHistory { requested: f64, available: f64 },
}
