//! Timestamps, order construction/validation and the order state machine.

pub mod errors;
pub mod order;
pub mod time;

pub use errors::{BacktestError, BookError, FillError, LedgerError, OrderError};
pub use order::{NewOrderParams, Order, OrderId, OrderState, Side, Variant};
pub use time::{Timestamp, TimestampParseError};
