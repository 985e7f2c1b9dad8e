//! Trading-venue descriptors: securities and exchanges.

pub mod exchange;
pub mod security;

pub use exchange::{Exchange, FeeTier, MarginType, MarketType, TradingRules};
pub use security::Security;
