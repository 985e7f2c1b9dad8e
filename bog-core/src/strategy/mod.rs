//! The interface strategies implement to react to replayed market events.

use crate::core::order::NewOrderParams;
use crate::core::time::Timestamp;
use crate::data::exchange::MarketType;
use crate::data::security::Security;

/// Fields common to every event message: when it happened and on which
/// market.
#[derive(Debug, Clone, PartialEq)]
pub struct EventContext {
    pub timestamp: Timestamp,
    pub exchange_name: String,
    pub market_type: MarketType,
    pub security: Security,
}

/// An external trade print.
#[derive(Debug, Clone, PartialEq)]
pub struct TradeEvent {
    pub context: EventContext,
    pub price: f64,
    pub size: f64,
}

/// A top-of-book quote update.
#[derive(Debug, Clone, PartialEq)]
pub struct QuoteEvent {
    pub context: EventContext,
    pub bid_price: f64,
    pub bid_size: f64,
    pub ask_price: f64,
    pub ask_size: f64,
}

/// A depth update stating the full external size at one price level.
#[derive(Debug, Clone, PartialEq)]
pub struct DepthEvent {
    pub context: EventContext,
    pub side: crate::core::order::Side,
    pub price: f64,
    pub size: f64,
}

/// A validated-at-admission-time order the strategy wants placed. The
/// backtester assigns the arena `OrderId` and constructs the real [`Order`](
/// crate::core::order::Order) from these params, so a strategy never needs
/// to generate its own id.
pub type OrderRequest = NewOrderParams;

/// Implemented by trading strategies under test. All three callbacks run
/// synchronously with the driver, before pending-order reprocessing for that
/// tick.
pub trait Strategy {
    fn on_trade(&mut self, event: &TradeEvent) -> Vec<OrderRequest>;
    fn on_top_quote(&mut self, event: &QuoteEvent) -> Vec<OrderRequest>;
    fn on_depth(&mut self, event: &DepthEvent) -> Vec<OrderRequest>;

    fn update_position(
        &mut self,
        market_type: MarketType,
        exchange_name: &str,
        security: &Security,
        delta: f64,
    );

    fn get_position(
        &self,
        market_type: MarketType,
        exchange_name: &str,
        security: &Security,
    ) -> f64;

    /// Reset all strategy state between backtest runs (e.g. the latency
    /// sweep re-runs the same strategy from a clean slate each pass).
    fn clear(&mut self);
}
