//! A fast/slow moving-average crossover strategy over trade prices.
//!
//! Maintains one rolling price window per `(market, exchange, security)` it
//! has seen a trade for. When the fast average crosses above the slow
//! average it sends a Market buy for `order_base_size`; crossing below sends
//! a Market sell. Quote and depth events are observed for position mark but
//! never themselves produce orders.

use std::collections::{HashMap, VecDeque};

use bog_core::core::order::{NewOrderParams, Side, Variant};
use bog_core::data::exchange::{MarginType, MarketType};
use bog_core::data::security::Security;
use bog_core::strategy::{DepthEvent, OrderRequest, QuoteEvent, Strategy, TradeEvent};

type InstrumentKey = (MarketType, String, Security);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CrossState {
    Unknown,
    FastAbove,
    FastBelow,
}

struct Window {
    prices: VecDeque<f64>,
    capacity: usize,
    sum: f64,
}

impl Window {
    fn new(capacity: usize) -> Self {
        Self {
            prices: VecDeque::with_capacity(capacity),
            capacity,
            sum: 0.0,
        }
    }

    fn push(&mut self, price: f64) {
        self.prices.push_back(price);
        self.sum += price;
        if self.prices.len() > self.capacity {
            if let Some(evicted) = self.prices.pop_front() {
                self.sum -= evicted;
            }
        }
    }

    fn average(&self) -> Option<f64> {
        if self.prices.len() < self.capacity {
            return None;
        }
        Some(self.sum / self.prices.len() as f64)
    }
}

struct InstrumentState {
    fast: Window,
    slow: Window,
    cross: CrossState,
}

/// Fast/slow SMA crossover. `fast_window`/`slow_window` are trade counts,
/// not wall-clock durations — the engine replays whatever trade density the
/// input data has.
pub struct MovingAverageCrossover {
    fast_window: usize,
    slow_window: usize,
    order_base_size: f64,
    state: HashMap<InstrumentKey, InstrumentState>,
    positions: HashMap<InstrumentKey, f64>,
}

impl MovingAverageCrossover {
    pub fn new(fast_window: usize, slow_window: usize, order_base_size: f64) -> Self {
        assert!(fast_window > 0 && fast_window < slow_window, "fast_window must be positive and smaller than slow_window");
        Self {
            fast_window,
            slow_window,
            order_base_size,
            state: HashMap::new(),
            positions: HashMap::new(),
        }
    }

    fn key(context: &bog_core::strategy::EventContext) -> InstrumentKey {
        (context.market_type, context.exchange_name.clone(), context.security.clone())
    }

    fn market_order(&self, event: &TradeEvent, side: Side) -> OrderRequest {
        NewOrderParams {
            side,
            variant: Variant::Market,
            market_type: event.context.market_type,
            exchange_name: event.context.exchange_name.clone(),
            security: event.context.security.clone(),
            submitted_ts: event.context.timestamp,
            leverage: 1.0,
            margin: MarginType::None,
            price: event.price,
            base_size: self.order_base_size,
            quote_size: 0.0,
        }
    }
}

impl Strategy for MovingAverageCrossover {
    fn on_trade(&mut self, event: &TradeEvent) -> Vec<OrderRequest> {
        let key = Self::key(&event.context);
        let entry = self.state.entry(key).or_insert_with(|| InstrumentState {
            fast: Window::new(self.fast_window),
            slow: Window::new(self.slow_window),
            cross: CrossState::Unknown,
        });
        entry.fast.push(event.price);
        entry.slow.push(event.price);

        let (Some(fast_avg), Some(slow_avg)) = (entry.fast.average(), entry.slow.average()) else {
            return Vec::new();
        };

        let new_cross = if fast_avg > slow_avg {
            CrossState::FastAbove
        } else if fast_avg < slow_avg {
            CrossState::FastBelow
        } else {
            entry.cross
        };

        let crossed_up = entry.cross != CrossState::FastAbove && new_cross == CrossState::FastAbove;
        let crossed_down = entry.cross != CrossState::FastBelow && new_cross == CrossState::FastBelow;
        entry.cross = new_cross;

        if crossed_up {
            tracing::debug!(security = %event.context.security, fast_avg, slow_avg, "fast crossed above slow, buying");
            vec![self.market_order(event, Side::Buy)]
        } else if crossed_down {
            tracing::debug!(security = %event.context.security, fast_avg, slow_avg, "fast crossed below slow, selling");
            vec![self.market_order(event, Side::Sell)]
        } else {
            Vec::new()
        }
    }

    fn on_top_quote(&mut self, _event: &QuoteEvent) -> Vec<OrderRequest> {
        Vec::new()
    }

    fn on_depth(&mut self, _event: &DepthEvent) -> Vec<OrderRequest> {
        Vec::new()
    }

    fn update_position(
        &mut self,
        market_type: MarketType,
        exchange_name: &str,
        security: &Security,
        delta: f64,
    ) {
        *self
            .positions
            .entry((market_type, exchange_name.to_string(), security.clone()))
            .or_insert(0.0) += delta;
    }

    fn get_position(&self, market_type: MarketType, exchange_name: &str, security: &Security) -> f64 {
        self.positions
            .get(&(market_type, exchange_name.to_string(), security.clone()))
            .copied()
            .unwrap_or(0.0)
    }

    fn clear(&mut self) {
        self.state.clear();
        self.positions.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bog_core::core::time::Timestamp;
    use bog_core::strategy::EventContext;

    fn context() -> EventContext {
        EventContext {
            timestamp: Timestamp::new(2024, 1, 1, 0, 0, 0, 0),
            exchange_name: "binance".to_string(),
            market_type: MarketType::Spot,
            security: Security::new("BTC", "USDT"),
        }
    }

    fn trade(price: f64) -> TradeEvent {
        TradeEvent {
            context: context(),
            price,
            size: 1.0,
        }
    }

    #[test]
    fn no_orders_before_both_windows_fill() {
        let mut strategy = MovingAverageCrossover::new(2, 4, 0.1);
        for price in [100.0, 101.0, 102.0] {
            assert!(strategy.on_trade(&trade(price)).is_empty());
        }
    }

    #[test]
    fn upward_crossover_emits_a_market_buy() {
        let mut strategy = MovingAverageCrossover::new(2, 4, 0.1);
        // Slow window of 4 fills on a flat run; then a sharp rally pulls the
        // fast average above the slow average.
        for price in [100.0, 100.0, 100.0, 100.0] {
            strategy.on_trade(&trade(price));
        }
        let orders = strategy.on_trade(&trade(120.0));
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].side, Side::Buy);
        assert_eq!(orders[0].variant, Variant::Market);
    }

    #[test]
    fn crossover_does_not_refire_while_already_crossed() {
        let mut strategy = MovingAverageCrossover::new(2, 4, 0.1);
        for price in [100.0, 100.0, 100.0, 100.0, 120.0] {
            strategy.on_trade(&trade(price));
        }
        assert!(strategy.on_trade(&trade(121.0)).is_empty());
    }

    #[test]
    fn position_tracking_accumulates_deltas() {
        let mut strategy = MovingAverageCrossover::new(2, 4, 0.1);
        let sec = Security::new("BTC", "USDT");
        strategy.update_position(MarketType::Spot, "binance", &sec, 1.5);
        strategy.update_position(MarketType::Spot, "binance", &sec, -0.5);
        assert_eq!(strategy.get_position(MarketType::Spot, "binance", &sec), 1.0);
    }

    #[test]
    fn clear_resets_windows_and_positions() {
        let mut strategy = MovingAverageCrossover::new(2, 4, 0.1);
        let sec = Security::new("BTC", "USDT");
        strategy.update_position(MarketType::Spot, "binance", &sec, 1.0);
        for price in [100.0, 100.0, 100.0, 100.0] {
            strategy.on_trade(&trade(price));
        }
        strategy.clear();
        assert_eq!(strategy.get_position(MarketType::Spot, "binance", &sec), 0.0);
        assert!(strategy.on_trade(&trade(100.0)).is_empty());
    }
}
