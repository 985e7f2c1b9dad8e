//! Order log, trade log and weighted-average fill-price accounting.

use crate::core::errors::LedgerError;
use crate::core::order::{OrderId, Side};
use crate::core::time::Timestamp;
use crate::data::exchange::MarketType;
use crate::data::security::Security;

/// An immutable execution record.
#[derive(Debug, Clone, PartialEq)]
pub struct Trade {
    pub id: u64,
    pub order_id: OrderId,
    pub timestamp: Timestamp,
    pub security: Security,
    pub market_type: MarketType,
    pub exchange_name: String,
    pub side: Side,
    pub qty: f64,
    pub price: f64,
    pub is_maker: bool,
    pub fee: f64,
}

impl Trade {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: u64,
        order_id: OrderId,
        timestamp: Timestamp,
        security: Security,
        market_type: MarketType,
        exchange_name: String,
        side: Side,
        qty: f64,
        price: f64,
        is_maker: bool,
        maker_fee_pct: f64,
        taker_fee_pct: f64,
    ) -> Self {
        let fee_pct = if is_maker { maker_fee_pct } else { taker_fee_pct };
        let fee = qty * price * fee_pct / 100.0;
        Self {
            id,
            order_id,
            timestamp,
            security,
            market_type,
            exchange_name,
            side,
            qty,
            price,
            is_maker,
            fee,
        }
    }
}

/// Insertion-ordered sequence of order ids admitted into the run.
#[derive(Debug, Clone, Default)]
pub struct OrderLog {
    ids: Vec<OrderId>,
}

impl OrderLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, id: OrderId) {
        self.ids.push(id);
    }

    pub fn iter(&self) -> impl Iterator<Item = &OrderId> {
        self.ids.iter()
    }

    pub fn clear(&mut self) {
        self.ids.clear();
    }
}

/// Insertion-ordered trades plus the parallel `(timestamp, spot, futures)`
/// balance history series.
#[derive(Debug, Clone, Default)]
pub struct TradeLog {
    trades: Vec<Trade>,
    balance_history: Vec<(Timestamp, f64, f64)>,
}

impl TradeLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, trade: Trade) {
        self.trades.push(trade);
    }

    pub fn trades(&self) -> &[Trade] {
        &self.trades
    }

    pub fn record_balance(&mut self, ts: Timestamp, spot_balance: f64, futures_balance: f64) {
        self.balance_history.push((ts, spot_balance, futures_balance));
    }

    pub fn balance_history(&self) -> &[(Timestamp, f64, f64)] {
        &self.balance_history
    }

    pub fn clear(&mut self) {
        self.trades.clear();
        self.balance_history.clear();
    }

    /// Walk trades newest-to-oldest, consuming `min(trade.qty,
    /// size - consumed)` at each trade until `consumed == size`, and return
    /// `Σ(trade.qty * trade.price) / Σ(trade.qty)` over the consumed
    /// segments. Errors instead of silently producing a `0.0/0.0` NaN when
    /// the recorded trade history is smaller than the requested size.
    pub fn weighted_avg_fill_price(&self, size: f64) -> Result<f64, LedgerError> {
        let mut consumed = 0.0;
        let mut weighted_sum = 0.0;

        for trade in self.trades.iter().rev() {
            if consumed >= size {
                break;
            }
            let take = (size - consumed).min(trade.qty);
            weighted_sum += take * trade.price;
            consumed += take;
        }

        if consumed < size {
            return Err(LedgerError::InsufficientTradeHistory {
                requested: size,
                available: consumed,
            });
        }

        Ok(weighted_sum / consumed)
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    fn trade(id: u64, qty: f64, price: f64) -> Trade {
        Trade::new(
            id,
            OrderId(1),
            Timestamp::new(2024, 1, 1, 0, 0, 0, 0),
            Security::new("BTC", "USDT"),
            MarketType::Spot,
            "binance".to_string(),
            Side::Buy,
            qty,
            price,
            true,
            0.1,
            0.2,
        )
    }

    #[test]
    fn fee_uses_maker_or_taker_rate_by_flag() {
        let t = trade(1, 2.0, 100.0);
        assert_relative_eq!(t.fee, 2.0 * 100.0 * 0.1 / 100.0, epsilon = 1e-9);
    }

    #[test]
    fn weighted_average_over_single_trade_equals_its_price() {
        let mut log = TradeLog::new();
        log.push(trade(1, 5.0, 100.0));
        assert_eq!(log.weighted_avg_fill_price(5.0).unwrap(), 100.0);
    }

    #[test]
    fn weighted_average_across_two_fills_matches_scenario_s6() {
        let mut log = TradeLog::new();
        log.push(trade(1, 2.0, 100.0));
        log.push(trade(2, 3.0, 110.0));
        let avg = log.weighted_avg_fill_price(5.0).unwrap();
        assert_relative_eq!(avg, 106.0, epsilon = 1e-9);
    }

    #[test]
    fn insufficient_trade_history_errors_instead_of_producing_nan() {
        let mut log = TradeLog::new();
        log.push(trade(1, 1.0, 100.0));
        assert_eq!(
            log.weighted_avg_fill_price(5.0),
            Err(LedgerError::InsufficientTradeHistory {
                requested: 5.0,
                available: 1.0,
            })
        );
    }
}
