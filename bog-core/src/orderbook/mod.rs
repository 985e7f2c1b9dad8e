//! Price-level order book with mixed external and user-owned liquidity.
//!
//! Price levels are keyed by an integer multiple of tick size rather than a
//! raw `f64`, so level lookups never hit float-equality bugs; doubles are
//! presented only at the public surface (`best_bid`/`best_ask`/fill tuples).

use std::collections::{BTreeMap, VecDeque};

use crate::core::order::{OrderId, Side};

type PriceKey = i64;

/// Who rests at a queue entry: the anonymous rest of the market, or a
/// specific user order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Owner {
    External,
    User(OrderId),
}

#[derive(Debug, Clone, PartialEq)]
struct LevelEntry {
    owner: Owner,
    qty: f64,
}

#[derive(Debug, Clone, PartialEq)]
struct Level {
    side: Side,
    queue: VecDeque<LevelEntry>,
}

impl Level {
    fn new(side: Side) -> Self {
        Self {
            side,
            queue: VecDeque::new(),
        }
    }

    fn total_size(&self) -> f64 {
        self.queue.iter().map(|e| e.qty).sum()
    }

    fn external_size(&self) -> f64 {
        self.queue
            .iter()
            .filter(|e| e.owner == Owner::External)
            .map(|e| e.qty)
            .sum()
    }
}

/// A fill produced while matching against this book: which order (or none,
/// for external-only consumption), at what price, for how much.
pub type Fill = (OrderId, f64, f64);

/// Mixed external/user liquidity book for one `(market, exchange, security)`.
#[derive(Debug, Clone)]
pub struct OrderBook {
    tick_size: f64,
    levels: BTreeMap<PriceKey, Level>,
}

impl OrderBook {
    pub fn new(tick_size: f64) -> Self {
        Self {
            tick_size,
            levels: BTreeMap::new(),
        }
    }

    fn key(&self, price: f64) -> PriceKey {
        (price / self.tick_size).round() as PriceKey
    }

    fn price(&self, key: PriceKey) -> f64 {
        key as f64 * self.tick_size
    }

    /// Consume resting liquidity at `price` FIFO as an external trade
    /// occurs. External segments vanish; user segments emit a fill.
    pub fn trade_occurred(&mut self, price: f64, qty: f64) -> Vec<Fill> {
        let key = self.key(price);
        let mut fills = Vec::new();
        let mut remaining = qty;

        let Some(level) = self.levels.get_mut(&key) else {
            return fills;
        };

        while remaining > 0.0 {
            let Some(front) = level.queue.front_mut() else {
                break;
            };
            let consumed = remaining.min(front.qty);
            if let Owner::User(id) = front.owner {
                fills.push((id, price, consumed));
            }
            front.qty -= consumed;
            remaining -= consumed;
            if front.qty <= 0.0 {
                level.queue.pop_front();
            }
        }
        if level.queue.is_empty() {
            self.levels.remove(&key);
        }
        fills
    }

    /// Add resting liquidity. If the level is opposite-tagged and
    /// `owner` is a user order, the order is aggressive and is routed to
    /// [`OrderBook::fill_market`] instead of resting.
    pub fn add_order(&mut self, price: f64, side: Side, size: f64, owner: Owner) -> Option<Vec<Fill>> {
        let key = self.key(price);
        let existing_side = self.levels.get(&key).map(|l| l.side);

        match existing_side {
            None => {
                let mut level = Level::new(side);
                level.queue.push_back(LevelEntry { owner, qty: size });
                self.levels.insert(key, level);
                None
            }
            Some(tag) if tag == side => {
                let level = self.levels.get_mut(&key).unwrap();
                if let Some(tail) = level.queue.back_mut() {
                    if tail.owner == owner {
                        tail.qty += size;
                        return None;
                    }
                }
                level.queue.push_back(LevelEntry { owner, qty: size });
                None
            }
            Some(_opposite) => match owner {
                Owner::User(_) => Some(self.fill_market(side, size)),
                Owner::External => None,
            },
        }
    }

    /// Shared walk used by both `fill_market` and `instant_fill_limit`:
    /// consume external liquidity level by level from the best opposite
    /// price outward. If liquidity runs out before `qty` is exhausted, the
    /// leftover is folded into the last fill produced rather than dropped —
    /// preserved from the engine this was modeled on (see DESIGN.md).
    fn walk_and_consume(&mut self, side: Side, qty: f64) -> Vec<Fill> {
        let mut fills: Vec<(PriceKey, f64)> = Vec::new();
        let mut remaining = qty;

        let mut next_key = match side {
            Side::Buy => self.best_ask_key(),
            Side::Sell => self.best_bid_key(),
        };

        while remaining > 0.0 {
            let Some(key) = next_key else { break };
            let Some(level) = self.levels.get(&key) else { break };
            let available = level.external_size();
            if available <= 0.0 {
                next_key = self.next_level_key(side, key);
                continue;
            }
            let consume = remaining.min(available);
            self.reduce_external(key, consume);
            fills.push((key, consume));
            remaining -= consume;
            next_key = self.next_level_key(side, key);
        }

        if remaining > 0.0 {
            if let Some(last) = fills.last_mut() {
                last.1 += remaining;
            }
        }

        fills
            .into_iter()
            .map(|(key, q)| (OrderId(0), self.price(key), q))
            .collect()
    }

    /// Match a Market or triggered Stop order against external
    /// liquidity only.
    pub fn fill_market(&mut self, side: Side, qty: f64) -> Vec<Fill> {
        self.walk_and_consume(side, qty)
    }

    /// Same walk, bounded by the marketable quantity computed via
    /// [`OrderBook::limit_instant_fill_quantity`].
    pub fn instant_fill_limit(&mut self, side: Side, qty: f64) -> Vec<Fill> {
        self.walk_and_consume(side, qty)
    }

    /// Total external size immediately fillable by a limit order at
    /// `limit_price`.
    pub fn limit_instant_fill_quantity(&self, limit_price: f64, side: Side) -> f64 {
        let limit_key = self.key(limit_price);
        let mut total = 0.0;
        let mut next_key = match side {
            Side::Buy => self.best_ask_key(),
            Side::Sell => self.best_bid_key(),
        };
        while let Some(key) = next_key {
            let eligible = match side {
                Side::Buy => key <= limit_key,
                Side::Sell => key >= limit_key,
            };
            if !eligible {
                break;
            }
            if let Some(level) = self.levels.get(&key) {
                total += level.external_size();
            }
            next_key = self.next_level_key(side, key);
        }
        total
    }

    fn sweep_level(&mut self, key: PriceKey, price: f64) -> Vec<Fill> {
        let Some(level) = self.levels.remove(&key) else {
            return Vec::new();
        };
        level
            .queue
            .into_iter()
            .filter_map(|entry| match entry.owner {
                Owner::User(id) => Some((id, price, entry.qty)),
                Owner::External => None,
            })
            .collect()
    }

    fn side_updated(&mut self, side: Side, price: f64, total_size: f64) -> Vec<Fill> {
        let key = self.key(price);
        let mut fills = Vec::new();

        match self.levels.get(&key).map(|l| l.side) {
            Some(existing) if existing == side => {
                let level = self.levels.get_mut(&key).unwrap();
                let e = level.external_size();
                let u_plus_e = level.total_size();
                if total_size > u_plus_e {
                    level.queue.push_back(LevelEntry {
                        owner: Owner::External,
                        qty: total_size - u_plus_e,
                    });
                } else if total_size < u_plus_e {
                    let reduce_qty = e.min(u_plus_e - total_size);
                    self.reduce_external(key, reduce_qty);
                }
            }
            Some(_opposite) => {
                fills.extend(self.sweep_level(key, price));
                let mut level = Level::new(side);
                if total_size > 0.0 {
                    level.queue.push_back(LevelEntry {
                        owner: Owner::External,
                        qty: total_size,
                    });
                }
                self.levels.insert(key, level);
            }
            None => {
                let mut level = Level::new(side);
                if total_size > 0.0 {
                    level.queue.push_back(LevelEntry {
                        owner: Owner::External,
                        qty: total_size,
                    });
                }
                self.levels.insert(key, level);
            }
        }

        let crossing_keys: Vec<PriceKey> = self
            .levels
            .iter()
            .filter(|(k, l)| {
                let wrong_side_of_crossing = match side {
                    Side::Buy => **k < key,
                    Side::Sell => **k > key,
                };
                wrong_side_of_crossing && l.side == side.opposite()
            })
            .map(|(k, _)| *k)
            .collect();

        for k in crossing_keys {
            let p = self.price(k);
            fills.extend(self.sweep_level(k, p));
        }

        fills
    }

    /// A depth update stating the buy side at `price` now totals
    /// `total_size`.
    pub fn buy_side_updated(&mut self, price: f64, total_size: f64) -> Vec<Fill> {
        self.side_updated(Side::Buy, price, total_size)
    }

    /// Mirror of [`OrderBook::buy_side_updated`] for the sell side.
    pub fn sell_side_updated(&mut self, price: f64, total_size: f64) -> Vec<Fill> {
        self.side_updated(Side::Sell, price, total_size)
    }

    fn next_level_key(&self, side: Side, from: PriceKey) -> Option<PriceKey> {
        match side {
            Side::Buy => self
                .levels
                .range((from + 1)..)
                .next()
                .map(|(k, _)| *k),
            Side::Sell => self
                .levels
                .range(..from)
                .next_back()
                .map(|(k, _)| *k),
        }
    }

    /// Greatest key strictly less than `p`.
    pub fn next_buy_side_level(&self, p: f64) -> Option<f64> {
        let key = self.key(p);
        self.levels.range(..key).next_back().map(|(k, _)| self.price(*k))
    }

    /// Least key strictly greater than `p`.
    pub fn next_sell_side_level(&self, p: f64) -> Option<f64> {
        let key = self.key(p);
        self.levels
            .range((key + 1)..)
            .next()
            .map(|(k, _)| self.price(*k))
    }

    fn best_bid_key(&self) -> Option<PriceKey> {
        self.levels
            .iter()
            .rev()
            .find(|(_, l)| l.side == Side::Buy)
            .map(|(k, _)| *k)
    }

    fn best_ask_key(&self) -> Option<PriceKey> {
        self.levels
            .iter()
            .find(|(_, l)| l.side == Side::Sell)
            .map(|(k, _)| *k)
    }

    pub fn best_bid(&self) -> Option<f64> {
        self.best_bid_key().map(|k| self.price(k))
    }

    pub fn best_ask(&self) -> Option<f64> {
        self.best_ask_key().map(|k| self.price(k))
    }

    /// Remove up to `qty` of external liquidity at `price`, consuming
    /// from the back of the queue first. User orders are never touched.
    pub fn reduce_external(&mut self, price_key: PriceKey, qty: f64) {
        let Some(level) = self.levels.get_mut(&price_key) else {
            return;
        };
        let mut remaining = qty;
        let mut i = level.queue.len();
        while remaining > 0.0 && i > 0 {
            i -= 1;
            if level.queue[i].owner != Owner::External {
                continue;
            }
            let consumed = remaining.min(level.queue[i].qty);
            level.queue[i].qty -= consumed;
            remaining -= consumed;
        }
        level.queue.retain(|e| e.qty > 0.0);
        if level.queue.is_empty() {
            self.levels.remove(&price_key);
        }
    }

    pub fn level_total_size(&self, price: f64) -> f64 {
        self.levels
            .get(&self.key(price))
            .map(|l| l.total_size())
            .unwrap_or(0.0)
    }

    pub fn level_external_size(&self, price: f64) -> f64 {
        self.levels
            .get(&self.key(price))
            .map(|l| l.external_size())
            .unwrap_or(0.0)
    }

    pub fn level_user_size(&self, price: f64) -> f64 {
        self.levels
            .get(&self.key(price))
            .map(|l| l.total_size() - l.external_size())
            .unwrap_or(0.0)
    }

    /// Up to `n` levels on `side`, best price first, as `(price, total_size)`.
    pub fn top_levels(&self, side: Side, n: usize) -> Vec<(f64, f64)> {
        let mut out = Vec::with_capacity(n);
        let mut price = match side {
            Side::Buy => self.best_bid(),
            Side::Sell => self.best_ask(),
        };
        while let Some(p) = price {
            if out.len() >= n {
                break;
            }
            out.push((p, self.level_total_size(p)));
            price = match side {
                Side::Buy => self.next_buy_side_level(p),
                Side::Sell => self.next_sell_side_level(p),
            };
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trade_occurred_fills_resting_user_order_after_external_consumed() {
        // Scenario S1: user buy 5 @ 100, external buy 3 @ 100, trade 6.
        let mut book = OrderBook::new(0.01);
        book.add_order(100.0, Side::Buy, 3.0, Owner::External);
        book.add_order(100.0, Side::Buy, 5.0, Owner::User(OrderId(1)));
        let fills = book.trade_occurred(100.0, 6.0);
        assert_eq!(fills, vec![(OrderId(1), 100.0, 3.0)]);
        assert_eq!(book.level_user_size(100.0), 2.0);
    }

    #[test]
    fn fill_market_sweeps_two_levels() {
        // Scenario S2: external ask 2 @ 101, 2 @ 102; buy 3 marketable.
        let mut book = OrderBook::new(0.01);
        book.add_order(101.0, Side::Sell, 2.0, Owner::External);
        book.add_order(102.0, Side::Sell, 2.0, Owner::External);
        let fills = book.fill_market(Side::Buy, 3.0);
        assert_eq!(fills, vec![(OrderId(0), 101.0, 2.0), (OrderId(0), 102.0, 1.0)]);
    }

    #[test]
    fn fill_market_never_touches_user_entries() {
        let mut book = OrderBook::new(0.01);
        book.add_order(101.0, Side::Sell, 2.0, Owner::User(OrderId(9)));
        let fills = book.fill_market(Side::Buy, 5.0);
        // No external liquidity at all: tail-attribution rule folds the
        // full quantity into the (empty) fill list, which stays empty since
        // no level was ever actually consumed.
        assert!(fills.is_empty());
        assert_eq!(book.level_user_size(101.0), 2.0);
    }

    #[test]
    fn depth_update_sweeps_opposite_tagged_user_order() {
        // Scenario S4: user sell resting at 100 (tag Sell); buy-side update
        // declares the buy side at 101 with size 2 — 100 < 101 so the
        // sell-tagged level at 100 is crossed and swept.
        let mut book = OrderBook::new(0.01);
        book.add_order(100.0, Side::Sell, 4.0, Owner::User(OrderId(7)));
        let fills = book.buy_side_updated(101.0, 2.0);
        assert_eq!(fills, vec![(OrderId(7), 100.0, 4.0)]);
        assert_eq!(book.best_bid(), Some(101.0));
    }

    #[test]
    fn best_bid_less_than_best_ask_when_both_populated() {
        let mut book = OrderBook::new(0.01);
        book.add_order(99.0, Side::Buy, 1.0, Owner::External);
        book.add_order(101.0, Side::Sell, 1.0, Owner::External);
        assert!(book.best_bid().unwrap() < book.best_ask().unwrap());
    }

    #[test]
    fn reapplying_same_depth_update_is_a_no_op() {
        let mut book = OrderBook::new(0.01);
        book.buy_side_updated(100.0, 5.0);
        let before = book.level_total_size(100.0);
        book.buy_side_updated(100.0, 5.0);
        assert_eq!(book.level_total_size(100.0), before);
    }

    #[test]
    fn reduce_external_consumes_from_the_back_first() {
        let mut book = OrderBook::new(0.01);
        book.add_order(100.0, Side::Buy, 2.0, Owner::External);
        book.add_order(100.0, Side::Buy, 3.0, Owner::User(OrderId(1)));
        book.add_order(100.0, Side::Buy, 4.0, Owner::External);
        book.reduce_external(book.key(100.0), 4.0);
        assert_eq!(book.level_user_size(100.0), 3.0);
        assert_eq!(book.level_external_size(100.0), 2.0);
    }
}
