//! The replay driver: threads market events and strategy-produced orders
//! through per-instrument order books, applies fills, updates balances and
//! records mark-to-market balance history.
//!
//! Orders are arena-owned (see [`OrderArena`]) so that the pending list,
//! book level queues and the order/trade logs all resolve liveness through
//! one authoritative store instead of aliasing `Rc`/`shared_ptr`-style
//! references to the same heap object.

use std::collections::{HashMap, HashSet};

use crate::core::errors::BacktestError;
use crate::core::order::{NewOrderParams, Order, OrderId, OrderState, Side, Variant};
use crate::core::time::Timestamp;
use crate::data::exchange::{Exchange, MarketType};
use crate::data::security::Security;
use crate::io::MarketRecord;
use crate::ledger::{OrderLog, Trade, TradeLog};
use crate::orderbook::{Owner, OrderBook};
use crate::strategy::{DepthEvent, EventContext, QuoteEvent, Strategy, TradeEvent};

/// Latency values (nanoseconds) swept by [`Backtester::run_latency_analysis`].
pub const LATENCY_SWEEP_NS: [i64; 8] = [0, 10, 25, 50, 100, 200, 500, 1000];

type BookKey = (MarketType, String, Security);
type InstrumentKey = (MarketType, String, Security);

/// Owning storage for every order created during a run. The pending list,
/// book queues (via [`Owner::User`]) and logs hold only [`OrderId`]s; this
/// arena is the sole place an order's authoritative state lives.
#[derive(Debug, Default)]
pub struct OrderArena {
    orders: HashMap<OrderId, Order>,
    next_id: u64,
}

impl OrderArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Construct and store a new order, returning its id. Construction
    /// always succeeds at the arena level — validation failures leave the
    /// stored order in `Rejected` state (see [`Order::new`]).
    pub fn insert(&mut self, params: NewOrderParams, rules: &crate::data::exchange::TradingRules) -> OrderId {
        let id = OrderId(self.next_id);
        self.next_id += 1;
        let order = Order::new(id, params, rules);
        self.orders.insert(id, order);
        id
    }

    pub fn get(&self, id: OrderId) -> Option<&Order> {
        self.orders.get(&id)
    }

    pub fn get_mut(&mut self, id: OrderId) -> Option<&mut Order> {
        self.orders.get_mut(&id)
    }

    pub fn clear(&mut self) {
        self.orders.clear();
        self.next_id = 0;
    }

    pub fn len(&self) -> usize {
        self.orders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }
}

/// The replay driver. Generic over the strategy implementation so each
/// binary supplies its own concrete [`Strategy`] without dynamic dispatch.
pub struct Backtester<S: Strategy> {
    exchanges: HashMap<String, Exchange>,
    books: HashMap<BookKey, OrderBook>,
    arena: OrderArena,
    pending: Vec<OrderId>,
    last_price: HashMap<(MarketType, Security), f64>,
    last_event_ts: HashMap<InstrumentKey, Timestamp>,
    active_instruments: HashSet<InstrumentKey>,
    order_log: OrderLog,
    trade_log: TradeLog,
    next_trade_id: u64,
    initial_spot_balance: f64,
    initial_futures_balance: f64,
    spot_balance: f64,
    futures_balance: f64,
    strategy: S,
}

impl<S: Strategy> Backtester<S> {
    pub fn new(
        exchanges: HashMap<String, Exchange>,
        spot_balance: f64,
        futures_balance: f64,
        strategy: S,
    ) -> Self {
        Self {
            exchanges,
            books: HashMap::new(),
            arena: OrderArena::new(),
            pending: Vec::new(),
            last_price: HashMap::new(),
            last_event_ts: HashMap::new(),
            active_instruments: HashSet::new(),
            order_log: OrderLog::new(),
            trade_log: TradeLog::new(),
            next_trade_id: 0,
            initial_spot_balance: spot_balance,
            initial_futures_balance: futures_balance,
            spot_balance,
            futures_balance,
            strategy,
        }
    }

    pub fn order_log(&self) -> &OrderLog {
        &self.order_log
    }

    pub fn trade_log(&self) -> &TradeLog {
        &self.trade_log
    }

    pub fn arena(&self) -> &OrderArena {
        &self.arena
    }

    pub fn balances(&self) -> (f64, f64) {
        (self.spot_balance, self.futures_balance)
    }

    pub fn exchange(&self, name: &str) -> Option<&Exchange> {
        self.exchanges.get(name)
    }

    pub fn exchanges_mut(&mut self) -> impl Iterator<Item = &mut Exchange> {
        self.exchanges.values_mut()
    }

    /// Lookup a book explicitly created during the run. Returns
    /// `BookError::NoSuchBook` for an instrument never seen yet, unlike the
    /// internal per-record path which creates the book on first sight.
    pub fn book(
        &self,
        market: MarketType,
        exchange_name: &str,
        security: &Security,
    ) -> Result<&OrderBook, crate::core::errors::BookError> {
        self.books
            .get(&(market, exchange_name.to_string(), security.clone()))
            .ok_or_else(|| crate::core::errors::BookError::NoSuchBook {
                market,
                security: security.to_string(),
            })
    }

    /// Reset all run state (arena, books, pending list, logs, balances,
    /// strategy) while keeping the loaded exchange definitions. Used between
    /// passes of the latency sweep.
    pub fn clear(&mut self) {
        self.books.clear();
        self.arena.clear();
        self.pending.clear();
        self.last_price.clear();
        self.last_event_ts.clear();
        self.active_instruments.clear();
        self.order_log.clear();
        self.trade_log.clear();
        self.next_trade_id = 0;
        self.spot_balance = self.initial_spot_balance;
        self.futures_balance = self.initial_futures_balance;
        self.strategy.clear();
    }

    fn book_mut(&mut self, market: MarketType, exchange_name: &str, security: &Security) -> &mut OrderBook {
        let key = (market, exchange_name.to_string(), security.clone());
        if !self.books.contains_key(&key) {
            let tick_size = self
                .exchanges
                .get(exchange_name)
                .and_then(|ex| ex.trading_rules(market, security))
                .map(|r| r.tick_size())
                .unwrap_or(0.01);
            self.books.insert(key.clone(), OrderBook::new(tick_size));
        }
        self.books.get_mut(&key).unwrap()
    }

    fn balance_mut(&mut self, market: MarketType) -> &mut f64 {
        match market {
            MarketType::Spot => &mut self.spot_balance,
            MarketType::Futures => &mut self.futures_balance,
        }
    }

    fn balance(&self, market: MarketType) -> f64 {
        match market {
            MarketType::Spot => self.spot_balance,
            MarketType::Futures => self.futures_balance,
        }
    }

    /// Resolve `order_id` through the arena, apply the fill, create the
    /// resulting [`Trade`] and update position/balance. A stale fill
    /// produced against a book entry for a now-terminal order is a no-op —
    /// the arena is the only authority on liveness.
    fn apply_fill(
        &mut self,
        order_id: OrderId,
        price: f64,
        qty: f64,
        is_maker: bool,
        ts: Timestamp,
    ) -> Result<(), BacktestError> {
        if qty <= 0.0 {
            return Ok(());
        }
        let Some(order) = self.arena.get_mut(order_id) else {
            return Ok(());
        };
        if !order.is_live() {
            return Ok(());
        }
        let market_type = order.market_type;
        let side = order.side;
        let exchange_name = order.exchange_name.clone();
        let security = order.security.clone();

        if order.fill(qty, price).is_err() {
            // A stale/oversized fill attempt against a resting entry whose
            // remaining size has since changed; drop it rather than panic.
            return Ok(());
        }

        let (maker_pct, taker_pct) = self
            .exchanges
            .get(&exchange_name)
            .map(|ex| (ex.maker_fee_pct(market_type), ex.taker_fee_pct(market_type)))
            .unwrap_or((0.0, 0.0));

        let trade = Trade::new(
            self.next_trade_id,
            order_id,
            ts,
            security.clone(),
            market_type,
            exchange_name.clone(),
            side,
            qty,
            price,
            is_maker,
            maker_pct,
            taker_pct,
        );
        self.next_trade_id += 1;

        let delta = -(side.as_i8() as f64) * qty * price - trade.fee;
        *self.balance_mut(market_type) += delta;

        self.strategy.update_position(
            market_type,
            &exchange_name,
            &security,
            side.as_i8() as f64 * qty,
        );
        self.active_instruments
            .insert((market_type, exchange_name, security));

        tracing::debug!(order_id = order_id.0, price, qty, is_maker, "fill applied");
        self.trade_log.push(trade);
        Ok(())
    }

    fn settle_fills(
        &mut self,
        fills: Vec<(OrderId, f64, f64)>,
        is_maker: bool,
        ts: Timestamp,
    ) -> Result<(), BacktestError> {
        for (order_id, price, qty) in fills {
            self.apply_fill(order_id, price, qty, is_maker, ts)?;
        }
        Ok(())
    }

    /// Admit orders a strategy callback produced this tick: reject any whose
    /// notional exceeds the available balance in its market (a fatal
    /// condition per the error taxonomy — considered a strategy bug), else
    /// construct, log and queue it.
    fn admit_orders(
        &mut self,
        requests: Vec<NewOrderParams>,
        market: MarketType,
        exchange_name: &str,
        security: &Security,
    ) -> Result<(), BacktestError> {
        for params in requests {
            let rules = self
                .exchanges
                .get(exchange_name)
                .and_then(|ex| ex.trading_rules(market, security))
                .ok_or_else(|| BacktestError::UnknownSecurity {
                    exchange: exchange_name.to_string(),
                    security: security.to_string(),
                })?;

            let notional = params.base_size * params.price;
            let available = self.balance(market);
            if notional > available {
                return Err(BacktestError::BalanceExceeded {
                    notional,
                    available,
                    market,
                });
            }

            let id = self.arena.insert(params, rules);
            self.order_log.push(id);
            self.pending.push(id);
            self.active_instruments
                .insert((market, exchange_name.to_string(), security.clone()));
        }
        Ok(())
    }

    fn event_context(
        &self,
        ts: Timestamp,
        exchange_name: &str,
        market: MarketType,
        security: &Security,
    ) -> EventContext {
        EventContext {
            timestamp: ts,
            exchange_name: exchange_name.to_string(),
            market_type: market,
            security: security.clone(),
        }
    }

    /// Work the pending list in insertion order, gating on received/triggered
    /// state before checking fillability and matching.
    fn work_pending_orders(&mut self, now_ns: i64) -> Result<(), BacktestError> {
        let ids = self.pending.clone();
        for id in ids {
            let Some((market, exchange_name, security, side)) = self
                .arena
                .get(id)
                .map(|order| (order.market_type, order.exchange_name.clone(), order.security.clone(), order.side))
            else {
                continue;
            };

            let sending_latency_ns = self
                .exchanges
                .get(&exchange_name)
                .map(|ex| ex.sending_latency_ns())
                .unwrap_or(0);
            if let Some(order) = self.arena.get_mut(id) {
                order.check_received(now_ns, sending_latency_ns);
            }

            let last_price = self.last_price.get(&(market, security.clone())).copied();
            if let (Some(order), Some(last)) = (self.arena.get_mut(id), last_price) {
                if order.is_live() {
                    order.check_triggered(last);
                }
            }

            let (best_bid, best_ask) = {
                let book = self.book_mut(market, &exchange_name, &security);
                (book.best_bid(), book.best_ask())
            };

            let fillable = self
                .arena
                .get(id)
                .map(|o| o.check_fillability(best_bid, best_ask))
                .unwrap_or(false);
            if !fillable {
                continue;
            }

            let Some((variant, price, remaining)) = self
                .arena
                .get(id)
                .map(|o| (o.variant, o.price, o.remaining))
            else {
                continue;
            };

            let fills: Vec<(f64, f64)> = match variant {
                Variant::Market | Variant::Stop { .. } => self
                    .book_mut(market, &exchange_name, &security)
                    .fill_market(side, remaining)
                    .into_iter()
                    .map(|(_, p, q)| (p, q))
                    .collect(),
                Variant::Limit | Variant::StopLimit { .. } => {
                    let book = self.book_mut(market, &exchange_name, &security);
                    let marketable = book.limit_instant_fill_quantity(price, side);
                    let q = marketable.min(remaining);
                    let mut fills = Vec::new();
                    if q > 0.0 {
                        fills = book
                            .instant_fill_limit(side, q)
                            .into_iter()
                            .map(|(_, p, qq)| (p, qq))
                            .collect();
                    }
                    let filled_so_far: f64 = fills.iter().map(|(_, qq)| qq).sum();
                    if filled_so_far < remaining {
                        let residual = remaining - filled_so_far;
                        book.add_order(price, side, residual, Owner::User(id));
                    }
                    fills
                }
            };

            // Timestamp for fills produced off the pending-order walk has no
            // single authoritative source event; the last-seen market event
            // time for this instrument is the closest analogue.
            let ts = self
                .last_event_ts
                .get(&(market, exchange_name.clone(), security.clone()))
                .copied()
                .unwrap_or_else(|| Timestamp::new(1970, 1, 1, 0, 0, 0, 0));

            for (p, q) in fills {
                self.apply_fill(id, p, q, false, ts)?;
            }
        }

        let arena = &self.arena;
        self.pending.retain(|id| {
            arena
                .get(*id)
                .map(|o| o.is_live() || o.state == OrderState::SentToExchange)
                .unwrap_or(false)
        });
        Ok(())
    }

    /// Snapshot balances, mark-to-market any open positions against the
    /// last traded price using the weighted-average fill price. Both Spot
    /// and Futures adjustments are folded into the reported spot balance;
    /// `futures_balance` is never touched by this loop. Preserved
    /// deliberately — see DESIGN.md.
    fn snapshot_balances(&mut self, ts: Timestamp) {
        if self.trade_log.trades().is_empty() {
            self.trade_log.record_balance(ts, self.spot_balance, self.futures_balance);
            return;
        }

        let mut spot_mark = self.spot_balance;
        let instruments: Vec<InstrumentKey> = self.active_instruments.iter().cloned().collect();
        for (market_type, exchange_name, security) in instruments {
            let position = self.strategy.get_position(market_type, &exchange_name, &security);
            if position == 0.0 {
                continue;
            }
            let Ok(avg_entry) = self.trade_log.weighted_avg_fill_price(position.abs()) else {
                continue;
            };
            let mark_price = self
                .last_price
                .get(&(market_type, security.clone()))
                .copied()
                .unwrap_or(avg_entry);
            spot_mark += position * (avg_entry - mark_price);
        }

        self.trade_log.record_balance(ts, spot_mark, self.futures_balance);
    }

    /// Process one parsed market-data record: dispatch by kind, settle any
    /// resulting fills, admit strategy-produced orders, then rework the
    /// pending list and snapshot balances.
    pub fn process_record(&mut self, record: &MarketRecord) -> Result<(), BacktestError> {
        let (ts, exchange_name, security_symbol, market) = record.common_fields();

        let exchange = self
            .exchanges
            .get(exchange_name)
            .ok_or_else(|| BacktestError::UnknownExchange(exchange_name.to_string()))?;
        let security = exchange
            .find_security(market, security_symbol)
            .cloned()
            .ok_or_else(|| BacktestError::UnknownSecurity {
                exchange: exchange_name.to_string(),
                security: security_symbol.to_string(),
            })?;

        self.last_event_ts
            .insert((market, exchange_name.to_string(), security.clone()), ts);

        let requests = match record {
            MarketRecord::Trade { price, qty, .. } => {
                self.last_price.insert((market, security.clone()), *price);
                let fills = self.book_mut(market, exchange_name, &security).trade_occurred(*price, *qty);
                self.settle_fills(fills, true, ts)?;
                let event = TradeEvent {
                    context: self.event_context(ts, exchange_name, market, &security),
                    price: *price,
                    size: *qty,
                };
                tracing::debug!(exchange = exchange_name, %security, price, qty = *qty, "trade");
                self.strategy.on_trade(&event)
            }
            MarketRecord::BidUpdate { bid_price, bid_size, .. } => {
                let fills = self
                    .book_mut(market, exchange_name, &security)
                    .buy_side_updated(*bid_price, *bid_size);
                self.settle_fills(fills, true, ts)?;
                let event = self.quote_event(ts, exchange_name, market, &security);
                self.strategy.on_top_quote(&event)
            }
            MarketRecord::AskUpdate { ask_price, ask_size, .. } => {
                let fills = self
                    .book_mut(market, exchange_name, &security)
                    .sell_side_updated(*ask_price, *ask_size);
                self.settle_fills(fills, true, ts)?;
                let event = self.quote_event(ts, exchange_name, market, &security);
                self.strategy.on_top_quote(&event)
            }
            MarketRecord::BuySideUpdate { price, size, .. } => {
                let fills = self.book_mut(market, exchange_name, &security).buy_side_updated(*price, *size);
                self.settle_fills(fills, true, ts)?;
                let event = DepthEvent {
                    context: self.event_context(ts, exchange_name, market, &security),
                    side: Side::Buy,
                    price: *price,
                    size: *size,
                };
                self.strategy.on_depth(&event)
            }
            MarketRecord::SellSideUpdate { price, size, .. } => {
                let fills = self.book_mut(market, exchange_name, &security).sell_side_updated(*price, *size);
                self.settle_fills(fills, true, ts)?;
                let event = DepthEvent {
                    context: self.event_context(ts, exchange_name, market, &security),
                    side: Side::Sell,
                    price: *price,
                    size: *size,
                };
                self.strategy.on_depth(&event)
            }
        };

        self.admit_orders(requests, market, exchange_name, &security)?;
        self.work_pending_orders(ts.to_nanos_since_epoch())?;
        self.snapshot_balances(ts);
        Ok(())
    }

    fn quote_event(
        &self,
        ts: Timestamp,
        exchange_name: &str,
        market: MarketType,
        security: &Security,
    ) -> QuoteEvent {
        let book = self.books.get(&(market, exchange_name.to_string(), security.clone()));
        let bid = book.and_then(|b| b.best_bid());
        let ask = book.and_then(|b| b.best_ask());
        QuoteEvent {
            context: self.event_context(ts, exchange_name, market, security),
            bid_price: bid.unwrap_or(0.0),
            bid_size: bid.and_then(|p| book.map(|b| b.level_total_size(p))).unwrap_or(0.0),
            ask_price: ask.unwrap_or(0.0),
            ask_size: ask.and_then(|p| book.map(|b| b.level_total_size(p))).unwrap_or(0.0),
        }
    }

    /// Replay every record in order, aborting on the first fatal error.
    pub fn run(&mut self, records: &[MarketRecord]) -> Result<(), BacktestError> {
        tracing::info!(records = records.len(), "backtest run starting");
        for record in records {
            self.process_record(record)?;
        }
        tracing::info!(
            spot = self.spot_balance,
            futures = self.futures_balance,
            trades = self.trade_log.trades().len(),
            "backtest run finished"
        );
        Ok(())
    }

    /// Re-run the full record stream once per latency in [`LATENCY_SWEEP_NS`],
    /// resetting all state and applying the latency to every loaded exchange's
    /// sending side before each pass. Returns `(latency_ns, spot, futures)`
    /// final balances per pass.
    pub fn run_latency_analysis(
        &mut self,
        records: &[MarketRecord],
    ) -> Result<Vec<(i64, f64, f64)>, BacktestError> {
        let mut rows = Vec::with_capacity(LATENCY_SWEEP_NS.len());
        for &latency_ns in &LATENCY_SWEEP_NS {
            self.clear();
            for exchange in self.exchanges_mut() {
                exchange.set_sending_latency_ns(latency_ns);
            }
            self.run(records)?;
            let (spot, futures) = self.balances();
            tracing::info!(latency_ns, spot, futures, "latency sweep pass complete");
            rows.push((latency_ns, spot, futures));
        }
        Ok(rows)
    }
}
