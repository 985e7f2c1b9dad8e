//! Order construction, validation, state machine and fill accounting.

use crate::core::errors::{FillError, OrderError};
use crate::core::time::Timestamp;
use crate::data::exchange::{MarginType, MarketType, TradingRules};
use crate::data::security::Security;

/// Opaque handle into a [`crate::backtester::OrderArena`]. Never dereferenced
/// directly — the arena resolves liveness and state on every lookup so a
/// resting book entry can never outlive the order it refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OrderId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn as_i8(self) -> i8 {
        match self {
            Side::Buy => 1,
            Side::Sell => -1,
        }
    }

    pub fn opposite(self) -> Side {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }
}

/// Order lifecycle. A live order is `Working` or `PartiallyFilled`.
///
/// ```text
/// SentToExchange -> Working -> PartiallyFilled* -> Filled | Cancelled | Rejected
///                      \-> Cancelled   \-> Rejected
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OrderState {
    SentToExchange,
    Working,
    PartiallyFilled,
    Filled,
    Cancelled,
    Rejected,
}

impl OrderState {
    pub fn is_live(self) -> bool {
        matches!(self, OrderState::Working | OrderState::PartiallyFilled)
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            OrderState::Filled | OrderState::Cancelled | OrderState::Rejected
        )
    }
}

/// Per-variant behavior. Dispatch for `check_fillability`/`check_triggered`/
/// `modify` happens by matching on this, not through a class hierarchy.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Variant {
    Limit,
    Market,
    Stop { triggered: bool },
    StopLimit { trigger_price: f64, triggered: bool },
}

impl Variant {
    pub fn is_limit_like(self) -> bool {
        matches!(self, Variant::Limit | Variant::StopLimit { .. })
    }

    pub fn triggered(self) -> bool {
        match self {
            Variant::Stop { triggered } => triggered,
            Variant::StopLimit { triggered, .. } => triggered,
            _ => true,
        }
    }
}

/// Inputs needed to construct an order, gathered up front so the validation
/// algorithm in [`Order::new`] can read them in one pass.
pub struct NewOrderParams {
    pub side: Side,
    pub variant: Variant,
    pub market_type: MarketType,
    pub exchange_name: String,
    pub security: Security,
    pub submitted_ts: Timestamp,
    pub leverage: f64,
    pub margin: MarginType,
    pub price: f64,
    pub base_size: f64,
    pub quote_size: f64,
}

/// A single order. Carries both the shared fields every variant needs and
/// the tagged [`Variant`] for variant-specific trigger state.
#[derive(Debug, Clone, PartialEq)]
pub struct Order {
    pub id: OrderId,
    pub side: Side,
    pub variant: Variant,
    pub market_type: MarketType,
    pub exchange_name: String,
    pub security: Security,
    pub submitted_ts: Timestamp,
    pub leverage: f64,
    pub margin: MarginType,
    pub price: f64,
    pub base_size: f64,
    pub quote_size: f64,
    pub leverage_adjusted_base: f64,
    pub filled: f64,
    pub remaining: f64,
    pub avg_fill_price: f64,
    pub state: OrderState,
    pub rejection_reason: Option<OrderError>,
}

fn decimal_digit_count(value: f64) -> usize {
    let s = format!("{:.10}", value.abs());
    match s.split_once('.') {
        Some((_, frac)) => frac.trim_end_matches('0').len(),
        None => 0,
    }
}

/// Result of the size-derivation and cap-validation steps, computed once and
/// reused by both construction and `modify`.
struct DerivedSizes {
    base_size: f64,
    quote_size: f64,
    leverage_adjusted_base: f64,
}

fn derive_sizes(
    base_size: f64,
    quote_size: f64,
    price: f64,
    leverage: f64,
    rules: &TradingRules,
) -> Result<DerivedSizes, OrderError> {
    let (base_size, quote_size) = if quote_size > 0.0 {
        let min_base = rules.min_base_size();
        let derived_base = if min_base > 0.0 {
            (quote_size / price / min_base).floor() * min_base
        } else {
            quote_size / price
        };
        (derived_base, quote_size)
    } else {
        (base_size, base_size * price)
    };

    let leverage_adjusted_base = leverage * base_size;
    Ok(DerivedSizes {
        base_size,
        quote_size,
        leverage_adjusted_base,
    })
}

fn validate_caps(
    variant: Variant,
    derived: &DerivedSizes,
    rules: &TradingRules,
) -> Result<(), OrderError> {
    if derived.leverage_adjusted_base < rules.min_base_size() {
        return Err(OrderError::BelowMinBaseSize {
            size: derived.leverage_adjusted_base,
            min: rules.min_base_size(),
        });
    }
    let leveraged_quote = derived.quote_size;
    if leveraged_quote < rules.min_quote_value() {
        return Err(OrderError::BelowMinQuoteValue {
            notional: leveraged_quote,
            min: rules.min_quote_value(),
        });
    }

    let (max_base, max_quote) = if variant.is_limit_like() {
        (rules.max_limit_base_size(), rules.max_limit_quote_value())
    } else {
        (rules.max_market_base_size(), rules.max_market_quote_value())
    };

    if max_base >= 0.0 && derived.base_size > max_base {
        return Err(OrderError::AboveMaxBaseSize {
            size: derived.base_size,
            max: max_base,
        });
    }
    if max_quote >= 0.0 && derived.quote_size > max_quote {
        return Err(OrderError::AboveMaxQuoteValue {
            notional: derived.quote_size,
            max: max_quote,
        });
    }
    Ok(())
}

fn validate_front_matter(
    side_valid: bool,
    side: i8,
    base_size: f64,
    quote_size: f64,
    price: f64,
) -> Result<(), OrderError> {
    if !side_valid {
        return Err(OrderError::InvalidSide(side));
    }
    let base_nonzero = base_size != 0.0;
    let quote_nonzero = quote_size != 0.0;
    if base_nonzero == quote_nonzero {
        return Err(OrderError::AmbiguousSize);
    }
    if base_size < 0.0 || quote_size < 0.0 {
        return Err(OrderError::NegativeSize {
            base: base_size,
            quote: quote_size,
        });
    }
    if price <= 0.0 {
        return Err(OrderError::NonPositivePrice(price));
    }
    Ok(())
}

fn validate_leverage(
    leverage: f64,
    margin: MarginType,
    rules: &TradingRules,
) -> Result<(), OrderError> {
    if leverage < 1.0 {
        return Err(OrderError::InvalidLeverage(leverage));
    }
    if (leverage == 1.0) != (margin == MarginType::None) {
        return Err(OrderError::LeverageMarginMismatch { leverage, margin });
    }
    match margin {
        MarginType::Isolated if leverage > rules.max_isolated_leverage() => {
            Err(OrderError::IsolatedLeverageCapExceeded {
                leverage,
                cap: rules.max_isolated_leverage(),
            })
        }
        MarginType::Cross if leverage > rules.max_cross_leverage() => {
            Err(OrderError::CrossLeverageCapExceeded {
                leverage,
                cap: rules.max_cross_leverage(),
            })
        }
        _ => Ok(()),
    }
}

impl Order {
    /// Validate and build an order. Always returns an `Order` — a
    /// validation failure sets `state = Rejected` and records the reason in
    /// `rejection_reason` rather than failing the call.
    pub fn new(id: OrderId, params: NewOrderParams, rules: &TradingRules) -> Order {
        let reject = |reason: OrderError| Order {
            id,
            side: params.side,
            variant: params.variant,
            market_type: params.market_type,
            exchange_name: params.exchange_name.clone(),
            security: params.security.clone(),
            submitted_ts: params.submitted_ts,
            leverage: params.leverage,
            margin: params.margin,
            price: params.price,
            base_size: params.base_size,
            quote_size: params.quote_size,
            leverage_adjusted_base: 0.0,
            filled: 0.0,
            remaining: 0.0,
            avg_fill_price: 0.0,
            state: OrderState::Rejected,
            rejection_reason: Some(reason),
        };

        let side_valid = true; // Side is an enum; construction cannot produce an invalid tag.
        if let Err(e) = validate_front_matter(
            side_valid,
            params.side.as_i8(),
            params.base_size,
            params.quote_size,
            params.price,
        ) {
            return reject(e);
        }

        if decimal_digit_count(params.price) > decimal_digit_count(rules.tick_size()) {
            return reject(OrderError::TickMisaligned {
                price: params.price,
                tick_size: rules.tick_size(),
            });
        }

        if let Err(e) = validate_leverage(params.leverage, params.margin, rules) {
            return reject(e);
        }

        let derived = match derive_sizes(
            params.base_size,
            params.quote_size,
            params.price,
            params.leverage,
            rules,
        ) {
            Ok(d) => d,
            Err(e) => return reject(e),
        };

        if let Err(e) = validate_caps(params.variant, &derived, rules) {
            return reject(e);
        }

        Order {
            id,
            side: params.side,
            variant: params.variant,
            market_type: params.market_type,
            exchange_name: params.exchange_name,
            security: params.security,
            submitted_ts: params.submitted_ts,
            leverage: params.leverage,
            margin: params.margin,
            price: params.price,
            base_size: derived.base_size,
            quote_size: derived.quote_size,
            leverage_adjusted_base: derived.leverage_adjusted_base,
            filled: 0.0,
            remaining: derived.leverage_adjusted_base,
            avg_fill_price: 0.0,
            state: OrderState::SentToExchange,
            rejection_reason: None,
        }
    }

    pub fn is_live(&self) -> bool {
        self.state.is_live()
    }

    /// `filled + remaining == leverage_adjusted_base` always holds after
    /// construction and every subsequent fill.
    pub fn fill(&mut self, qty: f64, price: f64) -> Result<(), FillError> {
        if !self.is_live() {
            return Err(FillError::NotLive);
        }
        if qty <= 0.0 {
            return Err(FillError::NonPositiveQuantity(qty));
        }
        if qty > self.remaining {
            return Err(FillError::ExceedsRemaining {
                qty,
                remaining: self.remaining,
            });
        }

        self.avg_fill_price =
            (self.avg_fill_price * self.filled + price * qty) / (self.filled + qty);
        self.filled += qty;
        self.remaining -= qty;

        self.state = if self.remaining == 0.0 {
            OrderState::Filled
        } else {
            OrderState::PartiallyFilled
        };
        Ok(())
    }

    pub fn cancel(&mut self) {
        if matches!(
            self.state,
            OrderState::Working | OrderState::PartiallyFilled | OrderState::SentToExchange
        ) {
            self.state = OrderState::Cancelled;
        }
        // Idempotent: already-terminal orders are left untouched.
    }

    pub fn check_received(&mut self, now_ns: i64, sending_latency_ns: i64) {
        if self.state == OrderState::SentToExchange
            && now_ns - self.submitted_ts.to_nanos_since_epoch() >= sending_latency_ns
        {
            self.state = OrderState::Working;
        }
    }

    /// Monotone: once set, `triggered` never clears.
    pub fn check_triggered(&mut self, last_price: f64) {
        let trigger = match self.variant {
            Variant::Stop { .. } => Some(self.price),
            Variant::StopLimit { trigger_price, .. } => Some(trigger_price),
            _ => None,
        };
        let Some(trigger) = trigger else { return };

        let should_trigger = match self.side {
            Side::Buy => last_price >= trigger,
            Side::Sell => last_price <= trigger,
        };
        if !should_trigger {
            return;
        }
        match &mut self.variant {
            Variant::Stop { triggered } => *triggered = true,
            Variant::StopLimit { triggered, .. } => *triggered = true,
            _ => {}
        }
    }

    pub fn check_fillability(&self, best_bid: Option<f64>, best_ask: Option<f64>) -> bool {
        if !self.is_live() {
            return false;
        }
        match self.variant {
            Variant::Market => true,
            Variant::Limit => price_crosses(self.side, self.price, best_bid, best_ask),
            Variant::Stop { triggered } => triggered,
            Variant::StopLimit { triggered, .. } => {
                triggered && price_crosses(self.side, self.price, best_bid, best_ask)
            }
        }
    }

    /// Revalidate and apply a modification. Stop/StopLimit orders recompute
    /// derived sizes but, matching the behavior this engine was modeled on,
    /// do not revalidate exchange caps — only `Limit` orders re-run the
    /// min/max cap checks from construction.
    pub fn modify(
        &mut self,
        new_price: f64,
        new_trigger_price: Option<f64>,
        new_base_size: f64,
        new_quote_size: f64,
        rules: &TradingRules,
    ) -> Result<(), OrderError> {
        if !self.is_live() {
            return Err(OrderError::NotLive);
        }
        if new_price <= 0.0 {
            return Err(OrderError::NonPositivePrice(new_price));
        }
        if decimal_digit_count(new_price) > decimal_digit_count(rules.tick_size()) {
            return Err(OrderError::TickMisaligned {
                price: new_price,
                tick_size: rules.tick_size(),
            });
        }

        let derived = derive_sizes(new_base_size, new_quote_size, new_price, self.leverage, rules)?;

        if matches!(self.variant, Variant::Limit) {
            validate_caps(self.variant, &derived, rules)?;
        }

        self.price = new_price;
        self.base_size = derived.base_size;
        self.quote_size = derived.quote_size;
        self.leverage_adjusted_base = derived.leverage_adjusted_base;
        self.remaining = (derived.leverage_adjusted_base - self.filled).max(0.0);

        if let Variant::StopLimit {
            trigger_price,
            triggered,
        } = &mut self.variant
        {
            if !*triggered {
                if let Some(new_trigger) = new_trigger_price {
                    *trigger_price = new_trigger;
                }
            }
            // Frozen once triggered: new_trigger_price is ignored.
        }

        Ok(())
    }
}

fn price_crosses(side: Side, price: f64, best_bid: Option<f64>, best_ask: Option<f64>) -> bool {
    match side {
        Side::Buy => best_ask.map(|ask| price >= ask).unwrap_or(false),
        Side::Sell => best_bid.map(|bid| price <= bid).unwrap_or(false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rules() -> TradingRules {
        TradingRules::from_slots([
            0.01, 0.001, 10.0, 100.0, 1_000_000.0, 100.0, 1_000_000.0, -1.0, -1.0, -1.0, 20.0,
            10.0,
        ])
    }

    fn base_params(variant: Variant, side: Side, base_size: f64, price: f64) -> NewOrderParams {
        NewOrderParams {
            side,
            variant,
            market_type: MarketType::Spot,
            exchange_name: "binance".to_string(),
            security: Security::new("BTC", "USDT"),
            submitted_ts: Timestamp::new(2024, 1, 1, 0, 0, 0, 0),
            leverage: 1.0,
            margin: MarginType::None,
            price,
            base_size,
            quote_size: 0.0,
        }
    }

    #[test]
    fn construction_accepts_valid_limit_order() {
        let order = Order::new(OrderId(1), base_params(Variant::Limit, Side::Buy, 1.0, 100.0), &rules());
        assert_eq!(order.state, OrderState::SentToExchange);
        assert_eq!(order.remaining, 1.0);
    }

    #[test]
    fn construction_rejects_ambiguous_size() {
        let mut params = base_params(Variant::Limit, Side::Buy, 1.0, 100.0);
        params.quote_size = 100.0;
        let order = Order::new(OrderId(1), params, &rules());
        assert_eq!(order.state, OrderState::Rejected);
        assert_eq!(order.rejection_reason, Some(OrderError::AmbiguousSize));
    }

    #[test]
    fn construction_rejects_tick_misalignment() {
        let order = Order::new(
            OrderId(1),
            base_params(Variant::Limit, Side::Buy, 1.0, 100.001),
            &rules(),
        );
        assert_eq!(order.state, OrderState::Rejected);
    }

    #[test]
    fn fill_updates_vwap_and_transitions_partially_filled_then_filled() {
        let mut order = Order::new(OrderId(1), base_params(Variant::Limit, Side::Buy, 5.0, 100.0), &rules());
        order.state = OrderState::Working;
        order.fill(2.0, 100.0).unwrap();
        assert_eq!(order.state, OrderState::PartiallyFilled);
        order.fill(3.0, 110.0).unwrap();
        assert_eq!(order.state, OrderState::Filled);
        assert!((order.avg_fill_price - 106.0).abs() < 1e-9);
    }

    #[test]
    fn filled_plus_remaining_invariant_holds() {
        let mut order = Order::new(OrderId(1), base_params(Variant::Limit, Side::Buy, 5.0, 100.0), &rules());
        order.state = OrderState::Working;
        order.fill(2.0, 100.0).unwrap();
        assert_eq!(order.filled + order.remaining, order.leverage_adjusted_base);
    }

    #[test]
    fn fill_on_terminal_order_is_rejected() {
        let mut order = Order::new(OrderId(1), base_params(Variant::Limit, Side::Buy, 1.0, 100.0), &rules());
        order.state = OrderState::Cancelled;
        assert_eq!(order.fill(1.0, 100.0), Err(FillError::NotLive));
    }

    #[test]
    fn cancel_on_terminal_order_is_idempotent() {
        let mut order = Order::new(OrderId(1), base_params(Variant::Limit, Side::Buy, 1.0, 100.0), &rules());
        order.state = OrderState::Filled;
        order.cancel();
        assert_eq!(order.state, OrderState::Filled);
    }

    #[test]
    fn check_triggered_is_monotone() {
        let mut order = Order::new(
            OrderId(1),
            base_params(Variant::Stop { triggered: false }, Side::Buy, 1.0, 105.0),
            &rules(),
        );
        order.check_triggered(100.0);
        assert!(!order.variant.triggered());
        order.check_triggered(106.0);
        assert!(order.variant.triggered());
        order.check_triggered(90.0);
        assert!(order.variant.triggered());
    }

    #[test]
    fn check_received_gates_on_sending_latency() {
        let mut order = Order::new(OrderId(1), base_params(Variant::Limit, Side::Buy, 1.0, 100.0), &rules());
        let submitted = order.submitted_ts.to_nanos_since_epoch();
        order.check_received(submitted + 200, 500);
        assert_eq!(order.state, OrderState::SentToExchange);
        order.check_received(submitted + 700, 500);
        assert_eq!(order.state, OrderState::Working);
    }

    #[test]
    fn stop_limit_modify_does_not_revalidate_caps() {
        let mut order = Order::new(
            OrderId(1),
            base_params(
                Variant::StopLimit {
                    trigger_price: 105.0,
                    triggered: false,
                },
                Side::Buy,
                1.0,
                104.0,
            ),
            &rules(),
        );
        order.state = OrderState::Working;
        // 10_000 base would exceed max_limit_base_size (100) if caps were
        // re-enforced; Stop/StopLimit modify skips that step.
        assert!(order.modify(104.0, Some(105.0), 10_000.0, 0.0, &rules()).is_ok());
    }

    proptest::proptest! {
        #[test]
        fn fill_preserves_filled_plus_remaining_invariant(
            base_size in 1.0f64..1000.0,
            fractions in proptest::collection::vec(0.01f64..1.0, 1..8),
        ) {
            let mut order = Order::new(OrderId(1), base_params(Variant::Limit, Side::Buy, base_size, 100.0), &rules());
            order.state = OrderState::Working;
            let total = order.filled + order.remaining;
            for f in fractions {
                if order.remaining <= 0.0 {
                    break;
                }
                let qty = order.remaining * f;
                if qty <= 0.0 {
                    continue;
                }
                order.fill(qty, 100.0).unwrap();
                proptest::prop_assert!((order.filled + order.remaining - total).abs() < 1e-6);
            }
        }
    }
}
