//! Trading venues: securities, trading rules, fee schedules and latencies.

use std::collections::HashMap;

use crate::data::security::Security;

/// `-1.0` in any [`TradingRules`] slot means "no cap".
pub const NO_CAP: f64 = -1.0;

/// Per-symbol trading constraints, the 12-slot vector from the wire config
/// format: tick size, minimum base size, minimum quote value, maximum limit
/// base size, maximum limit quote value, maximum market base size, maximum
/// market quote value, three unused slots, maximum isolated leverage,
/// maximum cross leverage.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TradingRules {
    slots: [f64; 12],
}

impl TradingRules {
    pub fn from_slots(slots: [f64; 12]) -> Self {
        Self { slots }
    }

    pub fn tick_size(&self) -> f64 {
        self.slots[0]
    }
    pub fn min_base_size(&self) -> f64 {
        self.slots[1]
    }
    pub fn min_quote_value(&self) -> f64 {
        self.slots[2]
    }
    pub fn max_limit_base_size(&self) -> f64 {
        self.slots[3]
    }
    pub fn max_limit_quote_value(&self) -> f64 {
        self.slots[4]
    }
    pub fn max_market_base_size(&self) -> f64 {
        self.slots[5]
    }
    pub fn max_market_quote_value(&self) -> f64 {
        self.slots[6]
    }
    pub fn max_isolated_leverage(&self) -> f64 {
        self.slots[10]
    }
    pub fn max_cross_leverage(&self) -> f64 {
        self.slots[11]
    }

    pub fn as_slots(&self) -> &[f64; 12] {
        &self.slots
    }
}

/// Spot vs. Futures. Cross/Isolated margin is orthogonal and carried on the
/// order, not the market type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MarketType {
    Spot,
    Futures,
}

/// Margin mode of an individual order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MarginType {
    None,
    Cross,
    Isolated,
}

/// One `(maker_pct, taker_pct)` fee tier.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeeTier {
    pub maker_pct: f64,
    pub taker_pct: f64,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ExchangeError {
    #[error("fee tier {tier} out of range (schedule has {len} tiers)")]
    TierOutOfRange { tier: usize, len: usize },
}

#[derive(Debug, Clone)]
struct MarketData {
    rules: HashMap<Security, TradingRules>,
    fee_schedule: Vec<FeeTier>,
    active_tier: usize,
}

impl MarketData {
    fn new() -> Self {
        Self {
            rules: HashMap::new(),
            fee_schedule: vec![FeeTier {
                maker_pct: 0.0,
                taker_pct: 0.0,
            }],
            active_tier: 0,
        }
    }

    fn active_fee(&self) -> FeeTier {
        self.fee_schedule[self.active_tier]
    }
}

/// A named trading venue. Equality and hashing are by name only, so an
/// `Exchange` instance is a logical identity regardless of runtime copies.
#[derive(Debug, Clone)]
pub struct Exchange {
    name: String,
    markets: HashMap<MarketType, MarketData>,
    sending_latency_ns: i64,
    receiving_latency_ns: i64,
}

impl PartialEq for Exchange {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}
impl Eq for Exchange {}
impl std::hash::Hash for Exchange {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

impl Exchange {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            markets: HashMap::new(),
            sending_latency_ns: 0,
            receiving_latency_ns: 0,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_trading_rules(&mut self, market: MarketType, security: Security, rules: TradingRules) {
        self.markets
            .entry(market)
            .or_insert_with(MarketData::new)
            .rules
            .insert(security, rules);
    }

    pub fn set_fee_schedule(&mut self, market: MarketType, schedule: Vec<FeeTier>) {
        let data = self.markets.entry(market).or_insert_with(MarketData::new);
        data.fee_schedule = schedule;
        data.active_tier = 0;
    }

    pub fn trading_rules(&self, market: MarketType, security: &Security) -> Option<&TradingRules> {
        self.markets.get(&market)?.rules.get(security)
    }

    pub fn listed_securities(&self, market: MarketType) -> Vec<&Security> {
        match self.markets.get(&market) {
            Some(data) => data.rules.keys().collect(),
            None => Vec::new(),
        }
    }

    pub fn find_security(&self, market: MarketType, symbol: &str) -> Option<&Security> {
        let target = Security::parse(symbol)?;
        self.markets.get(&market)?.rules.keys().find(|s| **s == target)
    }

    pub fn set_fee_tier(&mut self, market: MarketType, tier: usize) -> Result<(), ExchangeError> {
        let data = self.markets.entry(market).or_insert_with(MarketData::new);
        if tier >= data.fee_schedule.len() {
            return Err(ExchangeError::TierOutOfRange {
                tier,
                len: data.fee_schedule.len(),
            });
        }
        data.active_tier = tier;
        Ok(())
    }

    pub fn set_maker_fee(&mut self, market: MarketType, pct: f64) {
        let data = self.markets.entry(market).or_insert_with(MarketData::new);
        let tier = data.active_tier;
        data.fee_schedule[tier].maker_pct = pct;
    }

    pub fn set_taker_fee(&mut self, market: MarketType, pct: f64) {
        let data = self.markets.entry(market).or_insert_with(MarketData::new);
        let tier = data.active_tier;
        data.fee_schedule[tier].taker_pct = pct;
    }

    pub fn maker_fee_pct(&self, market: MarketType) -> f64 {
        self.markets
            .get(&market)
            .map(|d| d.active_fee().maker_pct)
            .unwrap_or(0.0)
    }

    pub fn taker_fee_pct(&self, market: MarketType) -> f64 {
        self.markets
            .get(&market)
            .map(|d| d.active_fee().taker_pct)
            .unwrap_or(0.0)
    }

    pub fn sending_latency_ns(&self) -> i64 {
        self.sending_latency_ns
    }

    pub fn receiving_latency_ns(&self) -> i64 {
        self.receiving_latency_ns
    }

    pub fn set_sending_latency_ns(&mut self, ns: i64) {
        self.sending_latency_ns = ns;
    }

    pub fn set_receiving_latency_ns(&mut self, ns: i64) {
        self.receiving_latency_ns = ns;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rules() -> TradingRules {
        TradingRules::from_slots([0.01, 0.001, 10.0, 100.0, 1_000_000.0, 100.0, 1_000_000.0, -1.0, -1.0, -1.0, 20.0, 10.0])
    }

    #[test]
    fn equality_and_hash_are_by_name_only() {
        let mut a = Exchange::new("binance");
        let b = Exchange::new("binance");
        a.set_sending_latency_ns(500);
        assert_eq!(a, b);
    }

    #[test]
    fn trading_rules_round_trip() {
        let mut ex = Exchange::new("binance");
        let sec = Security::new("BTC", "USDT");
        ex.set_trading_rules(MarketType::Spot, sec.clone(), rules());
        let got = ex.trading_rules(MarketType::Spot, &sec).unwrap();
        assert_eq!(got.tick_size(), 0.01);
        assert_eq!(got.max_cross_leverage(), 10.0);
    }

    #[test]
    fn fee_tier_out_of_range_errors() {
        let mut ex = Exchange::new("binance");
        ex.set_fee_schedule(
            MarketType::Spot,
            vec![FeeTier {
                maker_pct: 0.1,
                taker_pct: 0.2,
            }],
        );
        assert!(ex.set_fee_tier(MarketType::Spot, 5).is_err());
        assert!(ex.set_fee_tier(MarketType::Spot, 0).is_ok());
    }
}
