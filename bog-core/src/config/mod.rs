//! Exchange configuration loading.
//!
//! The wire document is keyed by exchange name and nests per-`MarketType`
//! trading rules and fee tiers. Field names (`nanosecondLatencyTo`,
//! `tradeingRules`, `feeStructure`, ...) are preserved verbatim from the
//! document shape this crate was modeled on — they are a wire format, not
//! application code, so the idiosyncratic spelling stays.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::Deserialize;

use crate::data::exchange::{Exchange, FeeTier, MarketType, TradingRules};
use crate::data::security::Security;

#[derive(Debug, Deserialize)]
struct RawFeeTiers {
    #[serde(rename = "Maker")]
    maker: Vec<f64>,
    #[serde(rename = "Taker")]
    taker: Vec<f64>,
}

#[derive(Debug, Deserialize, Default)]
struct RawFeeStructureByMarket {
    #[serde(rename = "Spot")]
    spot: Option<RawFeeTiers>,
    #[serde(rename = "Margin")]
    margin: Option<RawFeeTiers>,
    #[serde(rename = "Futures")]
    futures: Option<RawFeeTiers>,
}

#[derive(Debug, Deserialize, Default)]
struct RawTradingRulesByMarket {
    #[serde(rename = "Spot")]
    spot: Option<HashMap<String, [f64; 12]>>,
    #[serde(rename = "Margin")]
    margin: Option<HashMap<String, [f64; 12]>>,
    #[serde(rename = "Futures")]
    futures: Option<HashMap<String, [f64; 12]>>,
}

#[derive(Debug, Deserialize)]
struct RawExchangeConfig {
    #[serde(rename = "nanosecondLatencyTo")]
    nanosecond_latency_to: i64,
    #[serde(rename = "nanosecondLatencyFrom")]
    nanosecond_latency_from: i64,
    #[serde(rename = "tradeingRules")]
    trading_rules: RawTradingRulesByMarket,
    #[serde(rename = "feeStructure")]
    fee_structure: RawFeeStructureByMarket,
}

fn fee_tiers(raw: &RawFeeTiers) -> Result<Vec<FeeTier>> {
    if raw.maker.len() != raw.taker.len() {
        bail!(
            "fee schedule maker/taker tier counts differ: {} vs {}",
            raw.maker.len(),
            raw.taker.len()
        );
    }
    Ok(raw
        .maker
        .iter()
        .zip(raw.taker.iter())
        .map(|(&maker_pct, &taker_pct)| FeeTier { maker_pct, taker_pct })
        .collect())
}

fn spot_or_margin(raw: &RawTradingRulesByMarket) -> Option<&HashMap<String, [f64; 12]>> {
    raw.spot.as_ref().or(raw.margin.as_ref())
}

fn spot_or_margin_fees(raw: &RawFeeStructureByMarket) -> Option<&RawFeeTiers> {
    raw.spot.as_ref().or(raw.margin.as_ref())
}

fn parse_security(exchange_name: &str, market: &str, symbol: &str) -> Result<Security> {
    Security::parse(symbol).ok_or_else(|| {
        anyhow::anyhow!(
            "exchange '{exchange_name}' has malformed {market} security '{symbol}', expected BASE/QUOTE"
        )
    })
}

/// Loads exchange configuration documents into ready-to-use [`Exchange`]
/// instances.
pub struct ExchangeConfig;

impl ExchangeConfig {
    /// Parse the structured config document at `path` into one [`Exchange`]
    /// per top-level key.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<HashMap<String, Exchange>> {
        let text = std::fs::read_to_string(&path)
            .with_context(|| format!("reading exchange config at {}", path.as_ref().display()))?;
        Self::parse(&text)
    }

    pub fn parse(text: &str) -> Result<HashMap<String, Exchange>> {
        let raw: HashMap<String, RawExchangeConfig> =
            serde_json::from_str(text).context("parsing exchange config JSON")?;

        let mut exchanges = HashMap::new();
        for (name, cfg) in raw {
            let mut exchange = Exchange::new(name.clone());
            exchange.set_sending_latency_ns(cfg.nanosecond_latency_to);
            exchange.set_receiving_latency_ns(cfg.nanosecond_latency_from);

            if let Some(rules) = spot_or_margin(&cfg.trading_rules) {
                for (symbol, slots) in rules {
                    let security = parse_security(&name, "spot", symbol)?;
                    exchange.set_trading_rules(MarketType::Spot, security, TradingRules::from_slots(*slots));
                }
            }
            if let Some(rules) = &cfg.trading_rules.futures {
                for (symbol, slots) in rules {
                    let security = parse_security(&name, "futures", symbol)?;
                    exchange.set_trading_rules(MarketType::Futures, security, TradingRules::from_slots(*slots));
                }
            }

            if let Some(tiers) = spot_or_margin_fees(&cfg.fee_structure) {
                exchange.set_fee_schedule(MarketType::Spot, fee_tiers(tiers)?);
            }
            if let Some(tiers) = &cfg.fee_structure.futures {
                exchange.set_fee_schedule(MarketType::Futures, fee_tiers(tiers)?);
            }

            exchanges.insert(name, exchange);
        }
        Ok(exchanges)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
    {
        "binance": {
            "nanosecondLatencyTo": 500,
            "nanosecondLatencyFrom": 250,
            "tradeingRules": {
                "Spot": {
                    "BTC/USDT": [0.01, 0.001, 10.0, 100.0, 1000000.0, 100.0, 1000000.0, -1.0, -1.0, -1.0, 20.0, 10.0]
                },
                "Futures": {
                    "BTC/USDT": [0.01, 0.001, 10.0, 100.0, 1000000.0, 100.0, 1000000.0, -1.0, -1.0, -1.0, 50.0, 25.0]
                }
            },
            "feeStructure": {
                "Spot": { "Maker": [0.1, 0.08], "Taker": [0.2, 0.18] },
                "Futures": { "Maker": [0.02], "Taker": [0.05] }
            }
        }
    }
    "#;

    #[test]
    fn parses_sample_document() {
        let exchanges = ExchangeConfig::parse(SAMPLE).unwrap();
        let binance = exchanges.get("binance").unwrap();
        assert_eq!(binance.sending_latency_ns(), 500);
        assert_eq!(binance.receiving_latency_ns(), 250);

        let btc_usdt = Security::new("BTC", "USDT");
        let rules = binance.trading_rules(MarketType::Spot, &btc_usdt).unwrap();
        assert_eq!(rules.tick_size(), 0.01);
        assert_eq!(rules.max_cross_leverage(), 10.0);

        assert_eq!(binance.maker_fee_pct(MarketType::Spot), 0.1);
        assert_eq!(binance.taker_fee_pct(MarketType::Futures), 0.05);
    }

    #[test]
    fn mismatched_fee_tier_counts_error() {
        let bad = SAMPLE.replace(r#""Taker": [0.2, 0.18]"#, r#""Taker": [0.2]"#);
        assert!(ExchangeConfig::parse(&bad).is_err());
    }
}
