//! CSV ingestion of market-data records and export of the three report CSVs.

use std::path::Path;

use anyhow::{bail, Context, Result};

use crate::core::order::Side;
use crate::core::time::Timestamp;
use crate::data::exchange::MarketType;
use crate::ledger::TradeLog;

/// One parsed market-data record. Column layout per kind, matching the wire
/// format: `ts, _, kind, security, exchange, market(S|F), ...`.
#[derive(Debug, Clone, PartialEq)]
pub enum MarketRecord {
    Trade {
        ts: Timestamp,
        security: String,
        exchange: String,
        market: MarketType,
        price: f64,
        qty: f64,
    },
    BidUpdate {
        ts: Timestamp,
        security: String,
        exchange: String,
        market: MarketType,
        bid_price: f64,
        bid_size: f64,
    },
    AskUpdate {
        ts: Timestamp,
        security: String,
        exchange: String,
        market: MarketType,
        ask_price: f64,
        ask_size: f64,
    },
    BuySideUpdate {
        ts: Timestamp,
        security: String,
        exchange: String,
        market: MarketType,
        price: f64,
        size: f64,
    },
    SellSideUpdate {
        ts: Timestamp,
        security: String,
        exchange: String,
        market: MarketType,
        price: f64,
        size: f64,
    },
}

impl MarketRecord {
    /// Fields every variant carries: event timestamp, exchange name,
    /// security symbol and market type.
    pub fn common_fields(&self) -> (Timestamp, &str, &str, MarketType) {
        match self {
            MarketRecord::Trade { ts, exchange, security, market, .. }
            | MarketRecord::BidUpdate { ts, exchange, security, market, .. }
            | MarketRecord::AskUpdate { ts, exchange, security, market, .. }
            | MarketRecord::BuySideUpdate { ts, exchange, security, market, .. }
            | MarketRecord::SellSideUpdate { ts, exchange, security, market, .. } => {
                (*ts, exchange.as_str(), security.as_str(), *market)
            }
        }
    }
}

fn parse_market(tag: &str) -> Result<MarketType> {
    match tag {
        "S" => Ok(MarketType::Spot),
        "F" => Ok(MarketType::Futures),
        other => bail!("unknown market tag '{other}', expected S or F"),
    }
}

fn field<'a>(record: &'a csv::StringRecord, index: usize) -> Result<&'a str> {
    record
        .get(index)
        .ok_or_else(|| anyhow::anyhow!("record is missing column {index}: {record:?}"))
}

fn parse_f64(record: &csv::StringRecord, index: usize) -> Result<f64> {
    field(record, index)?
        .parse()
        .with_context(|| format!("column {index} is not a valid number in {record:?}"))
}

fn parse_record(record: &csv::StringRecord) -> Result<MarketRecord> {
    let ts = Timestamp::parse(field(record, 0)?)?;
    let kind = field(record, 2)?;
    let security = field(record, 3)?.to_string();
    let exchange = field(record, 4)?.to_string();
    let market = parse_market(field(record, 5)?)?;

    match kind {
        "T" => Ok(MarketRecord::Trade {
            ts,
            security,
            exchange,
            market,
            price: parse_f64(record, 6)?,
            qty: parse_f64(record, 7)?,
        }),
        "BID_UPDATE" => Ok(MarketRecord::BidUpdate {
            ts,
            security,
            exchange,
            market,
            bid_price: parse_f64(record, 8)?,
            bid_size: parse_f64(record, 9)?,
        }),
        "ASK_UPDATE" => Ok(MarketRecord::AskUpdate {
            ts,
            security,
            exchange,
            market,
            ask_price: parse_f64(record, 14)?,
            ask_size: parse_f64(record, 15)?,
        }),
        "BUY_SIDE_UPDATE" => Ok(MarketRecord::BuySideUpdate {
            ts,
            security,
            exchange,
            market,
            price: parse_f64(record, 6)?,
            size: parse_f64(record, 7)?,
        }),
        "SELL_SIDE_UPDATE" => Ok(MarketRecord::SellSideUpdate {
            ts,
            security,
            exchange,
            market,
            price: parse_f64(record, 6)?,
            size: parse_f64(record, 7)?,
        }),
        other => bail!("unknown record kind '{other}'"),
    }
}

/// Reads every data row (the header row is skipped automatically) from
/// `path` into parsed [`MarketRecord`]s, in file order.
pub fn read_market_data<P: AsRef<Path>>(path: P) -> Result<Vec<MarketRecord>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(&path)
        .with_context(|| format!("opening market data at {}", path.as_ref().display()))?;

    let mut records = Vec::new();
    for row in reader.records() {
        let row = row.context("reading market data row")?;
        records.push(parse_record(&row)?);
    }
    Ok(records)
}

fn side_label(side: Side) -> &'static str {
    // "Buy" / "sell" casing is preserved verbatim from the report format
    // this was modeled on.
    match side {
        Side::Buy => "Buy",
        Side::Sell => "sell",
    }
}

/// `TIMESTAMP,SPOT_BALANCE,FUTURES_BALANCE`, two decimal places.
pub fn write_balance_history_csv<P: AsRef<Path>>(path: P, log: &TradeLog) -> Result<()> {
    let mut writer = csv::Writer::from_path(&path)
        .with_context(|| format!("creating {}", path.as_ref().display()))?;
    writer.write_record(["TIMESTAMP", "SPOT_BALANCE", "FUTURES_BALANCE"])?;
    for (ts, spot, futures) in log.balance_history() {
        writer.write_record([ts.to_string(), format!("{:.2}", spot), format!("{:.2}", futures)])?;
    }
    writer.flush()?;
    Ok(())
}

/// `TIMESTAMP,SECURITY,MARKET_TYPE,EXCHANGE,SIDE,SIZE,FEE`.
pub fn write_trade_log_csv<P: AsRef<Path>>(path: P, log: &TradeLog) -> Result<()> {
    let mut writer = csv::Writer::from_path(&path)
        .with_context(|| format!("creating {}", path.as_ref().display()))?;
    writer.write_record(["TIMESTAMP", "SECURITY", "MARKET_TYPE", "EXCHANGE", "SIDE", "SIZE", "FEE"])?;
    for trade in log.trades() {
        writer.write_record([
            trade.timestamp.to_string(),
            trade.security.to_string(),
            format!("{:?}", trade.market_type),
            trade.exchange_name.clone(),
            side_label(trade.side).to_string(),
            format!("{}", trade.qty),
            format!("{:.2}", trade.fee),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

/// `LATENCY,SPOT_BALANCE,FUTURES_BALANCE`, one row per latency sweep value.
pub fn write_latency_analysis_csv<P: AsRef<Path>>(
    path: P,
    rows: &[(i64, f64, f64)],
) -> Result<()> {
    let mut writer = csv::Writer::from_path(&path)
        .with_context(|| format!("creating {}", path.as_ref().display()))?;
    writer.write_record(["LATENCY", "SPOT_BALANCE", "FUTURES_BALANCE"])?;
    for (latency, spot, futures) in rows {
        writer.write_record([latency.to_string(), format!("{:.2}", spot), format!("{:.2}", futures)])?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn parses_trade_and_depth_rows() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "ts,_,kind,security,exchange,market,c6,c7,c8,c9").unwrap();
        writeln!(
            file,
            "2024-01-01 00:00:00.000000000,0,T,BTC/USDT,binance,S,100.5,2.0"
        )
        .unwrap();
        writeln!(
            file,
            "2024-01-01 00:00:00.000000001,0,BUY_SIDE_UPDATE,BTC/USDT,binance,S,99.0,5.0"
        )
        .unwrap();

        let records = read_market_data(file.path()).unwrap();
        assert_eq!(records.len(), 2);
        match &records[0] {
            MarketRecord::Trade { price, qty, .. } => {
                assert_eq!(*price, 100.5);
                assert_eq!(*qty, 2.0);
            }
            other => panic!("expected Trade, got {other:?}"),
        }
        match &records[1] {
            MarketRecord::BuySideUpdate { price, size, .. } => {
                assert_eq!(*price, 99.0);
                assert_eq!(*size, 5.0);
            }
            other => panic!("expected BuySideUpdate, got {other:?}"),
        }
    }

    #[test]
    fn unknown_kind_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "header").unwrap();
        writeln!(
            file,
            "2024-01-01 00:00:00.000000000,0,UNKNOWN,BTC/USDT,binance,S,1,2"
        )
        .unwrap();
        assert!(read_market_data(file.path()).is_err());
    }
}
