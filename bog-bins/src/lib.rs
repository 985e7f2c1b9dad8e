//! Shared CLI scaffolding for the `backtest` and `latency-analysis` binaries.

pub mod common;
