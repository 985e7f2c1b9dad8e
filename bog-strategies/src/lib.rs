//! Sample strategies implementing [`bog_core::strategy::Strategy`].
//!
//! These exist to exercise the backtester end-to-end (the CLI binaries link
//! against one of them) and as a template for user-written strategies; the
//! exact trading logic is out of scope for the engine itself.

pub mod moving_average;

pub use moving_average::MovingAverageCrossover;
