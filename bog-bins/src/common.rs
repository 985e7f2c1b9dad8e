//! Shared setup for the CLI binaries: logging and final-balance reporting.

use anyhow::Result;

/// Bootstrap `tracing_subscriber` the way every binary in this workspace
/// does: an `EnvFilter` layered with either a human-readable or JSON `fmt`
/// layer, matching [`bog_core::utils::logger::init_logger`].
pub fn init_logging(level: &str, json_logs: bool) -> Result<()> {
    bog_core::utils::init_logger(level, json_logs);
    Ok(())
}

/// Print the final P&L line both CLIs end with.
pub fn print_pnl(initial_spot: f64, initial_futures: f64, spot: f64, futures: f64) {
    let pnl = (spot - initial_spot) + (futures - initial_futures);
    println!(
        "Total P&L: {pnl:.2} (spot {spot:.2}, futures {futures:.2})"
    );
}
