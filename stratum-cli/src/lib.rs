//! Stratum CLI - Command-line interface for the Stratum migration engine.
//!
//! This crate provides the `stratum` binary for writing, applying and
//! inspecting migrations of one or more storage engines.

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod models;
pub mod output;

use tracing_subscriber::EnvFilter;

/// Install the tracing subscriber.
///
/// `RUST_LOG` wins when set; otherwise `verbose` picks the level.
pub fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
