//! Logging initialization for the CLI.
//!
//! Logging is owned by the CLI crate to keep the library crate
//! lightweight; core code only emits `tracing` events.

use tracing::Level;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initialize the tracing subscriber.
///
/// `verbosity`: 0 = INFO, 1 = DEBUG, 2+ = TRACE. `RUST_LOG` is honored
/// as the base filter, with the verbosity flag layered on top.
///
/// # Panics
/// Panics if the subscriber cannot be initialized (e.g., called twice).
pub fn init(verbosity: u8) {
    let level = match verbosity {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn"))
        .add_directive(format!("tinypm={level}").parse().unwrap())
        .add_directive(format!("tinypm_core={level}").parse().unwrap());

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .init();
}
