// src/logging.rs

use anyhow::Result;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initialize tracing for the process.
///
/// `RUST_LOG` wins over `level` when set. With `json` the events are emitted
/// as one JSON object per line.
pub fn init_logging(level: &str, json: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(level))?;

    if json {
        tracing_subscriber::registry()
            .with(fmt::layer().json().with_target(false).with_writer(std::io::stderr))
            .with(filter)
            .try_init()?;
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .with(filter)
            .try_init()?;
    }

    Ok(())
}
