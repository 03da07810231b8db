//! Tracing subscriber setup

use tracing_subscriber::EnvFilter;

use crate::{config::Config, error::{Error, Result}};

/// Install the global subscriber
///
/// `RUST_LOG` wins over the configured level. Output is JSON unless `debug`
/// is set, in which case it is compact human-readable text.
pub fn init_tracing(config: &Config, debug: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.service.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let installed = if debug {
        tracing_subscriber::fmt()
            .compact()
            .with_env_filter(filter)
            .try_init()
    } else {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .try_init()
    };
    installed.map_err(|e| Error::Internal(format!("Failed to install tracing subscriber: {e}")))?;

    tracing::info!("Tracing initialized for service: {}", config.service.name);

    Ok(())
}
