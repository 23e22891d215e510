//! Relay server entry point.
//!
//! Loads `tandem-config.yaml` (or the file named by `TANDEM_CONFIG`),
//! falling back to defaults when the file is absent, then serves the
//! relay until `Ctrl-C`.

use std::path::PathBuf;
use std::sync::Arc;

use tandem_core::TandemConfig;
use tandem_relay::{RelayState, start_server};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Default configuration file, relative to the working directory.
const DEFAULT_CONFIG: &str = "tandem-config.yaml";

/// Application entry point.
///
/// # Errors
///
/// Returns an error if the configuration is invalid or the server fails
/// to bind or serve.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    info!("tandem-relay starting");

    let path = std::env::var_os("TANDEM_CONFIG")
        .map_or_else(|| PathBuf::from(DEFAULT_CONFIG), PathBuf::from);
    let config = if path.exists() {
        TandemConfig::from_file(&path)?
    } else {
        info!(path = %path.display(), "config file not found, using defaults");
        TandemConfig::parse("")?
    };
    info!(
        host = config.relay.host,
        port = config.relay.port,
        room_capacity = config.relay.room_capacity,
        "configuration loaded"
    );

    let state = Arc::new(RelayState::new(config.relay.room_capacity));
    start_server(&config.relay, state).await?;
    Ok(())
}
