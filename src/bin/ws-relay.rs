//! Relay server binary.
//!
//! Configured from the environment:
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `WS_RELAY_LISTEN` | `0.0.0.0:8080` | Listen address |
//! | `WS_RELAY_CREDENTIAL` | required | Shared credential (UUID) |
//! | `WS_RELAY_FALLBACK` | none | Fallback endpoint (`host:port`) |
//! | `WS_RELAY_CONNECT_TIMEOUT_MS` | `2000` | Per-attempt dial timeout |
//! | `RUST_LOG` | `info` | Log filter |

use std::env;

use tracing::info;
use tracing_subscriber::EnvFilter;
use ws_relay::{Credential, Error, RelayConfig, RelayServer, Result};

// ============================================================================
// Constants
// ============================================================================

const DEFAULT_LISTEN: &str = "0.0.0.0:8080";

// ============================================================================
// Functions
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let listen = env::var("WS_RELAY_LISTEN").unwrap_or_else(|_| DEFAULT_LISTEN.to_string());
    let config = config_from_env()?;

    let server = RelayServer::bind(listen.as_str(), config).await?;
    info!(addr = %server.local_addr(), "Relay started");

    server
        .serve_until(async {
            tokio::signal::ctrl_c().await.ok();
        })
        .await;

    Ok(())
}

/// Builds relay configuration from `WS_RELAY_*` variables.
fn config_from_env() -> Result<RelayConfig> {
    let credential: Credential = env::var("WS_RELAY_CREDENTIAL")
        .map_err(|_| Error::config("WS_RELAY_CREDENTIAL is not set"))?
        .parse()?;

    let mut builder = RelayConfig::builder().credential(credential);

    if let Ok(fallback) = env::var("WS_RELAY_FALLBACK") {
        let (host, port) = parse_host_port(&fallback)?;
        builder = builder.fallback(host, port);
    }

    if let Ok(millis) = env::var("WS_RELAY_CONNECT_TIMEOUT_MS") {
        let millis = millis
            .parse()
            .map_err(|_| Error::config(format!("invalid WS_RELAY_CONNECT_TIMEOUT_MS: {millis}")))?;
        builder = builder.connect_timeout_ms(millis);
    }

    builder.build()
}

/// Splits `host:port`, accepting `[v6]:port`.
fn parse_host_port(value: &str) -> Result<(String, u16)> {
    let invalid = || Error::config(format!("invalid WS_RELAY_FALLBACK: {value}"));

    let (host, port) = value.rsplit_once(':').ok_or_else(invalid)?;
    let host = host.trim_start_matches('[').trim_end_matches(']');
    let port = port.parse().map_err(|_| invalid())?;

    Ok((host.to_string(), port))
}
