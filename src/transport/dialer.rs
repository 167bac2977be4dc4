//! Outbound connection dialer.
//!
//! [`Dialer::dial`] makes at most two attempts, each bounded by the
//! configured connect timeout:
//!
//! 1. the requested target;
//! 2. if that fails for any reason, the static fallback endpoint.
//!
//! A timed-out attempt is dropped, not left pending. The fallback ignores
//! the requested host and port entirely.

// ============================================================================
// Imports
// ============================================================================

use std::io;
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::config::{FallbackEndpoint, RelayConfig};
use crate::error::{Error, Result};
use crate::protocol::Target;

// ============================================================================
// Connector
// ============================================================================

/// Opens a single outbound stream.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Connected stream type.
    type Stream: Send;

    /// Connects to `host:port`, resolving names as needed.
    async fn connect(&self, host: &str, port: u16) -> io::Result<Self::Stream>;
}

/// Plain TCP connector.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpConnector;

#[async_trait]
impl Connector for TcpConnector {
    type Stream = TcpStream;

    async fn connect(&self, host: &str, port: u16) -> io::Result<TcpStream> {
        let stream = TcpStream::connect((host, port)).await?;
        stream.set_nodelay(true)?;
        Ok(stream)
    }
}

// ============================================================================
// Dialer
// ============================================================================

/// Dials targets with a bounded timeout and one static fallback.
#[derive(Debug, Clone)]
pub struct Dialer<C = TcpConnector> {
    /// Stream factory.
    connector: C,
    /// Per-attempt timeout.
    connect_timeout: Duration,
    /// Secondary endpoint.
    fallback: Option<FallbackEndpoint>,
}

impl Dialer<TcpConnector> {
    /// Creates a TCP dialer from relay configuration.
    #[must_use]
    pub fn from_config(config: &RelayConfig) -> Self {
        Self::new(TcpConnector, config.connect_timeout, config.fallback.clone())
    }
}

impl<C: Connector> Dialer<C> {
    /// Creates a dialer with an explicit connector.
    #[inline]
    #[must_use]
    pub const fn new(
        connector: C,
        connect_timeout: Duration,
        fallback: Option<FallbackEndpoint>,
    ) -> Self {
        Self {
            connector,
            connect_timeout,
            fallback,
        }
    }

    /// Connects to `target`, falling back to the static endpoint on failure.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DialFailed`] if every attempt fails.
    pub async fn dial(&self, target: &Target) -> Result<C::Stream> {
        match self.attempt(&target.host, target.port).await {
            Ok(stream) => return Ok(stream),
            Err(e) => debug!(%target, error = %e, "Direct dial failed"),
        }

        let Some(fallback) = &self.fallback else {
            warn!(%target, "Dial failed, no fallback configured");
            return Err(Error::dial_failed(&target.host, target.port));
        };

        match self.attempt(&fallback.host, fallback.port).await {
            Ok(stream) => {
                debug!(%target, %fallback, "Connected via fallback");
                Ok(stream)
            }
            Err(e) => {
                warn!(%target, %fallback, error = %e, "Dial failed on both attempts");
                Err(Error::dial_failed(&target.host, target.port))
            }
        }
    }

    /// Makes one connect attempt bounded by the connect timeout.
    async fn attempt(&self, host: &str, port: u16) -> io::Result<C::Stream> {
        timeout(self.connect_timeout, self.connector.connect(host, port))
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "connect timed out"))?
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Arc;

    use parking_lot::Mutex;
    use tokio::net::TcpListener;

    /// Records every attempt; `slow` hosts hang, `down` hosts refuse.
    #[derive(Default, Clone)]
    struct ScriptedConnector {
        attempts: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl Connector for ScriptedConnector {
        type Stream = String;

        async fn connect(&self, host: &str, port: u16) -> io::Result<String> {
            let address = format!("{host}:{port}");
            self.attempts.lock().push(address.clone());
            match host {
                "slow" => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    Ok(address)
                }
                "down" => Err(io::Error::from(io::ErrorKind::ConnectionRefused)),
                _ => Ok(address),
            }
        }
    }

    fn dialer(
        connector: ScriptedConnector,
        fallback: Option<(&str, u16)>,
    ) -> Dialer<ScriptedConnector> {
        Dialer::new(
            connector,
            Duration::from_millis(2000),
            fallback.map(|(host, port)| FallbackEndpoint {
                host: host.to_string(),
                port,
            }),
        )
    }

    #[tokio::test]
    async fn test_direct_success_skips_fallback() {
        let connector = ScriptedConnector::default();
        let dialer = dialer(connector.clone(), Some(("relay", 443)));

        let stream = dialer.dial(&Target::new("target", 80)).await.unwrap();

        assert_eq!(stream, "target:80");
        assert_eq!(*connector.attempts.lock(), vec!["target:80"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_falls_back() {
        let connector = ScriptedConnector::default();
        let dialer = dialer(connector.clone(), Some(("relay", 443)));

        let stream = dialer.dial(&Target::new("slow", 80)).await.unwrap();

        assert_eq!(stream, "relay:443");
        assert_eq!(*connector.attempts.lock(), vec!["slow:80", "relay:443"]);
    }

    #[tokio::test]
    async fn test_refusal_falls_back_ignoring_target() {
        let connector = ScriptedConnector::default();
        let dialer = dialer(connector.clone(), Some(("relay", 443)));

        let stream = dialer.dial(&Target::new("down", 8443)).await.unwrap();

        assert_eq!(stream, "relay:443");
    }

    #[tokio::test(start_paused = true)]
    async fn test_both_attempts_fail() {
        let connector = ScriptedConnector::default();
        let dialer = dialer(connector.clone(), Some(("slow", 443)));

        let err = dialer.dial(&Target::new("down", 80)).await.unwrap_err();

        assert!(matches!(err, Error::DialFailed { ref host, port: 80 } if host == "down"));
        assert_eq!(err.status_code(), 502);
        assert_eq!(connector.attempts.lock().len(), 2);
    }

    #[tokio::test]
    async fn test_no_fallback_fails_after_one_attempt() {
        let connector = ScriptedConnector::default();
        let dialer = dialer(connector.clone(), None);

        assert!(dialer.dial(&Target::new("down", 80)).await.is_err());
        assert_eq!(connector.attempts.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_tcp_connector_connects() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let stream = TcpConnector.connect("127.0.0.1", port).await.unwrap();
        let (_accepted, peer) = listener.accept().await.unwrap();

        assert_eq!(stream.local_addr().unwrap(), peer);
    }
}
