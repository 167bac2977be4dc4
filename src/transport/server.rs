//! Relay accept loop.
//!
//! # Connection Flow
//!
//! 1. Read the HTTP request head within [`HANDSHAKE_TIMEOUT`]
//! 2. Not an upgrade → `426`; no `Sec-WebSocket-Key` → `400`
//! 3. [`Relay::open`] decodes, validates and dials; failures map to
//!    `400`/`403`/`502`
//! 4. Write `101 Switching Protocols`, wrap the socket as a WebSocket and
//!    run the session until either side goes away

// ============================================================================
// Imports
// ============================================================================

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncRead;
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::protocol::Role;
use tracing::{debug, info, warn};

use crate::config::RelayConfig;
use crate::error::{Error, Result};
use crate::relay::Relay;

use super::handshake::{UpgradeRequest, write_rejection, write_switching_protocols};

// ============================================================================
// Constants
// ============================================================================

/// Pause after a failed accept before trying again.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// How long a client may take to send its request head.
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

// ============================================================================
// RelayServer
// ============================================================================

/// A bound relay listener.
///
/// # Example
///
/// ```ignore
/// use ws_relay::{RelayConfig, RelayServer};
///
/// let server = RelayServer::bind("0.0.0.0:8080", config).await?;
/// println!("listening on {}", server.local_addr());
/// server.serve().await;
/// ```
pub struct RelayServer {
    /// Listening socket.
    listener: TcpListener,
    /// Address the listener is bound to.
    local_addr: SocketAddr,
    /// Shared across connection tasks.
    relay: Arc<Relay>,
}

impl RelayServer {
    /// Binds the listener.
    ///
    /// Use port 0 to let the OS assign a free port.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if binding fails.
    pub async fn bind(addr: impl ToSocketAddrs, config: RelayConfig) -> Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;

        debug!(%local_addr, "Relay listener bound");

        Ok(Self {
            listener,
            local_addr,
            relay: Arc::new(Relay::new(config)),
        })
    }

    /// Returns the bound address.
    #[inline]
    #[must_use]
    pub const fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Accepts connections forever, one task per connection.
    pub async fn serve(self) {
        info!(addr = %self.local_addr, "Relay listening");

        loop {
            match self.listener.accept().await {
                Ok((stream, addr)) => {
                    let relay = Arc::clone(&self.relay);
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(&relay, stream, addr).await {
                            if e.is_client_error() {
                                debug!(error = %e, %addr, "Request rejected");
                            } else {
                                warn!(error = %e, %addr, "Connection handling failed");
                            }
                        }
                    });
                }
                Err(e) => {
                    warn!(error = %e, "Accept failed");
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                }
            }
        }
    }

    /// Accepts connections until `shutdown` resolves.
    ///
    /// Sessions already running are left to finish on their own.
    pub async fn serve_until(self, shutdown: impl Future<Output = ()>) {
        tokio::select! {
            () = self.serve() => {}
            () = shutdown => info!("Relay shutting down"),
        }
    }
}

// ============================================================================
// Connection Handling
// ============================================================================

/// Runs one connection from request head to session end.
async fn handle_connection(relay: &Relay, mut stream: TcpStream, addr: SocketAddr) -> Result<()> {
    debug!(%addr, "New TCP connection");

    let request = match read_request(&mut stream, HANDSHAKE_TIMEOUT).await {
        Ok(request) => request,
        Err(e) => return reject(&mut stream, e).await,
    };

    if !request.is_websocket_upgrade() {
        return reject(&mut stream, Error::NotUpgrade).await;
    }

    let Some(key) = request.websocket_key().map(str::to_owned) else {
        return reject(&mut stream, Error::handshake("missing Sec-WebSocket-Key")).await;
    };
    let protocol = request.negotiation().map(str::to_owned);

    let tunnel = match relay.open(protocol.as_deref()).await {
        Ok(tunnel) => tunnel,
        Err(e) => return reject(&mut stream, e).await,
    };

    write_switching_protocols(&mut stream, &key, protocol.as_deref()).await?;

    let ws = WebSocketStream::from_partially_read(
        stream,
        request.into_leftover(),
        Role::Server,
        None,
    )
    .await;

    info!(%addr, target = %tunnel.target(), "WebSocket accepted");
    tunnel.run(ws).await;

    Ok(())
}

/// Reads the request head, giving up after `limit`.
async fn read_request<S>(stream: &mut S, limit: Duration) -> Result<UpgradeRequest>
where
    S: AsyncRead + Unpin,
{
    tokio::time::timeout(limit, UpgradeRequest::read(stream))
        .await
        .map_err(|_| {
            Error::handshake(format!("no request head within {}ms", limit.as_millis()))
        })?
}

/// Answers with the status for `error`, then returns it.
///
/// IO failures are not answered; the peer is already unreachable.
async fn reject(stream: &mut TcpStream, error: Error) -> Result<()> {
    if !matches!(error, Error::Io(_)) {
        if let Err(e) = write_rejection(stream, error.status_code()).await {
            debug!(error = %e, "Failed to write rejection");
        }
    }
    Err(error)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    use crate::config::Credential;

    fn config() -> RelayConfig {
        RelayConfig::builder()
            .credential(Credential::from([7u8; 16]))
            .build()
            .unwrap()
    }

    async fn exchange(addr: SocketAddr, request: &[u8]) -> String {
        let mut client = TcpStream::connect(addr).await.unwrap();
        client.write_all(request).await.unwrap();

        let mut response = String::new();
        client.read_to_string(&mut response).await.unwrap();
        response
    }

    #[tokio::test]
    async fn test_bind_random_port() {
        let server = RelayServer::bind("127.0.0.1:0", config()).await.unwrap();
        assert!(server.local_addr().port() > 0);
        assert!(server.local_addr().ip().is_loopback());
    }

    #[tokio::test]
    async fn test_plain_http_gets_426() {
        let server = RelayServer::bind("127.0.0.1:0", config()).await.unwrap();
        let addr = server.local_addr();
        tokio::spawn(server.serve());

        let response = exchange(addr, b"GET / HTTP/1.1\r\nHost: relay\r\n\r\n").await;

        assert!(response.starts_with("HTTP/1.1 426 "));
        assert!(response.contains("Upgrade: websocket\r\n"));
    }

    #[tokio::test]
    async fn test_garbage_head_gets_400() {
        let server = RelayServer::bind("127.0.0.1:0", config()).await.unwrap();
        let addr = server.local_addr();
        tokio::spawn(server.serve());

        let response = exchange(addr, b"nonsense\r\n\r\n").await;

        assert!(response.starts_with("HTTP/1.1 400 "));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_request_head_times_out() {
        let (mut client, mut server) = tokio::io::duplex(1024);
        client.write_all(b"GET / HTTP/1.1\r\nHost: rel").await.unwrap();

        let result = read_request(&mut server, HANDSHAKE_TIMEOUT).await;

        assert!(matches!(result, Err(Error::Handshake { .. })));
        assert_eq!(result.unwrap_err().status_code(), 400);
        drop(client);
    }

    #[tokio::test(start_paused = true)]
    async fn test_prompt_request_head_is_read() {
        let (mut client, mut server) = tokio::io::duplex(1024);
        client
            .write_all(b"GET /tunnel HTTP/1.1\r\nHost: relay\r\n\r\n")
            .await
            .unwrap();

        let request = read_request(&mut server, HANDSHAKE_TIMEOUT).await.unwrap();

        assert_eq!(request.path(), "/tunnel");
    }

    #[tokio::test]
    async fn test_serve_until_stops_accepting() {
        let server = RelayServer::bind("127.0.0.1:0", config()).await.unwrap();

        tokio::time::timeout(Duration::from_secs(1), server.serve_until(async {}))
            .await
            .expect("server stopped");
    }
}
