//! Request → session wiring.
//!
//! [`Relay::open`] does everything that can still be reported with an HTTP
//! status: decode the negotiation field, validate the header, dial the
//! target. The returned [`Tunnel`] is then run over the accepted WebSocket;
//! from that point failures only show up as the connection closing.
//!
//! # Session Layout
//!
//! ```text
//!            ┌───────────── SessionState ─────────────┐
//!            │                                        │
//! WebSocket ─┼─ read loop ─► UplinkPump ─► TCP write  │
//!            │                                        │
//! WebSocket ◄┼─ WsOutbound ◄─ DownlinkPump ◄─ TCP read│
//!            └────────────────────────────────────────┘
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use bytes::Bytes;
use futures_util::StreamExt;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use crate::config::{FlowOptions, RelayConfig};
use crate::error::{Error, Result};
use crate::protocol::{Target, decode_header, decode_negotiation};
use crate::transport::{Dialer, WsOutbound};

use super::downlink::DownlinkPump;
use super::session::{Endpoint, SessionState, TcpEndpoint};
use super::uplink::UplinkPump;

// ============================================================================
// Relay
// ============================================================================

/// Turns negotiation fields into connected tunnels.
///
/// # Example
///
/// ```ignore
/// let relay = Relay::new(config);
///
/// match relay.open(request.negotiation()).await {
///     Ok(tunnel) => { /* answer 101, then */ tunnel.run(ws).await }
///     Err(e) => { /* answer e.status_code() */ }
/// }
/// ```
pub struct Relay {
    /// Validated configuration.
    config: Arc<RelayConfig>,
    /// Outbound connector.
    dialer: Dialer,
}

impl Relay {
    /// Creates a relay from configuration.
    #[must_use]
    pub fn new(config: RelayConfig) -> Self {
        let dialer = Dialer::from_config(&config);
        Self {
            config: Arc::new(config),
            dialer,
        }
    }

    /// Returns the relay configuration.
    #[inline]
    #[must_use]
    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    /// Decodes `negotiation`, validates the header and dials the target.
    ///
    /// # Errors
    ///
    /// - [`Error::MissingNegotiation`] / [`Error::MalformedNegotiation`] (400)
    /// - [`Error::Rejected`] (403)
    /// - [`Error::DialFailed`] (502)
    pub async fn open(&self, negotiation: Option<&str>) -> Result<Tunnel> {
        let buf = decode_negotiation(negotiation)?;

        let header = decode_header(&buf, &self.config.credential).map_err(|reason| {
            debug!(%reason, "Header rejected");
            Error::rejected(reason)
        })?;

        let stream = self.dialer.dial(&header.target).await?;
        let initial = Bytes::copy_from_slice(header.payload(&buf));

        debug!(target = %header.target, initial = initial.len(), "Target connected");

        Ok(Tunnel {
            target: header.target,
            stream,
            initial,
            flow: self.config.flow,
        })
    }
}

// ============================================================================
// Tunnel
// ============================================================================

/// A dialed target waiting for its WebSocket.
pub struct Tunnel {
    /// Requested target.
    target: Target,
    /// Connected target stream.
    stream: TcpStream,
    /// Payload that trailed the header.
    initial: Bytes,
    /// Session thresholds.
    flow: FlowOptions,
}

impl Tunnel {
    /// Returns the requested target.
    #[inline]
    #[must_use]
    pub fn target(&self) -> &Target {
        &self.target
    }

    /// Returns the payload that trailed the header.
    #[inline]
    #[must_use]
    pub fn initial_payload(&self) -> &[u8] {
        &self.initial
    }

    /// Relays between `ws` and the target until either side goes away.
    pub async fn run<S>(self, ws: WebSocketStream<S>)
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let Self {
            target,
            stream,
            initial,
            flow,
        } = self;

        let (reader, writer, tcp) = match TcpEndpoint::split(stream) {
            Ok(parts) => parts,
            Err(e) => {
                warn!(%target, error = %e, "Failed to split target stream");
                return;
            }
        };

        info!(%target, "Session started");
        run_session(ws, reader, writer, tcp, initial, flow).await;
        info!(%target, "Session ended");
    }
}

// ============================================================================
// Session Runner
// ============================================================================

/// Runs one session over an accepted WebSocket and a split target stream.
///
/// `initial` is queued before any WebSocket message is read, so it reaches
/// the target first. Returns once the session is dead.
pub async fn run_session<S, R, W>(
    ws: WebSocketStream<S>,
    reader: R,
    writer: W,
    tcp: impl Endpoint + 'static,
    initial: Bytes,
    flow: FlowOptions,
) where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (sink, mut inbound) = ws.split();
    let outbound = WsOutbound::spawn(sink);
    let session = SessionState::new(outbound.clone(), tcp);

    let uplink = UplinkPump::new(Arc::clone(&session), writer, flow);
    if !initial.is_empty() {
        uplink.push(initial);
    }

    tokio::spawn(DownlinkPump::new(Arc::clone(&session), outbound, reader, flow).run());

    loop {
        let message = tokio::select! {
            biased;
            () = session.terminated() => break,
            message = inbound.next() => message,
        };

        match message {
            Some(Ok(Message::Binary(data))) => uplink.push(data),

            Some(Ok(Message::Text(text))) => uplink.push(Bytes::from(text)),

            Some(Ok(Message::Close(_))) | None => {
                debug!("WebSocket closed by client");
                session.terminate();
                break;
            }

            Some(Err(e)) => {
                debug!(error = %e, "WebSocket read failed");
                session.terminate();
                break;
            }

            // Ping, Pong, Frame
            Some(Ok(_)) => {}
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Duration;

    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use futures_util::SinkExt;
    use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream, duplex};
    use tokio::net::TcpListener;
    use tokio_tungstenite::tungstenite::protocol::Role;

    use crate::config::Credential;
    use crate::protocol::RejectReason;
    use crate::relay::session::tests::CountingEndpoint;

    const SECRET: [u8; 16] = [0x42; 16];

    fn config(fallback: Option<u16>) -> RelayConfig {
        let builder = RelayConfig::builder()
            .credential(Credential::from(SECRET))
            .connect_timeout_ms(500);
        let builder = match fallback {
            Some(port) => builder.fallback("127.0.0.1", port),
            None => builder,
        };
        builder.build().unwrap()
    }

    fn negotiation(port: u16, payload: &[u8]) -> String {
        let mut buf = vec![0];
        buf.extend_from_slice(&SECRET);
        buf.extend_from_slice(&[0, 1]);
        buf.extend_from_slice(&port.to_be_bytes());
        buf.extend_from_slice(&[1, 127, 0, 0, 1]);
        buf.extend_from_slice(payload);
        STANDARD.encode(buf)
    }

    /// Returns a server-side WebSocket and the client side talking to it.
    async fn ws_pair() -> (WebSocketStream<DuplexStream>, WebSocketStream<DuplexStream>) {
        let (server, client) = duplex(1 << 20);
        let server = WebSocketStream::from_raw_socket(server, Role::Server, None).await;
        let client = WebSocketStream::from_raw_socket(client, Role::Client, None).await;
        (server, client)
    }

    #[tokio::test]
    async fn test_open_rejects_missing_negotiation() {
        let relay = Relay::new(config(None));
        let err = relay.open(None).await.err().unwrap();
        assert_eq!(err.status_code(), 400);
    }

    #[tokio::test]
    async fn test_open_rejects_bad_credential() {
        let relay = Relay::new(config(None));
        let mut buf = STANDARD.decode(negotiation(80, b"")).unwrap();
        buf[5] ^= 1;

        let err = relay.open(Some(&STANDARD.encode(buf))).await.err().unwrap();

        assert!(matches!(
            err,
            Error::Rejected {
                reason: RejectReason::BadCredential
            }
        ));
        assert_eq!(err.status_code(), 403);
    }

    #[tokio::test]
    async fn test_open_dials_target_and_keeps_payload() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let relay = Relay::new(config(None));

        let tunnel = relay.open(Some(&negotiation(port, b"early"))).await.unwrap();

        assert_eq!(tunnel.target(), &Target::new("127.0.0.1", port));
        assert_eq!(tunnel.initial_payload(), b"early");
        listener.accept().await.unwrap();
    }

    #[tokio::test]
    async fn test_open_reports_dial_failure() {
        // Bind then drop to get a port nothing listens on.
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().port()
        };
        let relay = Relay::new(config(None));

        let err = relay.open(Some(&negotiation(port, b""))).await.err().unwrap();

        assert_eq!(err.status_code(), 502);
    }

    #[tokio::test]
    async fn test_initial_payload_written_before_messages() {
        let (server, mut client) = ws_pair().await;
        let (tcp_local, mut tcp_remote) = duplex(1 << 20);
        let (reader, writer) = tokio::io::split(tcp_local);

        client.send(Message::binary(b"second".to_vec())).await.unwrap();

        let session = tokio::spawn(run_session(
            server,
            reader,
            writer,
            CountingEndpoint::default(),
            Bytes::from_static(b"first|"),
            FlowOptions::default(),
        ));

        let mut buf = vec![0u8; 12];
        tokio::time::timeout(Duration::from_secs(1), tcp_remote.read_exact(&mut buf))
            .await
            .expect("target received data")
            .unwrap();
        assert_eq!(buf, b"first|second");

        client.close(None).await.unwrap();
        tokio::time::timeout(Duration::from_secs(1), session)
            .await
            .expect("session ended")
            .unwrap();
    }

    #[tokio::test]
    async fn test_downlink_reaches_client_with_prefix() {
        let (server, mut client) = ws_pair().await;
        let (tcp_local, mut tcp_remote) = duplex(1 << 20);
        let (reader, writer) = tokio::io::split(tcp_local);

        tokio::spawn(run_session(
            server,
            reader,
            writer,
            CountingEndpoint::default(),
            Bytes::new(),
            FlowOptions::default(),
        ));

        tcp_remote.write_all(b"pong").await.unwrap();
        let first = tokio::time::timeout(Duration::from_secs(1), client.next())
            .await
            .expect("client received data")
            .unwrap()
            .unwrap();
        assert_eq!(&first.into_data()[..], b"\x00\x00pong");

        tcp_remote.write_all(b"again").await.unwrap();
        let second = client.next().await.unwrap().unwrap();
        assert_eq!(&second.into_data()[..], b"again");
    }

    #[tokio::test]
    async fn test_target_close_closes_websocket() {
        let (server, mut client) = ws_pair().await;
        let (tcp_local, tcp_remote) = duplex(1 << 20);
        let (reader, writer) = tokio::io::split(tcp_local);
        let tcp = CountingEndpoint::default();

        let session = tokio::spawn(run_session(
            server,
            reader,
            writer,
            tcp.clone(),
            Bytes::new(),
            FlowOptions::default(),
        ));
        drop(tcp_remote);

        let message = tokio::time::timeout(Duration::from_secs(1), client.next())
            .await
            .expect("client notified");
        assert!(matches!(message, Some(Ok(Message::Close(_))) | None));

        tokio::time::timeout(Duration::from_secs(1), session)
            .await
            .expect("session ended")
            .unwrap();
        assert_eq!(tcp.count(), 1);
    }
}
