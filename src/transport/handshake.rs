//! HTTP upgrade request parsing and responses.
//!
//! The relay answers the upgrade itself instead of handing the socket to a
//! WebSocket acceptor: the target has to be dialed before `101` is sent so
//! that a failed dial can still be reported as `502`.
//!
//! # Flow
//!
//! ```text
//! read head (≤ 8 KiB) ─► UpgradeRequest ─┬─► write_rejection(status)
//!                                        └─► write_switching_protocols(key, protocol)
//!                                             └─► leftover bytes handed to the WebSocket
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::collections::HashMap;

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_tungstenite::tungstenite::handshake::derive_accept_key;

use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// Largest request head accepted, terminator included.
pub const MAX_REQUEST_HEAD: usize = 8 * 1024;

/// End of an HTTP head.
const HEAD_TERMINATOR: &[u8] = b"\r\n\r\n";

/// Header carrying the tunnel request.
const NEGOTIATION_HEADER: &str = "sec-websocket-protocol";

// ============================================================================
// UpgradeRequest
// ============================================================================

/// Parsed HTTP request head.
#[derive(Debug)]
pub struct UpgradeRequest {
    /// Request method.
    method: String,
    /// Request target.
    path: String,
    /// Header values keyed by lowercased name. Later duplicates are dropped.
    headers: HashMap<String, String>,
    /// Bytes read past the end of the head.
    leftover: Vec<u8>,
}

impl UpgradeRequest {
    /// Reads and parses a request head from `stream`.
    ///
    /// # Errors
    ///
    /// - [`Error::Handshake`] if the head is malformed, exceeds
    ///   [`MAX_REQUEST_HEAD`], or the peer closes before sending it
    /// - [`Error::Io`] if reading fails
    pub async fn read<S>(stream: &mut S) -> Result<Self>
    where
        S: AsyncRead + Unpin,
    {
        let mut buf = BytesMut::with_capacity(1024);

        loop {
            if let Some(end) = find_terminator(&buf) {
                let head_len = end + HEAD_TERMINATOR.len();
                let mut request = Self::parse(&buf[..head_len])?;
                request.leftover = buf[head_len..].to_vec();
                return Ok(request);
            }

            if buf.len() >= MAX_REQUEST_HEAD {
                return Err(Error::handshake("request head too large"));
            }

            if stream.read_buf(&mut buf).await? == 0 {
                return Err(Error::handshake("connection closed before request head"));
            }
        }
    }

    /// Parses a complete request head.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Handshake`] if the request line or a header line is
    /// malformed.
    pub fn parse(head: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(head)
            .map_err(|_| Error::handshake("request head is not valid UTF-8"))?;

        let mut lines = text.split("\r\n");

        let request_line = lines
            .next()
            .filter(|line| !line.is_empty())
            .ok_or_else(|| Error::handshake("missing request line"))?;

        let mut parts = request_line.split(' ');
        let (Some(method), Some(path), Some(version), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(Error::handshake(format!("invalid request line: {request_line}")));
        };
        if !version.starts_with("HTTP/") {
            return Err(Error::handshake(format!("invalid HTTP version: {version}")));
        }

        let mut headers = HashMap::new();
        for line in lines.take_while(|line| !line.is_empty()) {
            let Some((name, value)) = line.split_once(':') else {
                return Err(Error::handshake(format!("invalid header line: {line}")));
            };
            headers
                .entry(name.trim().to_ascii_lowercase())
                .or_insert_with(|| value.trim().to_string());
        }

        Ok(Self {
            method: method.to_string(),
            path: path.to_string(),
            headers,
            leftover: Vec::new(),
        })
    }

    /// Returns the request method.
    #[inline]
    #[must_use]
    pub fn method(&self) -> &str {
        &self.method
    }

    /// Returns the request target.
    #[inline]
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Returns a header value by case-insensitive name.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// Returns `true` if the `Upgrade` header names `websocket`.
    #[must_use]
    pub fn is_websocket_upgrade(&self) -> bool {
        self.header("upgrade").is_some_and(|value| {
            value
                .split(',')
                .any(|token| token.trim().eq_ignore_ascii_case("websocket"))
        })
    }

    /// Returns the `Sec-WebSocket-Key` header, if present and non-empty.
    #[must_use]
    pub fn websocket_key(&self) -> Option<&str> {
        self.header("sec-websocket-key").filter(|key| !key.is_empty())
    }

    /// Returns the negotiation field (`Sec-WebSocket-Protocol`).
    #[must_use]
    pub fn negotiation(&self) -> Option<&str> {
        self.header(NEGOTIATION_HEADER)
    }

    /// Consumes the request, returning bytes read past the head.
    #[must_use]
    pub fn into_leftover(self) -> Vec<u8> {
        self.leftover
    }
}

/// Returns the offset of the head terminator, if present.
fn find_terminator(buf: &[u8]) -> Option<usize> {
    buf.windows(HEAD_TERMINATOR.len())
        .position(|window| window == HEAD_TERMINATOR)
}

// ============================================================================
// Responses
// ============================================================================

/// Writes a bodiless rejection with `status`.
///
/// `426` additionally advertises `Upgrade: websocket`.
///
/// # Errors
///
/// Returns an IO error if writing fails.
pub async fn write_rejection<S>(stream: &mut S, status: u16) -> Result<()>
where
    S: AsyncWrite + Unpin,
{
    let mut response = format!("HTTP/1.1 {status} {}\r\n", reason_phrase(status));
    if status == 426 {
        response.push_str("Upgrade: websocket\r\n");
    }
    response.push_str("Content-Length: 0\r\nConnection: close\r\n\r\n");

    stream.write_all(response.as_bytes()).await?;
    stream.flush().await?;
    Ok(())
}

/// Writes `101 Switching Protocols` for `key`, echoing `protocol`.
///
/// # Errors
///
/// Returns an IO error if writing fails.
pub async fn write_switching_protocols<S>(
    stream: &mut S,
    key: &str,
    protocol: Option<&str>,
) -> Result<()>
where
    S: AsyncWrite + Unpin,
{
    let accept = derive_accept_key(key.as_bytes());

    let mut response = format!(
        "HTTP/1.1 101 Switching Protocols\r\n\
         Upgrade: websocket\r\n\
         Connection: Upgrade\r\n\
         Sec-WebSocket-Accept: {accept}\r\n"
    );
    if let Some(protocol) = protocol {
        response.push_str(&format!("Sec-WebSocket-Protocol: {protocol}\r\n"));
    }
    response.push_str("\r\n");

    stream.write_all(response.as_bytes()).await?;
    stream.flush().await?;
    Ok(())
}

/// Reason phrase for the statuses the relay emits.
const fn reason_phrase(status: u16) -> &'static str {
    match status {
        101 => "Switching Protocols",
        400 => "Bad Request",
        403 => "Forbidden",
        426 => "Upgrade Required",
        502 => "Bad Gateway",
        _ => "Internal Server Error",
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use tokio::io::duplex;

    const UPGRADE: &[u8] = b"GET /tunnel HTTP/1.1\r\n\
        Host: relay.test\r\n\
        Upgrade: WebSocket\r\n\
        Connection: Upgrade\r\n\
        Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n\
        Sec-WebSocket-Protocol: AAAA\r\n\
        Sec-WebSocket-Version: 13\r\n\
        \r\n";

    #[test]
    fn test_parse_upgrade_request() {
        let request = UpgradeRequest::parse(UPGRADE).unwrap();

        assert_eq!(request.method(), "GET");
        assert_eq!(request.path(), "/tunnel");
        assert!(request.is_websocket_upgrade());
        assert_eq!(request.websocket_key(), Some("dGhlIHNhbXBsZSBub25jZQ=="));
        assert_eq!(request.negotiation(), Some("AAAA"));
        assert_eq!(request.header("HOST"), Some("relay.test"));
    }

    #[test]
    fn test_plain_request_is_not_upgrade() {
        let request = UpgradeRequest::parse(b"GET / HTTP/1.1\r\nHost: a\r\n\r\n").unwrap();
        assert!(!request.is_websocket_upgrade());
        assert_eq!(request.websocket_key(), None);
        assert_eq!(request.negotiation(), None);
    }

    #[test]
    fn test_upgrade_token_list() {
        let request =
            UpgradeRequest::parse(b"GET / HTTP/1.1\r\nUpgrade: h2c, websocket\r\n\r\n").unwrap();
        assert!(request.is_websocket_upgrade());
    }

    #[test]
    fn test_empty_key_counts_as_missing() {
        let request = UpgradeRequest::parse(
            b"GET / HTTP/1.1\r\nUpgrade: websocket\r\nSec-WebSocket-Key:\r\n\r\n",
        )
        .unwrap();
        assert_eq!(request.websocket_key(), None);
    }

    #[test]
    fn test_malformed_request_line() {
        let err = UpgradeRequest::parse(b"GET\r\n\r\n").unwrap_err();
        assert!(matches!(err, Error::Handshake { .. }));

        let err = UpgradeRequest::parse(b"GET / SPDY/3\r\n\r\n").unwrap_err();
        assert!(matches!(err, Error::Handshake { .. }));
    }

    #[test]
    fn test_malformed_header_line() {
        let err = UpgradeRequest::parse(b"GET / HTTP/1.1\r\nno colon here\r\n\r\n").unwrap_err();
        assert!(matches!(err, Error::Handshake { .. }));
    }

    #[tokio::test]
    async fn test_read_keeps_leftover_bytes() {
        let mut input = UPGRADE.to_vec();
        input.extend_from_slice(b"\x82\x00");

        let mut reader = tokio_test::io::Builder::new()
            .read(&input[..10])
            .read(&input[10..])
            .build();
        let request = UpgradeRequest::read(&mut reader).await.unwrap();

        assert_eq!(request.negotiation(), Some("AAAA"));
        assert_eq!(request.into_leftover(), b"\x82\x00");
    }

    #[tokio::test]
    async fn test_read_rejects_oversized_head() {
        let mut input = b"GET / HTTP/1.1\r\nX-Pad: ".to_vec();
        input.resize(MAX_REQUEST_HEAD, b'a');

        let mut reader = tokio_test::io::Builder::new().read(&input).build();
        let err = UpgradeRequest::read(&mut reader).await.unwrap_err();

        assert!(matches!(err, Error::Handshake { .. }));
    }

    #[tokio::test]
    async fn test_read_rejects_early_close() {
        let mut reader = tokio_test::io::Builder::new().read(b"GET / HTTP/1.1\r\n").build();
        let err = UpgradeRequest::read(&mut reader).await.unwrap_err();

        assert!(matches!(err, Error::Handshake { .. }));
    }

    #[tokio::test]
    async fn test_rejection_format() {
        let (mut server, mut client) = duplex(1024);

        write_rejection(&mut server, 426).await.unwrap();
        drop(server);

        let mut response = String::new();
        client.read_to_string(&mut response).await.unwrap();

        assert!(response.starts_with("HTTP/1.1 426 Upgrade Required\r\n"));
        assert!(response.contains("Upgrade: websocket\r\n"));
        assert!(response.contains("Content-Length: 0\r\n"));
        assert!(response.ends_with("Connection: close\r\n\r\n"));
    }

    #[tokio::test]
    async fn test_forbidden_has_no_upgrade_header() {
        let (mut server, mut client) = duplex(1024);

        write_rejection(&mut server, 403).await.unwrap();
        drop(server);

        let mut response = String::new();
        client.read_to_string(&mut response).await.unwrap();

        assert!(response.starts_with("HTTP/1.1 403 Forbidden\r\n"));
        assert!(!response.contains("Upgrade:"));
    }

    #[tokio::test]
    async fn test_switching_protocols_format() {
        let (mut server, mut client) = duplex(1024);

        write_switching_protocols(&mut server, "dGhlIHNhbXBsZSBub25jZQ==", Some("AAAA"))
            .await
            .unwrap();
        drop(server);

        let mut response = String::new();
        client.read_to_string(&mut response).await.unwrap();

        assert!(response.starts_with("HTTP/1.1 101 Switching Protocols\r\n"));
        assert!(response.contains("Sec-WebSocket-Accept: s3pPLMBiTxaQ9kYGzzhZRbK+xOo=\r\n"));
        assert!(response.contains("Sec-WebSocket-Protocol: AAAA\r\n"));
        assert!(response.ends_with("\r\n\r\n"));
    }
}
