//! Joint lifetime of one WebSocket endpoint and one TCP endpoint.
//!
//! A [`SessionState`] is shared by every task working on a session. Its
//! dead flag doubles as the cooperative cancellation token: each
//! suspension point re-checks it and stops once it is set.

// ============================================================================
// Imports
// ============================================================================

use std::io;
use std::net::Shutdown;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::Notify;
use tracing::debug;

// ============================================================================
// Endpoint
// ============================================================================

/// Something a session can close from any task.
pub trait Endpoint: Send + Sync {
    /// Closes the endpoint. Errors are reported but callers may ignore them.
    fn close(&self) -> io::Result<()>;
}

// ============================================================================
// TcpEndpoint
// ============================================================================

/// Shutdown handle for a TCP connection whose halves are owned elsewhere.
#[derive(Debug)]
pub struct TcpEndpoint {
    /// Duplicate of the connection's socket.
    socket: std::net::TcpStream,
}

impl TcpEndpoint {
    /// Splits `stream` into owned halves plus a handle that can shut the
    /// connection down while the halves are busy in other tasks.
    ///
    /// Shutting down wakes a pending read with end-of-stream.
    ///
    /// # Errors
    ///
    /// Returns an IO error if the socket cannot be duplicated.
    pub fn split(stream: TcpStream) -> io::Result<(OwnedReadHalf, OwnedWriteHalf, Self)> {
        let std_stream = stream.into_std()?;
        let socket = std_stream.try_clone()?;
        let (read_half, write_half) = TcpStream::from_std(std_stream)?.into_split();
        Ok((read_half, write_half, Self { socket }))
    }
}

impl Endpoint for TcpEndpoint {
    fn close(&self) -> io::Result<()> {
        self.socket.shutdown(Shutdown::Both)
    }
}

// ============================================================================
// SessionState
// ============================================================================

/// Ownership record for a live session.
///
/// Once [`terminate`](Self::terminate) runs, both endpoints have been closed
/// exactly once, no matter how many triggers fire.
pub struct SessionState {
    /// Set once; never cleared.
    dead: AtomicBool,
    /// Wakes every task parked in [`terminated`](Self::terminated).
    shutdown: Notify,
    /// Client side.
    ws: Box<dyn Endpoint>,
    /// Target side.
    tcp: Box<dyn Endpoint>,
}

impl SessionState {
    /// Creates a live session owning both endpoints.
    #[must_use]
    pub fn new(ws: impl Endpoint + 'static, tcp: impl Endpoint + 'static) -> Arc<Self> {
        Arc::new(Self {
            dead: AtomicBool::new(false),
            shutdown: Notify::new(),
            ws: Box::new(ws),
            tcp: Box::new(tcp),
        })
    }

    /// Returns `true` once the session has been terminated.
    #[inline]
    #[must_use]
    pub fn is_dead(&self) -> bool {
        self.dead.load(Ordering::Acquire)
    }

    /// Marks the session dead and closes both endpoints.
    ///
    /// Idempotent: only the first call closes anything. Close errors are
    /// discarded.
    pub fn terminate(&self) {
        if self.dead.swap(true, Ordering::AcqRel) {
            return;
        }

        if let Err(e) = self.ws.close() {
            debug!(error = %e, "WebSocket close failed");
        }
        if let Err(e) = self.tcp.close() {
            debug!(error = %e, "TCP close failed");
        }

        self.shutdown.notify_waiters();
        debug!("Session terminated");
    }

    /// Resolves once the session is dead.
    pub async fn terminated(&self) {
        let notified = self.shutdown.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();

        if self.is_dead() {
            return;
        }
        notified.await;
    }
}

// ============================================================================
// Tests
// ============================================================================
