//! Outbound WebSocket writer with buffered-byte accounting.
//!
//! [`WsOutbound`] owns the sending half of a WebSocket through a spawned
//! writer task. Sends are queued without blocking and counted in
//! [`WsOutbound::buffered_amount`] until the sink has flushed them, which
//! gives the downlink the backpressure signal it paces itself on.
//!
//! # Writer Task
//!
//! ```text
//! send() ──► buffered += len ──► queue ──► sink.send() ──► buffered -= len
//!                                                      └──► wake waiters
//! close() ─────────────────────► queue ──► sink.close()   (after queued data)
//! ```
//!
//! A close gets [`CLOSE_TIMEOUT`] to flush what is queued. If the peer has
//! stopped reading by then, the writer drops the sink, which releases the
//! underlying socket.

// ============================================================================
// Imports
// ============================================================================

use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use bytes::Bytes;
use futures_util::{Sink, SinkExt};
use tokio::sync::{Notify, mpsc};
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::relay::{Endpoint, SessionState};

// ============================================================================
// Constants
// ============================================================================

/// How long a close may spend flushing queued messages and the close frame.
pub const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

// ============================================================================
// Types
// ============================================================================

/// Commands for the writer task.
enum Outbound {
    /// Send one binary message.
    Data(Bytes),
    /// Flush queued messages, then send a close frame.
    Close,
}

/// State shared between handles and the writer task.
#[derive(Default)]
struct Shared {
    /// Bytes queued but not yet flushed.
    buffered: AtomicUsize,
    /// Set once the writer task has exited.
    closed: AtomicBool,
    /// Woken whenever `buffered` drops or the writer exits.
    drained: Notify,
    /// Signalled once a close has been requested.
    closing: Notify,
}

// ============================================================================
// WsOutbound
// ============================================================================

/// Sending side of a WebSocket endpoint.
///
/// Cheap to clone; all clones feed the same writer task.
#[derive(Clone)]
pub struct WsOutbound {
    /// Queue to the writer task.
    commands: mpsc::UnboundedSender<Outbound>,
    /// Counters shared with the writer task.
    shared: Arc<Shared>,
}

impl WsOutbound {
    /// Spawns the writer task over `sink`.
    #[must_use]
    pub fn spawn<S>(sink: S) -> Self
    where
        S: Sink<Message, Error = WsError> + Unpin + Send + 'static,
    {
        let (commands, command_rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared::default());

        tokio::spawn(Self::run_writer(sink, command_rx, Arc::clone(&shared)));

        Self { commands, shared }
    }

    /// Queues `data` as one binary message.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectionClosed`] if the writer task has exited.
    pub fn send(&self, data: Bytes) -> Result<()> {
        let len = data.len();
        self.shared.buffered.fetch_add(len, Ordering::AcqRel);

        if self.commands.send(Outbound::Data(data)).is_err() {
            self.shared.buffered.fetch_sub(len, Ordering::AcqRel);
            return Err(Error::ConnectionClosed);
        }
        Ok(())
    }

    /// Returns the number of queued bytes not yet flushed to the peer.
    #[inline]
    #[must_use]
    pub fn buffered_amount(&self) -> usize {
        self.shared.buffered.load(Ordering::Acquire)
    }

    /// Returns `true` once the writer task has exited.
    #[inline]
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }

    /// Resolves once the writer task has exited and released the sink.
    pub async fn closed(&self) {
        loop {
            let drained = self.shared.drained.notified();
            tokio::pin!(drained);
            drained.as_mut().enable();

            if self.is_closed() {
                return;
            }
            drained.await;
        }
    }

    /// Waits until the buffered amount is at or below `threshold`.
    ///
    /// Returns immediately if it already is. Otherwise suspends until the
    /// amount drops strictly below `threshold`, re-checking after every
    /// flush. Returns `false` if the session dies or the writer exits while
    /// waiting.
    pub async fn wait_for_capacity(&self, threshold: usize, session: &SessionState) -> bool {
        if self.buffered_amount() <= threshold {
            return !session.is_dead();
        }

        loop {
            let drained = self.shared.drained.notified();
            tokio::pin!(drained);
            drained.as_mut().enable();

            if session.is_dead() || self.is_closed() {
                return false;
            }
            if self.buffered_amount() < threshold {
                return true;
            }

            tokio::select! {
                () = drained => {}
                () = session.terminated() => return false,
            }
        }
    }

    /// Writer task: drains the queue, bounded by [`CLOSE_TIMEOUT`] once a
    /// close is requested.
    async fn run_writer<S>(
        mut sink: S,
        mut command_rx: mpsc::UnboundedReceiver<Outbound>,
        shared: Arc<Shared>,
    ) where
        S: Sink<Message, Error = WsError> + Unpin + Send + 'static,
    {
        {
            let drain = Self::drain_commands(&mut sink, &mut command_rx, &shared);
            let deadline = async {
                shared.closing.notified().await;
                tokio::time::sleep(CLOSE_TIMEOUT).await;
            };

            tokio::select! {
                () = drain => {}
                () = deadline => debug!("WebSocket close timed out, dropping connection"),
            }
        }

        drop(sink);
        drop(command_rx);
        shared.closed.store(true, Ordering::Release);
        shared.drained.notify_waiters();
    }

    /// Sends queued messages until a close command or a send failure.
    async fn drain_commands<S>(
        sink: &mut S,
        command_rx: &mut mpsc::UnboundedReceiver<Outbound>,
        shared: &Shared,
    ) where
        S: Sink<Message, Error = WsError> + Unpin,
    {
        while let Some(command) = command_rx.recv().await {
            match command {
                Outbound::Data(data) => {
                    let len = data.len();
                    let result = sink.send(Message::Binary(data)).await;

                    shared.buffered.fetch_sub(len, Ordering::AcqRel);
                    shared.drained.notify_waiters();

                    if let Err(e) = result {
                        debug!(error = %e, "WebSocket send failed");
                        break;
                    }
                    trace!(bytes = len, "WebSocket message flushed");
                }

                Outbound::Close => {
                    if let Err(e) = sink.close().await {
                        trace!(error = %e, "WebSocket close failed");
                    }
                    break;
                }
            }
        }
    }
}

impl Endpoint for WsOutbound {
    fn close(&self) -> io::Result<()> {
        self.shared.closing.notify_one();
        self.commands
            .send(Outbound::Close)
            .map_err(|_| io::Error::new(io::ErrorKind::NotConnected, "WebSocket writer exited"))
    }
}

// ============================================================================
// Tests
// ============================================================================
