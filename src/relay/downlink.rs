//! Target → client pump.
//!
//! Reads the TCP read half and forwards each chunk as one binary WebSocket
//! message. The very first chunk of a session carries the two-byte
//! [`RESPONSE_PREFIX`]; nothing after it does.
//!
//! Reads happen in batches of up to `downlink_batch_size`. Before each
//! batch the pump waits for the WebSocket's buffered amount to fall to the
//! backpressure threshold, and a batch ends early as soon as a send pushes
//! the buffered amount over it. The pump yields to the scheduler between
//! batches.
//!
//! Reads land in one buffer owned by the pump. A read that fills less than
//! half of it is copied out so the buffer can be reused; larger reads are
//! split off and sent without copying.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use bytes::{BufMut, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{debug, trace};

use crate::config::FlowOptions;
use crate::error::Result;
use crate::protocol::RESPONSE_PREFIX;
use crate::transport::WsOutbound;

use super::session::SessionState;

// ============================================================================
// DownlinkPump
// ============================================================================

/// Forwards target bytes to the client for the lifetime of a session.
///
/// The pump owns the TCP read half; it is released when [`run`](Self::run)
/// returns, whichever way the loop exits.
pub struct DownlinkPump<R> {
    /// Owning session.
    session: Arc<SessionState>,
    /// Client side.
    ws: WsOutbound,
    /// TCP read half.
    reader: R,
    /// Read buffer, reused across reads.
    buffer: BytesMut,
    /// `true` until the first chunk has been sent.
    first_chunk_pending: bool,
    /// Backpressure and batching thresholds.
    options: FlowOptions,
}

impl<R> DownlinkPump<R>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    /// Creates a pump reading from `reader`.
    #[must_use]
    pub fn new(
        session: Arc<SessionState>,
        ws: WsOutbound,
        reader: R,
        options: FlowOptions,
    ) -> Self {
        Self {
            session,
            ws,
            reader,
            buffer: BytesMut::new(),
            first_chunk_pending: true,
            options,
        }
    }

    /// Runs until the session dies, the target closes, or an error occurs.
    ///
    /// Always leaves the session terminated.
    pub async fn run(mut self) {
        if let Err(e) = self.pump().await {
            debug!(error = %e, "Downlink failed");
        }
        self.session.terminate();
    }

    /// Outer backpressure loop around batched reads.
    async fn pump(&mut self) -> Result<()> {
        let threshold = self.options.backpressure_threshold;

        while !self.session.is_dead() {
            if !self.ws.wait_for_capacity(threshold, &self.session).await {
                return Ok(());
            }

            for _ in 0..self.options.downlink_batch_size {
                let Some(frame) = self.read_frame().await? else {
                    return Ok(());
                };

                trace!(bytes = frame.len(), "Downlink chunk");
                self.ws.send(frame)?;

                if self.ws.buffered_amount() > threshold {
                    break;
                }
            }

            tokio::task::yield_now().await;
        }

        Ok(())
    }

    /// Reads the next chunk, prefixed if it is the session's first.
    ///
    /// Returns `None` at end of stream or once the session is dead.
    async fn read_frame(&mut self) -> Result<Option<Bytes>> {
        self.buffer.clear();
        self.buffer.reserve(self.options.read_buffer_size + RESPONSE_PREFIX.len());
        if self.first_chunk_pending {
            self.buffer.put_slice(&RESPONSE_PREFIX);
        }

        let read = tokio::select! {
            biased;
            () = self.session.terminated() => return Ok(None),
            read = self.reader.read_buf(&mut self.buffer) => read?,
        };

        if read == 0 || self.session.is_dead() {
            return Ok(None);
        }

        self.first_chunk_pending = false;
        Ok(Some(self.take_frame()))
    }

    /// Moves the filled part of the read buffer into a frame.
    ///
    /// A frame never holds on to more than twice its length.
    fn take_frame(&mut self) -> Bytes {
        if self.buffer.len() * 2 < self.buffer.capacity() {
            Bytes::copy_from_slice(&self.buffer)
        } else {
            self.buffer.split().freeze()
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
