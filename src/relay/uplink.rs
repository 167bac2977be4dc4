//! Client → target pump.
//!
//! Inbound WebSocket messages are [`push`](UplinkPump::push)ed onto a
//! bounded queue and flushed to the TCP write half in batches. At most one
//! write is in flight per session: the writer is moved out of the queue
//! while a batch is being written and moved back when it completes.
//!
//! # Flush Triggers
//!
//! | Condition | Flush |
//! |-----------|-------|
//! | chunk > merge threshold | immediately |
//! | queued bytes ≥ merge window | immediately |
//! | otherwise | deferred to a later scheduler turn |
//!
//! Deferring lets chunks arriving in the same burst coalesce into a single
//! write.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use parking_lot::Mutex;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{debug, trace};

use crate::config::FlowOptions;

use super::session::SessionState;

// ============================================================================
// Types
// ============================================================================

/// Mutable pump state, guarded by one lock.
struct UplinkQueue<W> {
    /// Chunks awaiting a flush, in arrival order.
    chunks: Vec<Bytes>,
    /// Total length of `chunks`.
    bytes: usize,
    /// `true` while a batch is being written.
    draining: bool,
    /// `true` while a deferred drain task is outstanding.
    drain_scheduled: bool,
    /// TCP write half; `None` while a batch is being written.
    writer: Option<W>,
}

// ============================================================================
// UplinkPump
// ============================================================================

/// Batches client chunks onto the target connection.
pub struct UplinkPump<W> {
    /// Owning session.
    session: Arc<SessionState>,
    /// Queue and writer.
    queue: Mutex<UplinkQueue<W>>,
    /// Merge and overload thresholds.
    options: FlowOptions,
}

impl<W> UplinkPump<W>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    /// Creates a pump writing to `writer`.
    #[must_use]
    pub fn new(session: Arc<SessionState>, writer: W, options: FlowOptions) -> Arc<Self> {
        Arc::new(Self {
            session,
            queue: Mutex::new(UplinkQueue {
                chunks: Vec::new(),
                bytes: 0,
                draining: false,
                drain_scheduled: false,
                writer: Some(writer),
            }),
            options,
        })
    }

    /// Returns the number of chunks waiting to be flushed.
    #[inline]
    #[must_use]
    pub fn queued_chunks(&self) -> usize {
        self.queue.lock().chunks.len()
    }

    /// Returns the number of bytes waiting to be flushed.
    #[inline]
    #[must_use]
    pub fn queued_bytes(&self) -> usize {
        self.queue.lock().bytes
    }

    /// Returns `true` while a batch write is in flight.
    #[inline]
    #[must_use]
    pub fn is_draining(&self) -> bool {
        self.queue.lock().draining
    }

    /// Enqueues a chunk for the target.
    ///
    /// Dropped silently if the session is dead. Terminates the session if
    /// enqueuing would exceed either queue limit.
    pub fn push(self: &Arc<Self>, chunk: Bytes) {
        if self.session.is_dead() {
            return;
        }

        let size = chunk.len();
        let mut queue = self.queue.lock();

        if queue.chunks.len() + 1 > self.options.uplink_max_queued_chunks
            || queue.bytes + size > self.options.uplink_max_queued_bytes
        {
            let (chunks, bytes) = (queue.chunks.len(), queue.bytes);
            drop(queue);
            debug!(chunks, bytes, incoming = size, "Uplink queue overloaded");
            self.session.terminate();
            return;
        }

        queue.chunks.push(chunk);
        queue.bytes += size;

        if queue.draining {
            return;
        }

        if size > self.options.merge_threshold || queue.bytes >= self.options.merge_window {
            drop(queue);
            self.drain();
        } else if !queue.drain_scheduled {
            queue.drain_scheduled = true;
            drop(queue);

            let pump = Arc::clone(self);
            tokio::spawn(async move {
                pump.queue.lock().drain_scheduled = false;
                pump.drain();
            });
        }
    }

    /// Starts writing everything queued as one batch.
    ///
    /// No-op while a batch is in flight, once the session is dead, or when
    /// the queue is empty.
    pub fn drain(self: &Arc<Self>) {
        let (writer, payload) = {
            let mut queue = self.queue.lock();
            if queue.draining || self.session.is_dead() || queue.chunks.is_empty() {
                return;
            }
            let Some(writer) = queue.writer.take() else {
                return;
            };

            queue.draining = true;
            let batch = std::mem::take(&mut queue.chunks);
            let total = std::mem::replace(&mut queue.bytes, 0);
            (writer, coalesce(batch, total))
        };

        tokio::spawn(Arc::clone(self).write_batch(writer, payload));
    }

    /// Writes one batch, then keeps draining while a backlog remains.
    async fn write_batch(self: Arc<Self>, mut writer: W, payload: Bytes) {
        if self.session.is_dead() {
            return;
        }

        let len = payload.len();
        let result = async {
            writer.write_all(&payload).await?;
            writer.flush().await
        }
        .await;

        if let Err(e) = result {
            debug!(error = %e, bytes = len, "Uplink write failed");
            self.session.terminate();
            return;
        }
        trace!(bytes = len, "Uplink batch written");

        let backlog = {
            let mut queue = self.queue.lock();
            queue.writer = Some(writer);
            queue.draining = false;
            !queue.chunks.is_empty()
        };

        if backlog && !self.session.is_dead() {
            self.drain();
        }
    }
}

/// Joins a batch into one buffer; a single chunk is passed through as is.
fn coalesce(mut batch: Vec<Bytes>, total: usize) -> Bytes {
    if batch.len() == 1 {
        return batch.pop().unwrap_or_default();
    }

    let mut payload = BytesMut::with_capacity(total);
    for chunk in &batch {
        payload.extend_from_slice(chunk);
    }
    payload.freeze()
}

// ============================================================================
// Tests
// ============================================================================
