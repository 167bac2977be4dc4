//! Flow-control options for running sessions.
//!
//! # Example
//!
//! ```ignore
//! use ws_relay::FlowOptions;
//!
//! let options = FlowOptions::new()
//!     .with_backpressure_threshold(64 * 1024)
//!     .with_downlink_batch_size(16);
//!
//! assert!(options.validate().is_ok());
//! ```

// ============================================================================
// Defaults
// ============================================================================

/// Default WebSocket buffered-byte limit before downlink reads pause.
pub const DEFAULT_BACKPRESSURE_THRESHOLD: usize = 32 * 1024;

/// Default chunk size above which an uplink chunk is flushed immediately.
pub const DEFAULT_MERGE_THRESHOLD: usize = 4 * 1024;

/// Default queued byte total at which uplink chunks are flushed immediately.
pub const DEFAULT_MERGE_WINDOW: usize = 16 * 1024;

/// Default number of downlink reads between backpressure checks.
pub const DEFAULT_DOWNLINK_BATCH_SIZE: usize = 8;

/// Default uplink queue chunk limit.
pub const DEFAULT_UPLINK_MAX_QUEUED_CHUNKS: usize = 31;

/// Default uplink queue byte limit.
pub const DEFAULT_UPLINK_MAX_QUEUED_BYTES: usize = 256 * 1024;

/// Default size of each downlink read.
pub const DEFAULT_READ_BUFFER_SIZE: usize = 64 * 1024;

// ============================================================================
// FlowOptions
// ============================================================================

/// Flow-control thresholds applied to every session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlowOptions {
    /// Outbound WebSocket bytes above which downlink reads pause.
    pub backpressure_threshold: usize,

    /// Uplink chunks larger than this skip deferred coalescing.
    pub merge_threshold: usize,

    /// Queued uplink bytes at which coalescing stops and a flush starts.
    pub merge_window: usize,

    /// Downlink reads per backpressure check.
    pub downlink_batch_size: usize,

    /// Queued uplink chunks beyond which the session is terminated.
    pub uplink_max_queued_chunks: usize,

    /// Queued uplink bytes beyond which the session is terminated.
    pub uplink_max_queued_bytes: usize,

    /// Capacity reserved for each downlink read.
    pub read_buffer_size: usize,
}

impl Default for FlowOptions {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Constructors
// ============================================================================

impl FlowOptions {
    /// Creates options with the default thresholds.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self {
            backpressure_threshold: DEFAULT_BACKPRESSURE_THRESHOLD,
            merge_threshold: DEFAULT_MERGE_THRESHOLD,
            merge_window: DEFAULT_MERGE_WINDOW,
            downlink_batch_size: DEFAULT_DOWNLINK_BATCH_SIZE,
            uplink_max_queued_chunks: DEFAULT_UPLINK_MAX_QUEUED_CHUNKS,
            uplink_max_queued_bytes: DEFAULT_UPLINK_MAX_QUEUED_BYTES,
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
        }
    }
}

// ============================================================================
// Builder Methods
// ============================================================================

impl FlowOptions {
    /// Sets the WebSocket backpressure threshold in bytes.
    #[inline]
    #[must_use]
    pub const fn with_backpressure_threshold(mut self, bytes: usize) -> Self {
        self.backpressure_threshold = bytes;
        self
    }

    /// Sets the uplink merge threshold in bytes.
    #[inline]
    #[must_use]
    pub const fn with_merge_threshold(mut self, bytes: usize) -> Self {
        self.merge_threshold = bytes;
        self
    }

    /// Sets the uplink merge window in bytes.
    #[inline]
    #[must_use]
    pub const fn with_merge_window(mut self, bytes: usize) -> Self {
        self.merge_window = bytes;
        self
    }

    /// Sets the number of downlink reads per backpressure check.
    #[inline]
    #[must_use]
    pub const fn with_downlink_batch_size(mut self, reads: usize) -> Self {
        self.downlink_batch_size = reads;
        self
    }

    /// Sets the uplink queue limits.
    #[inline]
    #[must_use]
    pub const fn with_uplink_limits(mut self, max_chunks: usize, max_bytes: usize) -> Self {
        self.uplink_max_queued_chunks = max_chunks;
        self.uplink_max_queued_bytes = max_bytes;
        self
    }

    /// Sets the downlink read size in bytes.
    #[inline]
    #[must_use]
    pub const fn with_read_buffer_size(mut self, bytes: usize) -> Self {
        self.read_buffer_size = bytes;
        self
    }
}

// ============================================================================
// Validation
// ============================================================================

impl FlowOptions {
    /// Validates the options.
    ///
    /// # Errors
    ///
    /// Returns error message if any limit is zero.
    pub fn validate(&self) -> Result<(), String> {
        let limits = [
            ("backpressure_threshold", self.backpressure_threshold),
            ("merge_threshold", self.merge_threshold),
            ("merge_window", self.merge_window),
            ("downlink_batch_size", self.downlink_batch_size),
            ("uplink_max_queued_chunks", self.uplink_max_queued_chunks),
            ("uplink_max_queued_bytes", self.uplink_max_queued_bytes),
            ("read_buffer_size", self.read_buffer_size),
        ];

        match limits.iter().find(|(_, value)| *value == 0) {
            Some((name, _)) => Err(format!("{name} must be greater than zero")),
            None => Ok(()),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
