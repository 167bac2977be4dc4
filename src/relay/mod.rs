//! Session engine.
//!
//! One session pairs an accepted WebSocket with a dialed TCP connection and
//! moves bytes both ways until either side goes away:
//!
//! - [`UplinkPump`] batches client messages onto the TCP write half
//! - [`DownlinkPump`] forwards TCP reads to the client under backpressure
//! - [`SessionState`] closes both endpoints exactly once
//!
//! [`Relay`] produces the [`Tunnel`] a session runs on.

// ============================================================================
// Submodules
// ============================================================================

/// Target → client pump.
pub mod downlink;

/// Shared session lifetime.
pub mod session;

/// Request → session wiring.
pub mod tunnel;

/// Client → target pump.
pub mod uplink;

// ============================================================================
// Re-exports
// ============================================================================

pub use downlink::DownlinkPump;
pub use session::{Endpoint, SessionState, TcpEndpoint};
pub use tunnel::{Relay, Tunnel, run_session};
pub use uplink::UplinkPump;
