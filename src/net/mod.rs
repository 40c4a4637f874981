//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! CONNECT request (from the dispatcher)
//!     → tunnel.rs (dial, take over the connection, relay bytes)
//!     → session.rs (tunnel IDs, live tunnel count for shutdown)
//! ```
//!
//! # Design Decisions
//! - Listeners themselves are owned by axum / axum-server
//! - Tunnels run detached from the HTTP connection, so they are tracked
//!   separately to let shutdown wait for them

pub mod session;
pub mod tunnel;

pub use session::{TunnelId, TunnelTracker};
pub use tunnel::{Tunnel, TunnelError, DIAL_TIMEOUT};
