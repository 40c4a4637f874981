//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events, route colors)
//!     → http layers (request ID + TraceLayer spans per request)
//! ```
//!
//! # Design Decisions
//! - Human-readable fmt output; this is a developer tool run in a terminal
//! - Request ID flows from the `x-request-id` header into every span

pub mod logging;
