//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP/TLS connection
//!     → server.rs (axum / axum-server, request ID, trace span)
//!     → dispatch.rs (PAC, host lookup, CONNECT vs. backend)
//!     → backend (reverse proxy | static files) or net::tunnel
//! ```

pub mod dispatch;
pub mod pac;
pub mod server;

pub use dispatch::{ConnectTargets, Dispatcher};
pub use pac::{PacFile, PAC_PATH};
pub use server::build_router;
