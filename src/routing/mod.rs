//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming Request (authority or Host header)
//!     → router.rs (normalize host, ordered lookup)
//!     → matcher.rs (evaluate compiled host pattern)
//!     → Return: matched Route or None
//!
//! Route Compilation (at startup):
//!     Entry[]
//!     → Compile host patterns
//!     → Build one backend per entry
//!     → Freeze as immutable RouteTable
//! ```
//!
//! # Design Decisions
//! - Routes compiled at startup, immutable at runtime
//! - Deterministic: same host always matches same route
//! - First match wins (declaration order)

pub mod matcher;
pub mod router;

pub use matcher::{HostPattern, PatternError};
pub use router::{normalize_host, Route, RouteTable};
