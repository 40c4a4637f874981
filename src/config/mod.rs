//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config.json (first hit across search paths)
//!     → loader.rs (locate, parse & deserialize, write back)
//!     → validation.rs (semantic checks, shadowed-route lints)
//!     → ProxyConfig (validated, immutable)
//!     → consumed once at startup to build the route table
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; CLI edits require a restart
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{ConfigError, ConfigManager};
pub use schema::{ConnectPolicy, Entry, ProxyConfig};
