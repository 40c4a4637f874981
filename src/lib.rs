//! Local development proxy library.
//!
//! Maps development hostnames to local ports or folders, serves them over
//! plain HTTP and TLS with a minted certificate, and tunnels CONNECT traffic.

// Core
pub mod backend;
pub mod certs;
pub mod http;
pub mod net;
pub mod routing;

// Cross-cutting concerns
pub mod config;
pub mod lifecycle;
pub mod observability;

// Driver
pub mod cli;

pub use config::schema::ProxyConfig;
pub use http::Dispatcher;
pub use lifecycle::{RunningProxy, Shutdown};
