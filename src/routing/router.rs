//! Route lookup.
//!
//! # Responsibilities
//! - Store compiled routes in declaration order
//! - Normalize the request host
//! - Look up the first route whose pattern accepts the host
//!
//! # Design Decisions
//! - Immutable after construction (thread-safe without locks)
//! - O(n) scan in declaration order; first match wins
//! - Explicit `None` on miss rather than a silent default

use crate::backend::{Backend, BackendError, HttpClient};
use crate::config::Entry;
use crate::routing::matcher::HostPattern;

/// A compiled entry: pattern plus the backend serving it.
#[derive(Debug)]
pub struct Route {
    /// Position of the entry in the configuration.
    pub index: usize,
    /// Compiled host pattern.
    pub pattern: HostPattern,
    /// Handler for matched requests.
    pub backend: Backend,
}

/// Ordered, immutable collection of routes.
#[derive(Debug, Default)]
pub struct RouteTable {
    routes: Vec<Route>,
}

impl RouteTable {
    /// Build one backend per entry. Any invalid entry fails the whole table.
    pub fn from_entries(entries: &[Entry], client: &HttpClient) -> Result<Self, BackendError> {
        let mut routes = Vec::with_capacity(entries.len());
        for (index, entry) in entries.iter().enumerate() {
            let pattern = HostPattern::compile(&entry.host).map_err(|e| BackendError::InvalidPattern {
                host: entry.host.clone(),
                reason: e.to_string(),
            })?;
            let backend = Backend::build(entry, client)?;
            routes.push(Route {
                index,
                pattern,
                backend,
            });
        }
        Ok(Self { routes })
    }

    /// Build a table from already constructed routes.
    pub fn from_routes(routes: Vec<(HostPattern, Backend)>) -> Self {
        Self {
            routes: routes
                .into_iter()
                .enumerate()
                .map(|(index, (pattern, backend))| Route {
                    index,
                    pattern,
                    backend,
                })
                .collect(),
        }
    }

    /// First route whose pattern matches the normalized `host`.
    pub fn resolve(&self, host: &str) -> Option<&Route> {
        self.routes.iter().find(|route| route.pattern.matches(host))
    }

    /// Configured patterns, in declaration order.
    pub fn hostnames(&self) -> Vec<String> {
        self.routes
            .iter()
            .map(|route| route.pattern.source().to_string())
            .collect()
    }

    /// Iterate over routes in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = &Route> {
        self.routes.iter()
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

/// Normalize a raw Host value for matching.
///
/// Strips a leading `//`, a trailing `:<port>`, and lowercases. Applying it
/// twice yields the same result.
pub fn normalize_host(raw: &str) -> String {
    let host = raw.trim();
    let host = host.strip_prefix("//").unwrap_or(host);
    let host = match host.rsplit_once(':') {
        Some((name, port)) if !port.is_empty() && port.bytes().all(|b| b.is_ascii_digit()) => name,
        _ => host,
    };
    host.to_ascii_lowercase()
}
