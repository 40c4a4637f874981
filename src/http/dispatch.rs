//! Request dispatch.
//!
//! # Responsibilities
//! - Serve the PAC script before any routing
//! - Normalize the host and resolve it against the route table
//! - Send CONNECT to the tunnel, everything else to the route's backend
//! - Log each request in its route's color
//!
//! # Design Decisions
//! - The URI authority wins over the Host header (CONNECT, absolute-form and
//!   HTTP/2 requests all carry it there)
//! - A miss is a normal 404, not an error
//! - CONNECT on a folder route is ignored with 405

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::response::{IntoResponse, Response};

use crate::backend::Backend;
use crate::config::ConnectPolicy;
use crate::http::pac::{PacFile, PAC_PATH};
use crate::net::tunnel;
use crate::net::TunnelTracker;
use crate::observability::logging::{paint_miss, paint_route};
use crate::routing::{normalize_host, Route, RouteTable};

/// Where CONNECT requests are tunneled.
#[derive(Debug, Clone, Default)]
pub struct ConnectTargets {
    pub policy: ConnectPolicy,
    /// Dialable address of this process's TLS listener, if it runs.
    pub tls_listener: Option<String>,
}

impl ConnectTargets {
    /// Tunnel target for a CONNECT to `requested` (`host:port`) on `route`.
    pub fn resolve(&self, route: &Route, requested: &str) -> Option<String> {
        if self.policy == ConnectPolicy::TlsListener && requested_port(requested) == Some(443) {
            if let Some(tls) = &self.tls_listener {
                return Some(tls.clone());
            }
        }
        route.backend.tunnel_authority().map(str::to_string)
    }
}

/// Single entry point shared by the plaintext and TLS listeners.
#[derive(Debug)]
pub struct Dispatcher {
    routes: RouteTable,
    pac: PacFile,
    connect: ConnectTargets,
    tunnels: TunnelTracker,
}

impl Dispatcher {
    pub fn new(routes: RouteTable, pac: PacFile, connect: ConnectTargets) -> Self {
        Self {
            routes,
            pac,
            connect,
            tunnels: TunnelTracker::new(),
        }
    }

    pub fn routes(&self) -> &RouteTable {
        &self.routes
    }

    pub fn tunnels(&self) -> &TunnelTracker {
        &self.tunnels
    }

    /// Handle one request.
    pub async fn dispatch(&self, request: Request<Body>) -> Response {
        if request.uri().path() == PAC_PATH {
            return self.pac.response();
        }

        let raw_host = request_host(&request).unwrap_or_default();
        let host = normalize_host(&raw_host);

        let Some(route) = self.routes.resolve(&host) else {
            tracing::info!("{} {}", paint_miss(&host), request.uri());
            return (StatusCode::NOT_FOUND, format!("not mapped: {host}")).into_response();
        };

        if request.method() == Method::CONNECT {
            tracing::info!(route = route.index, "{} (received CONNECT)", paint_route(route.index, &host));
            return self.connect(route, &raw_host, request).await;
        }

        let target = request
            .uri()
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/");
        tracing::info!(route = route.index, "{} {}", paint_route(route.index, &host), target);
        route.backend.serve(request).await
    }

    async fn connect(&self, route: &Route, requested: &str, request: Request<Body>) -> Response {
        if let Backend::Files(_) = route.backend {
            tracing::debug!(route = route.index, "CONNECT on a folder route ignored");
            return StatusCode::METHOD_NOT_ALLOWED.into_response();
        }

        match self.connect.resolve(route, requested) {
            Some(target) => tunnel::establish(request, &target, &self.tunnels).await,
            None => StatusCode::METHOD_NOT_ALLOWED.into_response(),
        }
    }
}

/// Authority from the request URI, falling back to the Host header.
fn request_host(request: &Request<Body>) -> Option<String> {
    if let Some(authority) = request.uri().authority() {
        return Some(authority.as_str().to_string());
    }
    request
        .headers()
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

fn requested_port(authority: &str) -> Option<u16> {
    authority.rsplit_once(':').and_then(|(_, port)| port.parse().ok())
}
