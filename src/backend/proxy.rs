//! Reverse proxy to a single upstream host.
//!
//! # Responsibilities
//! - Rewrite the request URI onto the target (path joined, query merged)
//! - Strip hop-by-hop headers in both directions
//! - Append `X-Forwarded-For`
//! - Stream request and response bodies through untouched
//!
//! # Design Decisions
//! - The inbound Host header is preserved, so upstreams see the dev hostname
//! - Upstream failures map to 502; there are no retries

use std::net::SocketAddr;

use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::header::{self, HeaderMap, HeaderName, HeaderValue};
use axum::http::uri::{PathAndQuery, Uri};
use axum::http::{Request, StatusCode, Version};
use axum::response::{IntoResponse, Response};
use url::Url;

use crate::backend::{BackendError, HttpClient};

const X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");

/// Headers that apply to a single connection and must not be forwarded.
const HOP_BY_HOP_HEADERS: &[&str] = &[
    "connection",
    "proxy-connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Forwards requests to one upstream base URL.
#[derive(Clone)]
pub struct ReverseProxy {
    target: Url,
    authority: String,
    client: HttpClient,
}

impl std::fmt::Debug for ReverseProxy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReverseProxy")
            .field("target", &self.target.as_str())
            .finish()
    }
}

impl ReverseProxy {
    /// Parse `dest` (scheme optional, `http://` assumed) into a proxy.
    pub fn new(host: &str, dest: &str, client: HttpClient) -> Result<Self, BackendError> {
        let target = parse_destination(dest).map_err(|source| BackendError::InvalidDestination {
            host: host.to_string(),
            dest: dest.to_string(),
            source,
        })?;

        match target.scheme() {
            "http" | "https" => {}
            other => {
                return Err(BackendError::UnsupportedScheme {
                    host: host.to_string(),
                    scheme: other.to_string(),
                })
            }
        }

        let name = target.host_str().ok_or_else(|| BackendError::MissingHost {
            host: host.to_string(),
            dest: dest.to_string(),
        })?;
        let port = target.port_or_known_default().unwrap_or(80);
        let authority = format!("{name}:{port}");

        Ok(Self {
            target,
            authority,
            client,
        })
    }

    /// The upstream base URL.
    pub fn target(&self) -> &Url {
        &self.target
    }

    /// `host:port` of the upstream, used when tunneling.
    pub fn authority(&self) -> &str {
        &self.authority
    }

    /// Forward one request and stream the upstream response back.
    pub async fn forward(&self, request: Request<Body>) -> Response {
        let peer = request
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip());
        let (mut parts, body) = request.into_parts();

        let uri = match self.rewrite_uri(&parts.uri) {
            Ok(uri) => uri,
            Err(e) => {
                tracing::warn!(upstream = %self.target, error = %e, "Failed to rewrite request URI");
                return (StatusCode::BAD_GATEWAY, "invalid upstream uri").into_response();
            }
        };

        // HTTP/2 requests carry the authority in the URI, not a Host header.
        if !parts.headers.contains_key(header::HOST) {
            if let Some(value) = parts
                .uri
                .authority()
                .and_then(|a| HeaderValue::from_str(a.as_str()).ok())
            {
                parts.headers.insert(header::HOST, value);
            }
        }

        strip_hop_by_hop(&mut parts.headers);
        if let Some(ip) = peer {
            append_forwarded_for(&mut parts.headers, &ip.to_string());
        }

        parts.uri = uri;
        parts.version = Version::HTTP_11;
        let upstream_request = Request::from_parts(parts, body);

        match self.client.request(upstream_request).await {
            Ok(response) => {
                let (mut parts, body) = response.into_parts();
                strip_hop_by_hop(&mut parts.headers);
                Response::from_parts(parts, Body::new(body))
            }
            Err(e) => {
                tracing::error!(upstream = %self.target, error = %e, "Upstream error");
                (StatusCode::BAD_GATEWAY, "Upstream request failed").into_response()
            }
        }
    }

    /// Map an inbound URI onto the target: scheme and authority replaced,
    /// paths joined with a single slash, queries concatenated.
    pub fn rewrite_uri(&self, inbound: &Uri) -> Result<Uri, axum::http::Error> {
        let path = join_paths(self.target.path(), inbound.path());
        let query = match (self.target.query(), inbound.query()) {
            (Some(a), Some(b)) if !a.is_empty() && !b.is_empty() => Some(format!("{a}&{b}")),
            (Some(a), _) if !a.is_empty() => Some(a.to_string()),
            (_, Some(b)) if !b.is_empty() => Some(b.to_string()),
            _ => None,
        };
        let path_and_query = match query {
            Some(q) => format!("{path}?{q}"),
            None => path,
        };

        Uri::builder()
            .scheme(self.target.scheme())
            .authority(self.authority.as_str())
            .path_and_query(PathAndQuery::try_from(path_and_query)?)
            .build()
    }
}

/// Parse a destination, prefixing `http://` when no scheme is given.
pub fn parse_destination(dest: &str) -> Result<Url, url::ParseError> {
    let dest = dest.trim();
    if dest.contains("://") {
        Url::parse(dest)
    } else {
        Url::parse(&format!("http://{dest}"))
    }
}

fn join_paths(base: &str, path: &str) -> String {
    let path = if path.is_empty() { "/" } else { path };
    match (base.ends_with('/'), path.starts_with('/')) {
        (true, true) => format!("{}{}", base, &path[1..]),
        (false, false) => format!("{base}/{path}"),
        _ => format!("{base}{path}"),
    }
}

/// Remove hop-by-hop headers, including any named by `Connection`.
pub fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let named: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();

    for name in &named {
        headers.remove(name);
    }
    for name in HOP_BY_HOP_HEADERS {
        headers.remove(*name);
    }
}

fn append_forwarded_for(headers: &mut HeaderMap, client_ip: &str) {
    let value = match headers.get(&X_FORWARDED_FOR).and_then(|v| v.to_str().ok()) {
        Some(prior) => format!("{prior}, {client_ip}"),
        None => client_ip.to_string(),
    };
    if let Ok(value) = HeaderValue::from_str(&value) {
        headers.insert(X_FORWARDED_FOR, value);
    }
}
