//! Backend handlers.
//!
//! # Data Flow
//! ```text
//! Entry (dest | dest_folder)
//!     → Backend::build (fail fast on bad destinations)
//!     → Backend::Proxy  → proxy.rs (reverse proxy over the shared client)
//!     → Backend::Files  → files.rs (static files + directory listing)
//! ```
//!
//! # Design Decisions
//! - Closed enum: the dispatcher calls one `serve` without knowing the variant
//! - One shared HTTP client (connection pooling across routes)
//! - Built once at startup; no per-request mutable state

pub mod files;
pub mod proxy;

use std::path::Path;

use axum::body::Body;
use axum::http::Request;
use axum::response::Response;
use hyper_rustls::HttpsConnector;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use thiserror::Error;

use crate::config::validation::{validate_entry, ValidationError};
use crate::config::Entry;

pub use files::StaticFiles;
pub use proxy::ReverseProxy;

/// Client shared by every reverse proxy route.
pub type HttpClient = Client<HttpsConnector<HttpConnector>, Body>;

/// Errors building a backend from an entry. All of them abort startup.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error(transparent)]
    Entry(#[from] ValidationError),

    #[error("entry {host}: invalid host pattern: {reason}")]
    InvalidPattern { host: String, reason: String },

    #[error("entry {host}: failed to parse dest url {dest:?}: {source}")]
    InvalidDestination {
        host: String,
        dest: String,
        #[source]
        source: url::ParseError,
    },

    #[error("entry {host}: dest {dest:?} has no host")]
    MissingHost { host: String, dest: String },

    #[error("entry {host}: unsupported scheme {scheme:?}")]
    UnsupportedScheme { host: String, scheme: String },

    #[error("failed to initialize HTTP client: {0}")]
    Client(#[from] rustls::Error),
}

/// Handler for one configured entry.
#[derive(Debug)]
pub enum Backend {
    Proxy(ReverseProxy),
    Files(StaticFiles),
}

impl Backend {
    /// Build the handler for `entry`.
    pub fn build(entry: &Entry, client: &HttpClient) -> Result<Self, BackendError> {
        validate_entry(0, entry)?;

        let dest = entry.dest.as_deref().filter(|d| !d.is_empty());
        let folder = entry.dest_folder.as_deref().filter(|f| !f.is_empty());
        match (dest, folder) {
            (Some(dest), _) => Ok(Backend::Proxy(ReverseProxy::new(&entry.host, dest, client.clone())?)),
            (None, Some(folder)) => {
                if !Path::new(folder).is_dir() {
                    tracing::warn!(host = %entry.host, folder = %folder, "dest_folder does not exist");
                }
                Ok(Backend::Files(StaticFiles::new(folder)))
            }
            (None, None) => Err(ValidationError::MissingDestination {
                host: entry.host.clone(),
            }
            .into()),
        }
    }

    /// Serve an ordinary (non-CONNECT) request.
    pub async fn serve(&self, request: Request<Body>) -> Response {
        match self {
            Backend::Proxy(proxy) => proxy.forward(request).await,
            Backend::Files(files) => files.serve(request).await,
        }
    }

    /// `host:port` a CONNECT on this route tunnels to. Folders have none.
    pub fn tunnel_authority(&self) -> Option<&str> {
        match self {
            Backend::Proxy(proxy) => Some(proxy.authority()),
            Backend::Files(_) => None,
        }
    }

    /// Human readable destination for logs.
    pub fn describe(&self) -> String {
        match self {
            Backend::Proxy(proxy) => proxy.target().to_string(),
            Backend::Files(files) => files.root().display().to_string(),
        }
    }
}

/// Build the upstream client: plain HTTP plus HTTPS with webpki roots.
pub fn http_client() -> Result<HttpClient, BackendError> {
    let connector = hyper_rustls::HttpsConnectorBuilder::new()
        .with_provider_and_webpki_roots(rustls::crypto::aws_lc_rs::default_provider())?
        .https_or_http()
        .enable_http1()
        .build();

    Ok(Client::builder(TokioExecutor::new()).build(connector))
}
