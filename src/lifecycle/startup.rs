//! Startup orchestration.
//!
//! # Responsibilities
//! - Validate the configuration and build the route table
//! - Issue the TLS certificate and bind the TLS listener
//! - Bind the plaintext listener and start serving
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal, nothing is bound on a bad config
//! - TLS comes up before the plaintext listener; if TLS was requested and
//!   fails, there is no HTTP-only fallback
//! - The dispatcher is built after binding, so the PAC file and CONNECT
//!   policy see the real ports

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use axum_server::tls_rustls::RustlsConfig;
use axum_server::Handle;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use crate::backend::{http_client, BackendError};
use crate::certs::{self, CertError};
use crate::config::validation::{find_shadowed, validate_config, ValidationError};
use crate::config::{ConfigError, ProxyConfig};
use crate::http::server::{build_router, serve_http, serve_https};
use crate::http::{ConnectTargets, Dispatcher, PacFile};
use crate::lifecycle::Shutdown;
use crate::routing::RouteTable;

/// How long listeners and tunnels get to drain after shutdown is triggered.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("invalid configuration: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error("TLS setup failed: {0}")]
    Certificate(#[from] CertError),

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("server error: {0}")]
    Serve(#[source] std::io::Error),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// A proxy whose listeners are bound and serving.
#[derive(Debug)]
pub struct RunningProxy {
    http_addr: SocketAddr,
    https_addr: Option<SocketAddr>,
    shutdown: Shutdown,
    task: JoinHandle<Result<(), StartupError>>,
}

impl RunningProxy {
    /// Bound plaintext address.
    pub fn http_addr(&self) -> SocketAddr {
        self.http_addr
    }

    /// Bound TLS address, if the TLS listener runs.
    pub fn https_addr(&self) -> Option<SocketAddr> {
        self.https_addr
    }

    /// Handle that stops the proxy when triggered.
    pub fn shutdown_handle(&self) -> Shutdown {
        self.shutdown.clone()
    }

    /// Ask both listeners to stop.
    pub fn shutdown(&self) {
        self.shutdown.trigger();
    }

    /// Wait for the listeners to stop and tunnels to drain.
    pub async fn wait(self) -> Result<(), StartupError> {
        match self.task.await {
            Ok(result) => result,
            Err(e) => Err(StartupError::Serve(std::io::Error::other(e))),
        }
    }
}

/// Validate `config`, bind every listener and start serving in the background.
pub async fn start(config: &ProxyConfig) -> Result<RunningProxy, StartupError> {
    validate_config(config).map_err(StartupError::Validation)?;
    for shadowed in find_shadowed(&config.entries) {
        tracing::warn!(
            host = %config.entries[shadowed.index].host,
            shadowed_by = %config.entries[shadowed.shadowed_by].host,
            "Entry is unreachable; an earlier entry matches first"
        );
    }

    let client = http_client()?;
    let routes = RouteTable::from_entries(&config.entries, &client)?;
    tracing::info!(routes = routes.len(), "Route table built");
    for route in routes.iter() {
        tracing::debug!(route = route.index, pattern = %route.pattern, backend = %route.backend.describe(), "Route registered");
    }

    let tls = match config.tls_bind_address() {
        Some(addr) => Some(prepare_tls(config, &routes, &addr)?),
        None => None,
    };

    let http_bind = config.bind_address();
    let http_listener = TcpListener::bind(&http_bind)
        .await
        .map_err(|source| StartupError::Bind {
            addr: http_bind.clone(),
            source,
        })?;
    let http_addr = http_listener
        .local_addr()
        .map_err(|source| StartupError::Bind { addr: http_bind, source })?;
    let https_addr = tls.as_ref().map(|(_, addr, _)| *addr);

    let connect = ConnectTargets {
        policy: config.connect_policy,
        tls_listener: https_addr.map(|addr| dialable(addr).to_string()),
    };
    let dispatcher = Arc::new(Dispatcher::new(
        routes,
        PacFile::new(config.tld.clone(), http_addr.port()),
        connect,
    ));
    let app = build_router(Arc::clone(&dispatcher));

    let shutdown = Shutdown::new();
    let handle = Handle::new();

    let tls_task = tls.map(|(listener, _, rustls)| {
        tokio::spawn(serve_https(listener, app.clone(), rustls, handle.clone()))
    });

    let graceful = {
        let notified = shutdown.notified();
        let handle = handle.clone();
        async move {
            notified.await;
            handle.graceful_shutdown(Some(SHUTDOWN_GRACE));
        }
    };

    let task = tokio::spawn(async move {
        let served = serve_http(http_listener, app, graceful).await;
        handle.graceful_shutdown(Some(SHUTDOWN_GRACE));

        if let Some(tls_task) = tls_task {
            match tls_task.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::error!(error = %e, "TLS listener failed"),
                Err(e) => tracing::error!(error = %e, "TLS listener task failed"),
            }
        }

        let open = dispatcher.tunnels().wait_idle(SHUTDOWN_GRACE).await;
        if open > 0 {
            tracing::warn!(open, "Tunnels still open at shutdown");
        }

        served.map_err(StartupError::Serve)
    });

    Ok(RunningProxy {
        http_addr,
        https_addr,
        shutdown,
        task,
    })
}

/// Issue the certificate and bind the TLS listener.
fn prepare_tls(
    config: &ProxyConfig,
    routes: &RouteTable,
    addr: &str,
) -> Result<(std::net::TcpListener, SocketAddr, RustlsConfig), StartupError> {
    let provider = certs::provider_for(config);
    let hostnames = routes.hostnames();
    let material = provider.issue(&hostnames)?;
    tracing::info!(provider = provider.name(), hostnames = ?hostnames, "TLS certificate issued");
    let rustls = material.rustls_config()?;

    let bind_err = |source| StartupError::Bind {
        addr: addr.to_string(),
        source,
    };
    let listener = std::net::TcpListener::bind(addr).map_err(bind_err)?;
    listener.set_nonblocking(true).map_err(bind_err)?;
    let local = listener.local_addr().map_err(bind_err)?;

    Ok((listener, local, rustls))
}

/// Loopback equivalent of a wildcard bind address.
fn dialable(addr: SocketAddr) -> SocketAddr {
    match addr.ip() {
        IpAddr::V4(ip) if ip.is_unspecified() => SocketAddr::new(Ipv4Addr::LOCALHOST.into(), addr.port()),
        IpAddr::V6(ip) if ip.is_unspecified() => SocketAddr::new(Ipv6Addr::LOCALHOST.into(), addr.port()),
        _ => addr,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Entry;

    #[test]
    fn dialable_replaces_wildcards() {
        assert_eq!(dialable("0.0.0.0:7998".parse().unwrap()), "127.0.0.1:7998".parse().unwrap());
        assert_eq!(dialable("[::]:7998".parse().unwrap()), "[::1]:7998".parse().unwrap());
        assert_eq!(dialable("10.0.0.2:7998".parse().unwrap()), "10.0.0.2:7998".parse().unwrap());
    }

    #[tokio::test]
    async fn invalid_config_binds_nothing() {
        let config = ProxyConfig {
            addr: "127.0.0.1:0".into(),
            tls_addr: String::new(),
            entries: vec![Entry {
                host: "broken.wip".into(),
                dest: None,
                dest_folder: None,
            }],
            ..ProxyConfig::default()
        };
        let err = start(&config).await.unwrap_err();
        assert!(matches!(err, StartupError::Validation(_)));
        assert!(err.to_string().contains("broken.wip"));
    }

    #[tokio::test]
    async fn missing_ca_files_abort_startup() {
        let config = ProxyConfig {
            addr: "127.0.0.1:0".into(),
            tls_addr: "127.0.0.1:0".into(),
            ca_key_file: Some("/nonexistent/ca.key".into()),
            entries: vec![Entry::host("app.wip", "localhost:3000")],
            ..ProxyConfig::default()
        };
        let err = start(&config).await.unwrap_err();
        assert!(matches!(err, StartupError::Certificate(CertError::CaFile { .. })));
    }

    #[tokio::test]
    async fn starts_and_stops() {
        let config = ProxyConfig {
            addr: "127.0.0.1:0".into(),
            tls_addr: "127.0.0.1:0".into(),
            entries: vec![Entry::host("app.wip", "localhost:3000")],
            ..ProxyConfig::default()
        };
        let running = start(&config).await.unwrap();
        assert_ne!(running.http_addr().port(), 0);
        assert!(running.https_addr().is_some());

        running.shutdown();
        tokio::time::timeout(Duration::from_secs(10), running.wait())
            .await
            .unwrap()
            .unwrap();
    }
}
