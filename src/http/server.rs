//! HTTP server setup.
//!
//! # Responsibilities
//! - Build the axum router around the dispatcher
//! - Wire up middleware (request ID, tracing)
//! - Serve the plaintext listener (axum) and the TLS listener (axum-server)
//!
//! # Design Decisions
//! - Everything goes through one fallback handler; axum path routing cannot
//!   see CONNECT's authority-form target
//! - Both listeners share the same router and so the same route table
//! - Peer addresses come from `ConnectInfo` for `X-Forwarded-For`

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::State;
use axum::http::Request;
use axum::response::Response;
use axum::Router;
use axum_server::tls_rustls::RustlsConfig;
use axum_server::Handle;
use tokio::net::TcpListener;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

use crate::http::dispatch::Dispatcher;

/// Build the router with all middleware layers.
pub fn build_router(dispatcher: Arc<Dispatcher>) -> Router {
    Router::new()
        .fallback(dispatch_handler)
        .with_state(dispatcher)
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
            let request_id = request
                .headers()
                .get("x-request-id")
                .and_then(|v| v.to_str().ok())
                .unwrap_or("-");
            tracing::debug_span!(
                "request",
                method = %request.method(),
                uri = %request.uri(),
                request_id = %request_id,
            )
        }))
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
}

async fn dispatch_handler(State(dispatcher): State<Arc<Dispatcher>>, request: Request<Body>) -> Response {
    dispatcher.dispatch(request).await
}

/// Serve plaintext HTTP (HTTP/1.1 and h2c) until `shutdown` resolves.
pub async fn serve_http<F>(listener: TcpListener, app: Router, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = listener.local_addr()?;
    tracing::info!(address = %addr, "HTTP listener started");

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown)
        .await?;

    tracing::info!(address = %addr, "HTTP listener stopped");
    Ok(())
}

/// Serve HTTPS on an already bound listener until `handle` shuts it down.
pub async fn serve_https(
    listener: std::net::TcpListener,
    app: Router,
    tls: RustlsConfig,
    handle: Handle,
) -> std::io::Result<()> {
    let addr = listener.local_addr()?;
    tracing::info!(address = %addr, "TLS listener started");

    axum_server::from_tcp_rustls(listener, tls)
        .handle(handle)
        .serve(app.into_make_service_with_connect_info::<SocketAddr>())
        .await?;

    tracing::info!(address = %addr, "TLS listener stopped");
    Ok(())
}
