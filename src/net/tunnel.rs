//! CONNECT tunnels.
//!
//! # Data Flow
//! ```text
//! CONNECT request
//!     → establish (check the connection can be taken over)
//!     → dial target (bounded by DIAL_TIMEOUT, 503 on failure)
//!     → 200 response, hyper hands over the raw connection
//!     → Tunnel::run (two relays, client ⇄ upstream)
//! ```
//!
//! # Design Decisions
//! - Dial before answering: a failed dial never consumes the client connection
//! - The tunnel owns both sockets and both relay tasks; it ends only when
//!   both relays have exited
//! - The first relay to finish, on EOF or error, half-closes its writer and
//!   the session aborts the other relay, so both sockets close together
//! - Bytes are relayed opaquely, never parsed

use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::response::{IntoResponse, Response};
use hyper::upgrade::OnUpgrade;
use hyper_util::rt::TokioIo;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::task::JoinSet;

use crate::net::session::{TunnelGuard, TunnelTracker};

/// Upper bound on dialing a tunnel target.
pub const DIAL_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum TunnelError {
    #[error("dial {target}: timed out after {limit:?}")]
    Timeout { target: String, limit: Duration },

    #[error("dial {target}: {source}")]
    Connect {
        target: String,
        #[source]
        source: io::Error,
    },
}

/// Connect to `target`, giving up after `limit`.
pub async fn dial(target: &str, limit: Duration) -> Result<TcpStream, TunnelError> {
    match tokio::time::timeout(limit, TcpStream::connect(target)).await {
        Ok(Ok(stream)) => Ok(stream),
        Ok(Err(source)) => Err(TunnelError::Connect {
            target: target.to_string(),
            source,
        }),
        Err(_) => Err(TunnelError::Timeout {
            target: target.to_string(),
            limit,
        }),
    }
}

/// Answer a CONNECT request by tunneling it to `target`.
///
/// The relay runs in its own task once hyper has switched the connection
/// over, so this returns as soon as the target is dialed.
pub async fn establish(mut request: Request<Body>, target: &str, tracker: &TunnelTracker) -> Response {
    if request.extensions().get::<OnUpgrade>().is_none() {
        tracing::error!(target_addr = %target, "Connection cannot be taken over for CONNECT");
        return (StatusCode::INTERNAL_SERVER_ERROR, "hijacking not supported").into_response();
    }

    let upstream = match dial(target, DIAL_TIMEOUT).await {
        Ok(stream) => stream,
        Err(e) => {
            tracing::warn!(error = %e, "CONNECT dial failed");
            return (StatusCode::SERVICE_UNAVAILABLE, e.to_string()).into_response();
        }
    };

    let on_upgrade = hyper::upgrade::on(&mut request);
    let guard = tracker.track();
    tracing::debug!(tunnel_id = %guard.id(), active = tracker.active_count(), "Tunnel registered");
    let target = target.to_string();

    tokio::spawn(async move {
        match on_upgrade.await {
            Ok(upgraded) => {
                Tunnel::new(guard, target, TokioIo::new(upgraded), upstream)
                    .run()
                    .await;
            }
            Err(e) => {
                tracing::warn!(tunnel_id = %guard.id(), target_addr = %target, error = %e, "CONNECT upgrade failed");
            }
        }
    });

    StatusCode::OK.into_response()
}

/// Which way a relay copies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    ClientToUpstream,
    UpstreamToClient,
}

/// Bytes moved by a finished tunnel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TunnelStats {
    pub client_to_upstream: u64,
    pub upstream_to_client: u64,
}

/// One CONNECT session: the client connection, the dialed upstream, and
/// the relays between them.
pub struct Tunnel<C> {
    guard: TunnelGuard,
    target: String,
    client: C,
    upstream: TcpStream,
}

impl<C> Tunnel<C>
where
    C: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    pub fn new(guard: TunnelGuard, target: String, client: C, upstream: TcpStream) -> Self {
        Self {
            guard,
            target,
            client,
            upstream,
        }
    }

    /// Relay until either direction finishes, then tear down both.
    pub async fn run(self) -> TunnelStats {
        let Self {
            guard,
            target,
            client,
            upstream,
        } = self;
        tracing::debug!(tunnel_id = %guard.id(), target_addr = %target, "Tunnel open");

        let (client_read, client_write) = tokio::io::split(client);
        let (upstream_read, upstream_write) = upstream.into_split();
        let up = Arc::new(AtomicU64::new(0));
        let down = Arc::new(AtomicU64::new(0));

        let mut relays = JoinSet::new();
        relays.spawn(relay(
            Direction::ClientToUpstream,
            client_read,
            upstream_write,
            Arc::clone(&up),
        ));
        relays.spawn(relay(
            Direction::UpstreamToClient,
            upstream_read,
            client_write,
            Arc::clone(&down),
        ));

        while let Some(joined) = relays.join_next().await {
            match joined {
                Ok((direction, Ok(()))) => {
                    tracing::debug!(tunnel_id = %guard.id(), ?direction, "Relay reached EOF");
                }
                Ok((direction, Err(e))) => {
                    tracing::debug!(tunnel_id = %guard.id(), ?direction, error = %e, "Relay failed");
                }
                Err(e) if e.is_cancelled() => continue,
                Err(e) => {
                    tracing::error!(tunnel_id = %guard.id(), error = %e, "Relay task panicked");
                }
            }
            // Dropping the other relay closes its halves of both sockets.
            relays.abort_all();
        }

        let stats = TunnelStats {
            client_to_upstream: up.load(Ordering::Relaxed),
            upstream_to_client: down.load(Ordering::Relaxed),
        };
        tracing::debug!(
            tunnel_id = %guard.id(),
            target_addr = %target,
            bytes_up = stats.client_to_upstream,
            bytes_down = stats.upstream_to_client,
            "Tunnel closed"
        );
        stats
    }
}

/// Copy `reader` into `writer`, counting bytes into `moved` as they go.
async fn relay<R, W>(
    direction: Direction,
    mut reader: R,
    mut writer: W,
    moved: Arc<AtomicU64>,
) -> (Direction, io::Result<()>)
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; 16 * 1024];
    let result = async {
        loop {
            let n = reader.read(&mut buf).await?;
            if n == 0 {
                return Ok::<(), io::Error>(());
            }
            writer.write_all(&buf[..n]).await?;
            moved.fetch_add(n as u64, Ordering::Relaxed);
        }
    }
    .await;
    let _ = writer.shutdown().await;
    (direction, result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::pin::Pin;
    use std::task::{Context, Poll};
    use tokio::io::ReadBuf;
    use tokio::net::TcpListener;

    /// Client connection whose reads fail and whose writes are discarded.
    struct ResetClient;

    impl AsyncRead for ResetClient {
        fn poll_read(self: Pin<&mut Self>, _: &mut Context<'_>, _: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Err(io::ErrorKind::ConnectionReset.into()))
        }
    }

    impl AsyncWrite for ResetClient {
        fn poll_write(self: Pin<&mut Self>, _: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
            Poll::Ready(Ok(buf.len()))
        }

        fn poll_flush(self: Pin<&mut Self>, _: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    async fn upstream_pair() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (dialed, accepted) = tokio::join!(TcpStream::connect(addr), listener.accept());
        (dialed.unwrap(), accepted.unwrap().0)
    }

    #[tokio::test]
    async fn relays_both_directions() {
        let tracker = TunnelTracker::new();
        let (upstream, mut backend) = upstream_pair().await;
        let (mut client, proxy_side) = tokio::io::duplex(1024);

        let tunnel = Tunnel::new(tracker.track(), "backend".into(), proxy_side, upstream);
        let session = tokio::spawn(tunnel.run());

        client.write_all(b"ping").await.unwrap();
        let mut buf = [0u8; 4];
        backend.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"ping");

        backend.write_all(b"pong!").await.unwrap();
        let mut buf = [0u8; 5];
        client.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"pong!");

        drop(client);
        let stats = session.await.unwrap();
        assert_eq!(stats.client_to_upstream, 4);
        assert_eq!(stats.upstream_to_client, 5);
        assert_eq!(tracker.active_count(), 0);
    }

    #[tokio::test]
    async fn client_close_ends_session_while_backend_stays_open() {
        let tracker = TunnelTracker::new();
        let (upstream, mut backend) = upstream_pair().await;
        let (mut client, proxy_side) = tokio::io::duplex(1024);

        let tunnel = Tunnel::new(tracker.track(), "backend".into(), proxy_side, upstream);
        let session = tokio::spawn(tunnel.run());

        client.write_all(b"ping").await.unwrap();
        drop(client);

        // The backend never closes; the session must still end.
        tokio::time::timeout(Duration::from_secs(3), session)
            .await
            .expect("tunnel outlived its client")
            .unwrap();
        assert_eq!(tracker.active_count(), 0);

        let mut rest = Vec::new();
        backend.read_to_end(&mut rest).await.unwrap();
        assert_eq!(rest, b"ping");
    }

    #[tokio::test]
    async fn relay_error_ends_other_direction() {
        let tracker = TunnelTracker::new();
        let (upstream, mut backend) = upstream_pair().await;

        let tunnel = Tunnel::new(tracker.track(), "backend".into(), ResetClient, upstream);
        let session = tokio::spawn(tunnel.run());

        // The upstream-to-client relay is idle; the client read error must end it.
        tokio::time::timeout(Duration::from_secs(3), session)
            .await
            .expect("idle relay outlived the failed one")
            .unwrap();
        assert_eq!(tracker.active_count(), 0);

        let mut rest = Vec::new();
        backend.read_to_end(&mut rest).await.unwrap();
        assert!(rest.is_empty());
    }

    #[tokio::test]
    async fn dial_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = dial(&addr.to_string(), DIAL_TIMEOUT).await.unwrap_err();
        assert!(matches!(err, TunnelError::Connect { .. }));
    }

    #[tokio::test]
    async fn establish_without_upgrade_support() {
        let request = Request::builder()
            .method("CONNECT")
            .uri("app.wip:443")
            .body(Body::empty())
            .unwrap();
        let response = establish(request, "127.0.0.1:1", &TunnelTracker::new()).await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
