//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::time::Duration;

use devproxy::config::{Entry, ProxyConfig};
use devproxy::lifecycle::{self, RunningProxy};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;

/// Start a mock HTTP backend that describes each request it receives.
///
/// The response body is `"<method> <target>\nhost=<host>\nxff=<x-forwarded-for>\n"`.
pub async fn start_echo_backend() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let head = match read_head(&mut socket).await {
                    Some(head) => head,
                    None => return,
                };
                let body = describe_request(&head);
                let response = format!(
                    "HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    body.len(),
                    body
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    addr
}

/// Start a raw TCP backend that forwards every byte it receives to the channel
/// and writes `greeting` once on connect.
pub async fn start_sink_backend(greeting: &'static [u8]) -> (SocketAddr, mpsc::UnboundedReceiver<Vec<u8>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let tx = tx.clone();
            tokio::spawn(async move {
                let _ = socket.write_all(greeting).await;
                let mut buf = [0u8; 4096];
                loop {
                    match socket.read(&mut buf).await {
                        Ok(0) | Err(_) => break,
                        Ok(n) => {
                            if tx.send(buf[..n].to_vec()).is_err() {
                                break;
                            }
                        }
                    }
                }
            });
        }
    });

    (addr, rx)
}

/// An address nothing listens on.
pub async fn closed_port() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    addr
}

/// Config on ephemeral loopback ports with the TLS listener disabled.
pub fn config_with(entries: Vec<Entry>) -> ProxyConfig {
    ProxyConfig {
        addr: "127.0.0.1:0".into(),
        tls_addr: String::new(),
        entries,
        ..ProxyConfig::default()
    }
}

/// Start the proxy for a test.
pub async fn start_proxy(config: &ProxyConfig) -> RunningProxy {
    lifecycle::start(config).await.unwrap()
}

/// Stop the proxy and wait for it to finish.
pub async fn stop_proxy(proxy: RunningProxy) {
    proxy.shutdown();
    tokio::time::timeout(Duration::from_secs(10), proxy.wait())
        .await
        .expect("proxy did not stop in time")
        .unwrap();
}

/// HTTP client that never goes through a system proxy.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .no_proxy()
        .timeout(Duration::from_secs(15))
        .build()
        .unwrap()
}

/// Read bytes until the end of an HTTP head (`\r\n\r\n`).
pub async fn read_head(stream: &mut TcpStream) -> Option<String> {
    let mut head = Vec::new();
    let mut byte = [0u8; 1];
    while !head.ends_with(b"\r\n\r\n") {
        match stream.read(&mut byte).await {
            Ok(0) | Err(_) => return None,
            Ok(_) => head.push(byte[0]),
        }
    }
    Some(String::from_utf8_lossy(&head).into_owned())
}

/// Collect from `rx` until `expected` bytes have arrived.
pub async fn receive_exactly(rx: &mut mpsc::UnboundedReceiver<Vec<u8>>, expected: usize) -> Vec<u8> {
    let mut received = Vec::new();
    while received.len() < expected {
        let chunk = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for backend bytes")
            .expect("backend channel closed");
        received.extend_from_slice(&chunk);
    }
    received
}

fn describe_request(head: &str) -> String {
    let mut lines = head.lines();
    let request_line = lines.next().unwrap_or_default();
    let mut parts = request_line.split_whitespace();
    let method = parts.next().unwrap_or_default();
    let target = parts.next().unwrap_or_default();

    let header = |name: &str| {
        head.lines()
            .skip(1)
            .filter_map(|line| line.split_once(':'))
            .find(|(key, _)| key.trim().eq_ignore_ascii_case(name))
            .map(|(_, value)| value.trim().to_string())
            .unwrap_or_default()
    };

    format!(
        "{method} {target}\nhost={}\nxff={}\nrequest-id={}\n",
        header("host"),
        header("x-forwarded-for"),
        header("x-request-id")
    )
}
