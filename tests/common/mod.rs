//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::net::{SocketAddr, TcpListener as StdTcpListener};

use edge_gateway::config::{HttpServerConfig, ProxyConfig, UpstreamConfig};
use edge_gateway::{Gateway, PluginRegistry};
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

/// Reserve a free loopback port.
pub fn free_port() -> u16 {
    let listener = StdTcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

/// Config listening on loopback with a free default port.
pub fn base_config() -> ProxyConfig {
    let mut config = ProxyConfig::default();
    config.http.bind_address = "127.0.0.1".to_string();
    config.http.default_port = free_port();
    config
}

/// Server with a dedicated free port.
pub fn dedicated_server(name: &str, upstreams: &[(SocketAddr, f64)]) -> HttpServerConfig {
    HttpServerConfig {
        name: name.to_string(),
        port: Some(free_port()),
        upstream: upstreams
            .iter()
            .map(|(addr, weight)| UpstreamConfig {
                host: addr.ip().to_string(),
                port: addr.port(),
                weight: *weight,
            })
            .collect(),
        ..Default::default()
    }
}

/// Build, bind and run a gateway in the background.
///
/// Every socket is bound when this returns.
pub async fn start_gateway(config: &ProxyConfig) {
    let gateway = Gateway::build(config, &PluginRegistry::with_builtins())
        .await
        .expect("gateway build");
    let supervisor = gateway.bind().await.expect("gateway bind");
    tokio::spawn(async move {
        let _ = supervisor.run(std::future::pending()).await;
    });
}

/// Start a mock HTTP backend answering `"<name> <path>"`.
///
/// The received Host and X-Forwarded-For headers are echoed back as
/// `x-seen-host` and `x-seen-forwarded-for`.
pub async fn start_named_backend(name: &'static str) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let Some(head) = read_head(&mut socket).await else {
                    return;
                };
                let path = head
                    .lines()
                    .next()
                    .and_then(|line| line.split_whitespace().nth(1))
                    .unwrap_or("")
                    .to_string();
                let host = header(&head, "host").unwrap_or_default();
                let forwarded = header(&head, "x-forwarded-for").unwrap_or_default();

                let body = format!("{name} {path}");
                let response = format!(
                    "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nx-seen-host: {host}\r\nx-seen-forwarded-for: {forwarded}\r\nConnection: close\r\n\r\n{body}",
                    body.len(),
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    addr
}

/// Start a WebSocket backend that echoes every text and binary message.
pub async fn start_ws_echo_backend() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let Ok(mut ws) = tokio_tungstenite::accept_async(socket).await else {
                    return;
                };
                while let Some(Ok(message)) = ws.next().await {
                    if message.is_text() || message.is_binary() {
                        if ws.send(message).await.is_err() {
                            break;
                        }
                    } else if message.is_close() {
                        break;
                    }
                }
            });
        }
    });

    addr
}

async fn read_head(socket: &mut TcpStream) -> Option<String> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
    }
    String::from_utf8(buf).ok()
}

fn header(head: &str, name: &str) -> Option<String> {
    head.lines().skip(1).find_map(|line| {
        let (key, value) = line.split_once(':')?;
        key.trim()
            .eq_ignore_ascii_case(name)
            .then(|| value.trim().to_string())
    })
}

/// Client that never pools or proxies.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .redirect(reqwest::redirect::Policy::none())
        .no_proxy()
        .build()
        .unwrap()
}
