//! WebSocket proxy handling.
//!
//! # Responsibilities
//! - Enforce the server's access groups
//! - Open the upstream WebSocket before accepting the client upgrade
//! - Bidirectional message forwarding
//!
//! # Data Flow
//! ```text
//! Client ←──── WebSocket frames ────→ Proxy ←──── WebSocket frames ────→ Backend
//! ```
//!
//! # Design Decisions
//! - Upstreams are picked round-robin, without weights
//! - An unreachable upstream fails the upgrade with 502
//! - Close frames propagated in both directions
//! - Ping/pong handled transparently

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{
        ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade},
        ConnectInfo, State,
    },
    http::Uri,
    response::{IntoResponse, Response},
    Router,
};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::protocol::{frame::coding::CloseCode, CloseFrame as UpstreamCloseFrame};
use tokio_tungstenite::tungstenite::Message as UpstreamMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::config::WebSocketServerConfig;
use crate::http::request::with_request_layers;
use crate::http::response::ProxyError;
use crate::http::server::GatewayContext;
use crate::load_balancer::RoundRobin;

type UpstreamSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// One configured WebSocket server.
#[derive(Debug)]
pub struct WebSocketProxy {
    name: String,
    ctx: Arc<GatewayContext>,
    access_groups: Vec<String>,
    upstreams: RoundRobin,
}

impl WebSocketProxy {
    pub fn new(
        config: &WebSocketServerConfig,
        ctx: Arc<GatewayContext>,
        upstreams: Vec<SocketAddr>,
    ) -> Self {
        Self {
            name: config.name.clone(),
            ctx,
            access_groups: config.allowed_hosts_groups.clone(),
            upstreams: RoundRobin::new(upstreams),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn upstreams(&self) -> &[SocketAddr] {
        self.upstreams.upstreams()
    }

    pub fn into_router(self) -> Router {
        with_request_layers(Router::new().fallback(upgrade_handler).with_state(Arc::new(self)))
    }

    fn check_access(&self, peer: SocketAddr) -> Result<(), ProxyError> {
        if self.access_groups.is_empty() || self.ctx.access.is_allowed(peer.ip(), &self.access_groups) {
            return Ok(());
        }
        tracing::warn!(
            server = %self.name,
            peer = %peer.ip(),
            groups = ?self.access_groups,
            "WebSocket connection not allowed by access groups"
        );
        Err(ProxyError::AccessDenied)
    }
}

async fn upgrade_handler(
    State(proxy): State<Arc<WebSocketProxy>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    uri: Uri,
    upgrade: Result<WebSocketUpgrade, axum::extract::ws::rejection::WebSocketUpgradeRejection>,
) -> Response {
    // 1. Access groups
    if let Err(e) = proxy.check_access(peer) {
        return e.into_response();
    }

    // 2. Only upgrade requests are proxied
    let upgrade = match upgrade {
        Ok(upgrade) => upgrade,
        Err(rejection) => return rejection.into_response(),
    };

    // 3. Connect upstream first
    let Some(upstream) = proxy.upstreams.next() else {
        return ProxyError::NoDestination.into_response();
    };
    let path = uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");
    let url = format!("ws://{upstream}{path}");

    let upstream_socket = match tokio_tungstenite::connect_async(url.as_str()).await {
        Ok((socket, _)) => socket,
        Err(e) => {
            tracing::error!(server = %proxy.name, upstream = %upstream, error = %e, "WebSocket upstream connection failed");
            return ProxyError::upstream(upstream, e).into_response();
        }
    };

    tracing::debug!(server = %proxy.name, peer = %peer, upstream = %upstream, "WebSocket upgrade accepted");

    // 4. Relay
    let name = proxy.name.clone();
    upgrade.on_upgrade(move |client| async move {
        relay(client, upstream_socket).await;
        tracing::debug!(server = %name, peer = %peer, "WebSocket session closed");
    })
}

async fn relay(client: WebSocket, upstream: UpstreamSocket) {
    let (mut client_tx, mut client_rx) = client.split();
    let (mut upstream_tx, mut upstream_rx) = upstream.split();

    let client_to_upstream = async {
        while let Some(Ok(message)) = client_rx.next().await {
            let closing = matches!(message, Message::Close(_));
            if upstream_tx.send(to_upstream(message)).await.is_err() || closing {
                break;
            }
        }
    };

    let upstream_to_client = async {
        while let Some(Ok(message)) = upstream_rx.next().await {
            let Some(message) = to_client(message) else {
                continue;
            };
            let closing = matches!(message, Message::Close(_));
            if client_tx.send(message).await.is_err() || closing {
                break;
            }
        }
    };

    tokio::select! {
        _ = client_to_upstream => {}
        _ = upstream_to_client => {}
    }
}

fn to_upstream(message: Message) -> UpstreamMessage {
    match message {
        Message::Text(text) => UpstreamMessage::Text(text.as_str().to_owned().into()),
        Message::Binary(data) => UpstreamMessage::Binary(data),
        Message::Ping(data) => UpstreamMessage::Ping(data),
        Message::Pong(data) => UpstreamMessage::Pong(data),
        Message::Close(frame) => UpstreamMessage::Close(frame.map(|f| UpstreamCloseFrame {
            code: CloseCode::from(f.code),
            reason: f.reason.as_str().to_owned().into(),
        })),
    }
}

fn to_client(message: UpstreamMessage) -> Option<Message> {
    let message = match message {
        UpstreamMessage::Text(text) => Message::Text(text.as_str().to_owned().into()),
        UpstreamMessage::Binary(data) => Message::Binary(data),
        UpstreamMessage::Ping(data) => Message::Ping(data),
        UpstreamMessage::Pong(data) => Message::Pong(data),
        UpstreamMessage::Close(frame) => Message::Close(frame.map(|f| CloseFrame {
            code: u16::from(f.code),
            reason: f.reason.as_str().to_owned().into(),
        })),
        UpstreamMessage::Frame(_) => return None,
    };
    Some(message)
}
