//! Shared default-port listener.
//!
//! # Responsibilities
//! - Serve every server that did not ask for a dedicated port
//! - Pick the server by Host header, first registered match wins
//! - Fall back to the configured local upstream when no server claims a host
//!
//! # Design Decisions
//! - Only listed domains are matched here; a server without domains cannot be
//!   told apart from its neighbours on a shared port
//! - Matched requests use the default-port static cache scope

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::Request,
    response::{IntoResponse, Response},
    Router,
};

use crate::http::forward::Forwarder;
use crate::http::request::{request_host, with_request_layers};
use crate::http::response::ProxyError;
use crate::http::server::ServerDispatcher;

/// Host-based multiplexer for the default port.
#[derive(Debug, Clone)]
pub struct DefaultPortMultiplexer {
    servers: Arc<[ServerDispatcher]>,
    fallback: Option<SocketAddr>,
    forwarder: Forwarder,
}

impl DefaultPortMultiplexer {
    pub fn new(servers: Vec<ServerDispatcher>, fallback: Option<SocketAddr>, forwarder: Forwarder) -> Self {
        for server in &servers {
            if server.server().hosts.is_any() {
                tracing::warn!(
                    server = %server.server().name,
                    "Server on the default port has no domains and will not receive requests"
                );
            }
        }

        Self {
            servers: servers.into(),
            fallback,
            forwarder,
        }
    }

    pub fn servers(&self) -> &[ServerDispatcher] {
        &self.servers
    }

    pub fn fallback(&self) -> Option<SocketAddr> {
        self.fallback
    }

    /// Route a request to the server claiming its host.
    pub async fn dispatch(&self, request: Request<Body>, peer: SocketAddr) -> Response {
        let Some(host) = request_host(&request) else {
            return ProxyError::UnknownDomain.into_response();
        };

        if let Some(server) = self
            .servers
            .iter()
            .find(|s| s.server().hosts.matches_listed(Some(host)))
        {
            return server.dispatch_host_matched(request, peer).await;
        }

        match self.fallback {
            Some(upstream) => {
                let path = request.uri().path().to_string();
                self.forwarder
                    .forward(upstream, request, &path, peer)
                    .await
                    .unwrap_or_else(IntoResponse::into_response)
            }
            None => ProxyError::NoDestination.into_response(),
        }
    }

    pub fn into_router(self) -> Router {
        with_request_layers(Router::new().fallback(multiplex_handler).with_state(self))
    }
}

async fn multiplex_handler(
    State(mux): State<DefaultPortMultiplexer>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    request: Request<Body>,
) -> Response {
    mux.dispatch(request, peer).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{HttpServerConfig, RouteConfig};
    use crate::http::server::{GatewayContext, VirtualServer};
    use crate::http::static_files::Scope;
    use axum::http::StatusCode;

    fn server(index: usize, name: &str, domains: &[&str]) -> ServerDispatcher {
        let config = HttpServerConfig {
            name: name.to_string(),
            domains: domains.iter().map(|d| d.to_string()).collect(),
            routes: vec![RouteConfig {
                value: "/api".to_string(),
                to: Some("/".to_string()),
                to_static: None,
            }],
            ..Default::default()
        };
        ServerDispatcher::new(
            Arc::new(GatewayContext::default()),
            Arc::new(VirtualServer::new(index, &config, None)),
            Scope::DefaultPort,
        )
    }

    fn peer() -> SocketAddr {
        "127.0.0.1:40000".parse().unwrap()
    }

    async fn text(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_missing_host() {
        let mux = DefaultPortMultiplexer::new(vec![server(0, "a", &["a.example"])], None, Forwarder::new());
        let request = Request::builder().uri("/").body(Body::empty()).unwrap();
        let response = mux.dispatch(request, peer()).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(text(response).await, "Unknown domain");
    }

    #[tokio::test]
    async fn test_unclaimed_host_without_fallback() {
        let mux = DefaultPortMultiplexer::new(vec![server(0, "a", &["a.example"])], None, Forwarder::new());
        let request = Request::builder()
            .uri("/")
            .header("Host", "z.example")
            .body(Body::empty())
            .unwrap();
        let response = mux.dispatch(request, peer()).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(text(response).await, "No destination");
    }

    #[tokio::test]
    async fn test_claimed_host_is_dispatched() {
        let mux = DefaultPortMultiplexer::new(
            vec![server(0, "a", &["a.example"]), server(1, "b", &["b.example"])],
            None,
            Forwarder::new(),
        );
        let request = Request::builder()
            .uri("/")
            .header("Host", "B.example:80")
            .body(Body::empty())
            .unwrap();
        // Reaches server "b", whose routes do not cover "/".
        let response = mux.dispatch(request, peer()).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
