//! Per-server request dispatch.
//!
//! # Responsibilities
//! - Hold one virtual server's derived state (domains, groups, routes, target)
//! - Run the dispatch steps: domain → access → route → action
//! - Expose the dispatcher as an Axum router for its listener
//!
//! # Design Decisions
//! - Everything a request needs is built at startup and shared via `Arc`
//! - The only state touched per request is the static handler cache and the
//!   weighted set's selection scores
//! - Rejections are `ProxyError`s turned into responses at the edge

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::Request,
    response::{IntoResponse, Response},
    Router,
};
use tokio::net::TcpListener;

use crate::config::HttpServerConfig;
use crate::http::forward::Forwarder;
use crate::http::request::{request_host, request_id, with_request_layers};
use crate::http::response::ProxyError;
use crate::http::static_files::{CacheKey, Scope, StaticHandlerCache};
use crate::load_balancer::UpstreamTarget;
use crate::plugins::{MiddlewareChain, RequestContext};
use crate::routing::matcher::{join_forward_path, strip_static_prefix};
use crate::routing::{HostMatcher, RouteAction, RouteTable};
use crate::security::AccessControl;

/// State shared by every listener.
#[derive(Debug, Default)]
pub struct GatewayContext {
    pub access: AccessControl,
    pub cache: StaticHandlerCache,
    pub forwarder: Forwarder,
    pub middleware: MiddlewareChain,
}

/// Derived, immutable state of one HTTP virtual server.
#[derive(Debug)]
pub struct VirtualServer {
    /// Position in the server list; part of the static cache key.
    pub index: usize,
    pub name: String,
    pub hosts: HostMatcher,
    pub access_groups: Vec<String>,
    pub routes: RouteTable,
    pub target: Option<UpstreamTarget>,
}

impl VirtualServer {
    pub fn new(index: usize, config: &HttpServerConfig, target: Option<UpstreamTarget>) -> Self {
        Self {
            index,
            name: config.name.clone(),
            hosts: HostMatcher::new(&config.domains),
            access_groups: config.allowed_hosts_groups.clone(),
            routes: RouteTable::from_config(&config.name, &config.routes),
            target,
        }
    }
}

/// Dispatches requests for one virtual server.
#[derive(Debug, Clone)]
pub struct ServerDispatcher {
    ctx: Arc<GatewayContext>,
    server: Arc<VirtualServer>,
    scope: Scope,
}

impl ServerDispatcher {
    pub fn new(ctx: Arc<GatewayContext>, server: Arc<VirtualServer>, scope: Scope) -> Self {
        Self { ctx, server, scope }
    }

    pub fn server(&self) -> &VirtualServer {
        &self.server
    }

    pub fn scope(&self) -> Scope {
        self.scope
    }

    /// Handle a request arriving on this server's own listener.
    pub async fn dispatch(&self, request: Request<Body>, peer: SocketAddr) -> Response {
        let result = match self.check_domain(&request) {
            Ok(()) => self.dispatch_matched(request, peer).await,
            Err(e) => Err(e),
        };
        self.respond(result, peer)
    }

    /// Handle a request whose host was already matched to this server.
    pub async fn dispatch_host_matched(&self, request: Request<Body>, peer: SocketAddr) -> Response {
        let result = self.dispatch_matched(request, peer).await;
        self.respond(result, peer)
    }

    fn respond(&self, result: Result<Response, ProxyError>, peer: SocketAddr) -> Response {
        result.unwrap_or_else(|e| {
            tracing::debug!(server = %self.server.name, peer = %peer, error = %e, "Request rejected");
            e.into_response()
        })
    }

    fn check_domain(&self, request: &Request<Body>) -> Result<(), ProxyError> {
        if self.server.hosts.matches(request_host(request)) {
            Ok(())
        } else {
            Err(ProxyError::UnknownDomain)
        }
    }

    async fn dispatch_matched(
        &self,
        request: Request<Body>,
        peer: SocketAddr,
    ) -> Result<Response, ProxyError> {
        // 1. Access groups
        if !self.server.access_groups.is_empty()
            && !self.ctx.access.is_allowed(peer.ip(), &self.server.access_groups)
        {
            tracing::warn!(
                server = %self.server.name,
                peer = %peer.ip(),
                groups = ?self.server.access_groups,
                "Connection not allowed by access groups"
            );
            return Err(ProxyError::AccessDenied);
        }

        // 2. Match Route
        let path = request.uri().path().to_string();
        let matched = self.server.routes.resolve(&path);
        if matched.is_none() && !self.server.routes.is_empty() {
            tracing::debug!(server = %self.server.name, path = %path, "No route matched");
            return Err(ProxyError::RouteNotFound);
        }

        // 3. Middlewares
        let ctx = RequestContext::new(&self.server.name, peer, &request);
        if let Some(response) = self.ctx.middleware.run(&ctx) {
            return Ok(response);
        }

        // 4. Route action
        match matched {
            Some((index, route)) => match &route.action {
                RouteAction::Static { root, index_pages } => {
                    let key = CacheKey {
                        scope: self.scope,
                        server: self.server.index,
                        route: index,
                    };
                    let handler = self.ctx.cache.get_or_build(key, root, *index_pages);
                    let rewritten = strip_static_prefix(&route.prefix, &path);
                    Ok(handler.serve(request, &rewritten, &path).await)
                }
                RouteAction::Forward { to } => {
                    let forwarded = join_forward_path(to.as_deref(), &path);
                    self.forward(request, peer, &forwarded).await
                }
            },
            None => self.forward(request, peer, &path).await,
        }
    }

    async fn forward(
        &self,
        request: Request<Body>,
        peer: SocketAddr,
        path: &str,
    ) -> Result<Response, ProxyError> {
        let upstream = self
            .server
            .target
            .as_ref()
            .and_then(UpstreamTarget::next)
            .ok_or(ProxyError::NoDestination)?;

        tracing::debug!(
            request_id = %request_id(&request),
            server = %self.server.name,
            upstream = %upstream,
            path = %path,
            "Proxying request"
        );

        self.ctx.forwarder.forward(upstream, request, path, peer).await
    }

    /// Axum router answering every request through this dispatcher.
    pub fn into_router(self) -> Router {
        with_request_layers(Router::new().fallback(dispatch_handler).with_state(self))
    }
}

async fn dispatch_handler(
    State(dispatcher): State<ServerDispatcher>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    request: Request<Body>,
) -> Response {
    dispatcher.dispatch(request, peer).await
}

/// Serve `router` on an already bound listener until it fails.
pub async fn serve(listener: TcpListener, router: Router) -> std::io::Result<()> {
    let addr = listener.local_addr()?;
    tracing::info!(address = %addr, "HTTP listener starting");

    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{RouteConfig, StaticRouteConfig};
    use axum::http::StatusCode;
    use std::collections::BTreeMap;
    use std::fs;

    fn peer(ip: [u8; 4]) -> SocketAddr {
        SocketAddr::from((ip, 50000))
    }

    fn context() -> Arc<GatewayContext> {
        let groups = BTreeMap::from([("internal".to_string(), vec!["10.0.0.0/30".to_string()])]);
        Arc::new(GatewayContext {
            access: AccessControl::resolve(&groups).unwrap(),
            ..GatewayContext::default()
        })
    }

    fn dispatcher(config: HttpServerConfig) -> ServerDispatcher {
        let server = VirtualServer::new(0, &config, None);
        ServerDispatcher::new(context(), Arc::new(server), Scope::DedicatedPort)
    }

    fn get(host: &str, path: &str) -> Request<Body> {
        Request::builder()
            .uri(path)
            .header("Host", host)
            .body(Body::empty())
            .unwrap()
    }

    async fn text(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_unknown_domain() {
        let d = dispatcher(HttpServerConfig {
            domains: vec!["a.example".into()],
            ..Default::default()
        });
        let response = d.dispatch(get("b.example", "/"), peer([1, 2, 3, 4])).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(text(response).await, "Unknown domain");
    }

    #[tokio::test]
    async fn test_access_groups() {
        let d = dispatcher(HttpServerConfig {
            allowed_hosts_groups: vec!["internal".into()],
            ..Default::default()
        });

        let denied = d.dispatch(get("x", "/"), peer([10, 0, 0, 3])).await;
        assert_eq!(denied.status(), StatusCode::FORBIDDEN);
        assert_eq!(text(denied).await, "Access denied");

        // Allowed peer passes the access check and hits the missing upstream.
        let allowed = d.dispatch(get("x", "/"), peer([10, 0, 0, 1])).await;
        assert_eq!(text(allowed).await, "No destination");
    }

    #[tokio::test]
    async fn test_route_not_found() {
        let d = dispatcher(HttpServerConfig {
            routes: vec![RouteConfig {
                value: "/api".into(),
                to: Some("/".into()),
                to_static: None,
            }],
            ..Default::default()
        });
        let response = d.dispatch(get("x", "/other"), peer([1, 1, 1, 1])).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(text(response).await, "Not found");
    }

    #[tokio::test]
    async fn test_static_route_is_served_and_cached() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("app.js"), "js").unwrap();

        let d = dispatcher(HttpServerConfig {
            routes: vec![
                RouteConfig {
                    value: "/static".into(),
                    to: None,
                    to_static: Some(StaticRouteConfig {
                        root: dir.path().to_path_buf(),
                        index_pages: false,
                    }),
                },
                RouteConfig {
                    value: "/".into(),
                    to: Some("/".into()),
                    to_static: None,
                },
            ],
            ..Default::default()
        });

        for _ in 0..3 {
            let response = d.dispatch(get("x", "/static/app.js"), peer([1, 1, 1, 1])).await;
            assert_eq!(response.status(), StatusCode::OK);
            assert_eq!(text(response).await, "js");
        }
        assert_eq!(d.ctx.cache.builds(), 1);

        let api = d.dispatch(get("x", "/api/users"), peer([1, 1, 1, 1])).await;
        assert_eq!(text(api).await, "No destination");
    }
}
