//! Startup orchestration.
//!
//! # Responsibilities
//! - Derive every runtime structure from the configuration
//! - Resolve upstream host names and access groups
//! - Bind all sockets before any listener task runs
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Subsystems initialize in order, not concurrently
//! - Listeners start last (traffic only when ready)

use std::io;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use tokio::net::TcpListener;

use crate::config::{validate_config, ConfigError, HttpServerConfig, ProxyConfig};
use crate::http::static_files::{Scope, StaticHandlerCache};
use crate::http::{
    server, DefaultPortMultiplexer, Forwarder, GatewayContext, QuicFrontend, ServerDispatcher,
    VirtualServer, WebSocketProxy,
};
use crate::lifecycle::supervisor::ListenerSupervisor;
use crate::load_balancer::{select, AuxiliaryListener, ResolvedUpstream};
use crate::net::{quic_server_config, DnsError, DnsResolver, TlsError};
use crate::plugins::{PluginError, PluginRegistry};
use crate::security::{AccessControl, AccessControlError};

/// Error type for fatal startup failures.
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Access(#[from] AccessControlError),

    #[error(transparent)]
    Dns(#[from] DnsError),

    #[error(transparent)]
    Plugin(#[from] PluginError),

    #[error("server '{server}': {source}")]
    Tls {
        server: String,
        #[source]
        source: TlsError,
    },

    #[error("server '{server}': QUIC requires exactly one upstream, found {count}")]
    QuicUpstreams { server: String, count: usize },

    #[error("server '{0}': QUIC requires a certificate and a key")]
    QuicMaterial(String),

    #[error("invalid bind address '{0}'")]
    BindAddress(String),

    #[error("failed to bind {kind} listener '{name}' on {addr}: {source}")]
    Bind {
        kind: &'static str,
        name: String,
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("server '{server}': failed to create auxiliary listener: {source}")]
    Auxiliary {
        server: String,
        #[source]
        source: io::Error,
    },
}

struct DedicatedServer {
    port: u16,
    dispatcher: ServerDispatcher,
    quic: Option<quinn::ServerConfig>,
}

/// Everything the gateway serves, derived from one configuration.
pub struct Gateway {
    bind_ip: IpAddr,
    default_port: u16,
    ctx: Arc<GatewayContext>,
    dedicated: Vec<DedicatedServer>,
    multiplexer: Option<DefaultPortMultiplexer>,
    websockets: Vec<(u16, WebSocketProxy)>,
    auxiliaries: Vec<(String, AuxiliaryListener)>,
}

impl Gateway {
    /// Build the gateway. Only auxiliary listeners are bound at this point.
    pub async fn build(config: &ProxyConfig, registry: &PluginRegistry) -> Result<Self, StartupError> {
        // 1. Validate
        validate_config(config).map_err(ConfigError::Validation)?;

        let bind_ip: IpAddr = config
            .http
            .bind_address
            .parse()
            .map_err(|_| StartupError::BindAddress(config.http.bind_address.clone()))?;

        let dns = DnsResolver::new(config.dns_server())?;

        // 2. Access groups
        let access = AccessControl::resolve(&config.security.allowed_hosts_groups)?;
        for server in &config.http.servers {
            access.ensure_groups(&server.name, &server.allowed_hosts_groups)?;
        }
        for server in &config.websocket.servers {
            access.ensure_groups(&server.name, &server.allowed_hosts_groups)?;
        }

        // 3. Plugins
        let middleware = registry.build_chain(&config.plugins)?;
        tracing::info!(plugins = middleware.len(), "Middleware chain built");

        let ctx = Arc::new(GatewayContext {
            access,
            cache: StaticHandlerCache::new(),
            forwarder: Forwarder::new(),
            middleware,
        });

        // 4. HTTP servers
        let default_port = config.http.default_port;
        let mut dedicated = Vec::new();
        let mut shared = Vec::new();
        let mut auxiliaries = Vec::new();

        for (index, server_config) in config.http.servers.iter().enumerate() {
            let resolved = resolve_upstreams(&dns, server_config).await?;
            let selection = select(&server_config.name, &resolved).map_err(|source| {
                StartupError::Auxiliary {
                    server: server_config.name.clone(),
                    source,
                }
            })?;
            auxiliaries.extend(
                selection
                    .auxiliaries
                    .into_iter()
                    .map(|aux| (server_config.name.clone(), aux)),
            );

            let server = Arc::new(VirtualServer::new(index, server_config, selection.target));

            match server_config.dedicated_port(default_port) {
                Some(port) => {
                    let quic = if server_config.quic {
                        Some(quic_config(server_config)?)
                    } else {
                        None
                    };
                    dedicated.push(DedicatedServer {
                        port,
                        dispatcher: ServerDispatcher::new(ctx.clone(), server, Scope::DedicatedPort),
                        quic,
                    });
                }
                None => shared.push(ServerDispatcher::new(ctx.clone(), server, Scope::DefaultPort)),
            }
        }

        // 5. Default port
        let fallback = match &config.http.default {
            Some(default) => Some(SocketAddr::new(dns.resolve(&default.host).await?, default.port)),
            None => None,
        };
        let multiplexer = (!shared.is_empty() || fallback.is_some())
            .then(|| DefaultPortMultiplexer::new(shared, fallback, ctx.forwarder.clone()));

        // 6. WebSocket servers
        let mut websockets = Vec::new();
        for ws in &config.websocket.servers {
            let mut upstreams = Vec::with_capacity(ws.upstream.len());
            for upstream in &ws.upstream {
                upstreams.push(SocketAddr::new(dns.resolve(&upstream.host).await?, upstream.port));
            }
            websockets.push((ws.port, WebSocketProxy::new(ws, ctx.clone(), upstreams)));
        }

        tracing::info!(
            dedicated = dedicated.len(),
            default_port = multiplexer.is_some(),
            websocket = websockets.len(),
            auxiliary = auxiliaries.len(),
            "Gateway built"
        );

        Ok(Self {
            bind_ip,
            default_port,
            ctx,
            dedicated,
            multiplexer,
            websockets,
            auxiliaries,
        })
    }

    pub fn context(&self) -> &Arc<GatewayContext> {
        &self.ctx
    }

    /// Bind every listener and hand them to a supervisor, not yet running.
    pub async fn bind(self) -> Result<ListenerSupervisor, StartupError> {
        let mut supervisor = ListenerSupervisor::new();

        for server in self.dedicated {
            let name = server.dispatcher.server().name.clone();
            let addr = SocketAddr::new(self.bind_ip, server.port);

            let listener = bind_tcp("http", &name, addr).await?;
            supervisor.add(
                format!("http:{name}"),
                addr,
                server::serve(listener, server.dispatcher.clone().into_router()),
            );

            if let Some(quic) = server.quic {
                let frontend = QuicFrontend::bind(addr, quic, server.dispatcher).map_err(|source| {
                    StartupError::Bind {
                        kind: "quic",
                        name: name.clone(),
                        addr,
                        source,
                    }
                })?;
                supervisor.add(format!("quic:{name}"), addr, frontend.run());
            }
        }

        if let Some(mux) = self.multiplexer {
            let addr = SocketAddr::new(self.bind_ip, self.default_port);
            let listener = bind_tcp("http", "default", addr).await?;
            supervisor.add("http:default", addr, server::serve(listener, mux.into_router()));
        }

        for (port, proxy) in self.websockets {
            let name = proxy.name().to_string();
            let addr = SocketAddr::new(self.bind_ip, port);
            let listener = bind_tcp("websocket", &name, addr).await?;
            supervisor.add(format!("websocket:{name}"), addr, server::serve(listener, proxy.into_router()));
        }

        for (server, aux) in self.auxiliaries {
            let addr = aux.local_addr();
            supervisor.add(format!("auxiliary:{server}"), addr, aux.run());
        }

        Ok(supervisor)
    }
}

async fn resolve_upstreams(
    dns: &DnsResolver,
    server: &HttpServerConfig,
) -> Result<Vec<ResolvedUpstream>, StartupError> {
    let mut resolved = Vec::with_capacity(server.upstream.len());
    for upstream in &server.upstream {
        let ip = dns.resolve(&upstream.host).await?;
        resolved.push(ResolvedUpstream {
            addr: SocketAddr::new(ip, upstream.port),
            weight: upstream.weight,
        });
    }
    Ok(resolved)
}

fn quic_config(server: &HttpServerConfig) -> Result<quinn::ServerConfig, StartupError> {
    if server.upstream.len() != 1 {
        return Err(StartupError::QuicUpstreams {
            server: server.name.clone(),
            count: server.upstream.len(),
        });
    }
    let (Some(cert), Some(key)) = (&server.quic_certificate, &server.quic_key) else {
        return Err(StartupError::QuicMaterial(server.name.clone()));
    };
    quic_server_config(cert, key).map_err(|source| StartupError::Tls {
        server: server.name.clone(),
        source,
    })
}

async fn bind_tcp(kind: &'static str, name: &str, addr: SocketAddr) -> Result<TcpListener, StartupError> {
    TcpListener::bind(addr).await.map_err(|source| StartupError::Bind {
        kind,
        name: name.to_string(),
        addr,
        source,
    })
}
