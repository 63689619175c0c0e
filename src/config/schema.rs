//! Configuration schema definitions.
//!
//! This module defines the complete topology the gateway is built from.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Resolver used for upstream host names when `dns` is not set.
pub const DEFAULT_DNS: &str = "1.1.1.1";

/// Root configuration for the gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ProxyConfig {
    /// DNS server used to resolve upstream host names (literal IP).
    pub dns: Option<String>,

    /// Log level and output format.
    pub logging: LoggingConfig,

    /// Plugins enabled for every server, in evaluation order.
    pub plugins: Vec<PluginConfig>,

    /// Access groups.
    pub security: SecurityConfig,

    /// HTTP virtual servers and the shared default port.
    pub http: HttpConfig,

    /// WebSocket virtual servers.
    pub websocket: WebSocketConfig,
}

impl ProxyConfig {
    /// Configured DNS server, or the public default.
    pub fn dns_server(&self) -> &str {
        self.dns.as_deref().unwrap_or(DEFAULT_DNS)
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error). `RUST_LOG` takes precedence.
    pub level: String,

    /// Output format.
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// A plugin enabled by name, with its options.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PluginConfig {
    pub name: String,

    /// Options checked against the schema the plugin registered.
    #[serde(default)]
    pub options: toml::Table,
}

/// Security configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct SecurityConfig {
    /// Access groups: name -> literal addresses and/or CIDR blocks.
    pub allowed_hosts_groups: BTreeMap<String, Vec<String>>,
}

/// HTTP configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Interface every listener binds to.
    pub bind_address: String,

    /// Port shared by all servers that did not request a dedicated one.
    pub default_port: u16,

    /// Fallback upstream for default-port requests no server claims.
    pub default: Option<DefaultUpstreamConfig>,

    /// Virtual servers.
    pub servers: Vec<HttpServerConfig>,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            default_port: 80,
            default: None,
            servers: Vec::new(),
        }
    }
}

/// Fallback upstream on the default port.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DefaultUpstreamConfig {
    #[serde(default = "default_local_host")]
    pub host: String,
    pub port: u16,
}

fn default_local_host() -> String {
    "127.0.0.1".to_string()
}

/// HTTP virtual server.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct HttpServerConfig {
    /// Server identifier for logging.
    pub name: String,

    /// Dedicated port. Unset, 0 or the default port share the default listener.
    pub port: Option<u16>,

    /// Accepted Host values (empty = any).
    pub domains: Vec<String>,

    /// Access groups a client must belong to (at least one).
    pub allowed_hosts_groups: Vec<String>,

    /// Backends for forwarded routes.
    pub upstream: Vec<UpstreamConfig>,

    /// Ordered routes; first prefix match wins.
    pub routes: Vec<RouteConfig>,

    /// Also serve HTTP/3 over QUIC on the same port.
    pub quic: bool,

    /// PEM certificate chain for QUIC.
    pub quic_certificate: Option<PathBuf>,

    /// PEM private key for QUIC.
    pub quic_key: Option<PathBuf>,
}

impl HttpServerConfig {
    /// Returns the dedicated port, or `None` if the server shares the default port.
    pub fn dedicated_port(&self, default_port: u16) -> Option<u16> {
        match self.port {
            None | Some(0) => None,
            Some(port) if port == default_port => None,
            Some(port) => Some(port),
        }
    }
}

/// Upstream backend.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UpstreamConfig {
    /// Literal address or host name resolved at startup.
    pub host: String,

    pub port: u16,

    /// Relative share of traffic (default: 1). Fractions are allowed.
    #[serde(default = "default_weight")]
    pub weight: f64,
}

fn default_weight() -> f64 {
    1.0
}

/// Route entry.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RouteConfig {
    /// Path prefix to match.
    pub value: String,

    /// Forward to the server's upstreams, joining this path in front.
    #[serde(default)]
    pub to: Option<String>,

    /// Serve files from disk instead of forwarding.
    #[serde(default)]
    pub to_static: Option<StaticRouteConfig>,
}

/// Static file route.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StaticRouteConfig {
    /// Directory files are served from.
    pub root: PathBuf,

    /// Generate listings for directories without an index file.
    #[serde(default)]
    pub index_pages: bool,
}

/// WebSocket configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct WebSocketConfig {
    pub servers: Vec<WebSocketServerConfig>,
}

/// WebSocket virtual server.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WebSocketServerConfig {
    pub name: String,

    pub port: u16,

    #[serde(default)]
    pub allowed_hosts_groups: Vec<String>,

    pub upstream: Vec<WebSocketUpstreamConfig>,
}

/// WebSocket upstream (no weighting).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WebSocketUpstreamConfig {
    pub host: String,
    pub port: u16,
}
