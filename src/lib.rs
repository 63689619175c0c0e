//! Edge gateway library: HTTP, WebSocket and HTTP/3 reverse proxy.

pub mod config;
pub mod http;
pub mod lifecycle;
pub mod load_balancer;
pub mod net;
pub mod observability;
pub mod plugins;
pub mod routing;
pub mod security;

pub use config::schema::ProxyConfig;
pub use lifecycle::{Gateway, GatewayError, StartupError};
pub use plugins::PluginRegistry;
