//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → ProxyConfig (validated, immutable)
//!     → lifecycle::startup builds the derived routing structures from it
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require a restart
//! - Sections have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{
    DefaultUpstreamConfig, HttpConfig, HttpServerConfig, LogFormat, LoggingConfig, PluginConfig,
    ProxyConfig, RouteConfig, SecurityConfig, StaticRouteConfig, UpstreamConfig, WebSocketConfig,
    WebSocketServerConfig, WebSocketUpstreamConfig,
};
pub use validation::{validate_config, ValidationError};
