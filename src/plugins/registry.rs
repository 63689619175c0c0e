//! Plugin and middleware registry.
//!
//! # Responsibilities
//! - Keep the plugins known to this process and their option schemas
//! - Bind middleware factories to registered plugins
//! - Build the ordered middleware chain selected by configuration
//!
//! # Design Decisions
//! - The registry is an explicit value filled before any listener starts
//! - Options are checked against the schema before a middleware is built
//! - Plugins listed in configuration but unknown here are skipped with a warning

use std::collections::BTreeMap;
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::http::{HeaderMap, Method, Request, Uri};
use axum::response::Response;

use crate::config::PluginConfig;

/// Error type for plugin registration and chain construction.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PluginError {
    #[error("plugin '{0}' already registered")]
    AlreadyRegistered(String),

    #[error("plugin '{0}' is not registered")]
    NotRegistered(String),

    #[error("plugin '{plugin}': unknown option '{option}'")]
    UnknownOption { plugin: String, option: String },

    #[error("plugin '{plugin}': option '{option}' must be {expected}, got {found}")]
    OptionType {
        plugin: String,
        option: String,
        expected: OptionKind,
        found: OptionKind,
    },

    #[error("plugin '{plugin}': {message}")]
    InvalidOptions { plugin: String, message: String },
}

/// Type of a plugin option value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionKind {
    String,
    Integer,
    Float,
    Boolean,
    Datetime,
    Array,
    Table,
}

impl OptionKind {
    /// Kind of a configured value.
    pub fn of(value: &toml::Value) -> Self {
        match value {
            toml::Value::String(_) => OptionKind::String,
            toml::Value::Integer(_) => OptionKind::Integer,
            toml::Value::Float(_) => OptionKind::Float,
            toml::Value::Boolean(_) => OptionKind::Boolean,
            toml::Value::Datetime(_) => OptionKind::Datetime,
            toml::Value::Array(_) => OptionKind::Array,
            toml::Value::Table(_) => OptionKind::Table,
        }
    }
}

impl fmt::Display for OptionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OptionKind::String => "a string",
            OptionKind::Integer => "an integer",
            OptionKind::Float => "a float",
            OptionKind::Boolean => "a boolean",
            OptionKind::Datetime => "a datetime",
            OptionKind::Array => "an array",
            OptionKind::Table => "a table",
        };
        f.write_str(name)
    }
}

/// Option name → expected kind. Every option is optional.
pub type OptionsSchema = BTreeMap<String, OptionKind>;

/// Read-only view of a request handed to middlewares.
#[derive(Debug, Clone, Copy)]
pub struct RequestContext<'a> {
    pub server: &'a str,
    pub peer: SocketAddr,
    pub method: &'a Method,
    pub uri: &'a Uri,
    pub headers: &'a HeaderMap,
}

impl<'a> RequestContext<'a> {
    pub fn new<B>(server: &'a str, peer: SocketAddr, request: &'a Request<B>) -> Self {
        Self {
            server,
            peer,
            method: request.method(),
            uri: request.uri(),
            headers: request.headers(),
        }
    }
}

/// A request observer that may answer the request itself.
pub trait Middleware: Send + Sync {
    /// Return `Some` to short-circuit with that response.
    fn handle(&self, ctx: &RequestContext<'_>) -> Option<Response>;
}

type MiddlewareFactory =
    Arc<dyn Fn(&toml::Table) -> Result<Arc<dyn Middleware>, PluginError> + Send + Sync>;

struct RegisteredPlugin {
    schema: OptionsSchema,
    factory: Option<MiddlewareFactory>,
}

/// Registry of plugins available to the gateway.
#[derive(Default)]
pub struct PluginRegistry {
    plugins: BTreeMap<String, RegisteredPlugin>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the plugins shipped with the gateway.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        if let Err(e) = crate::plugins::access_log::register(&mut registry) {
            tracing::error!(error = %e, "Failed to register built-in plugin");
        }
        registry
    }

    /// Register a plugin and the options it accepts.
    pub fn register(&mut self, name: &str, schema: OptionsSchema) -> Result<(), PluginError> {
        if self.plugins.contains_key(name) {
            return Err(PluginError::AlreadyRegistered(name.to_string()));
        }
        self.plugins.insert(
            name.to_string(),
            RegisteredPlugin {
                schema,
                factory: None,
            },
        );
        tracing::info!(plugin = %name, "Plugin loaded");
        Ok(())
    }

    /// Attach the middleware of an already registered plugin.
    ///
    /// `factory` receives the plugin's validated options.
    pub fn register_middleware<F>(&mut self, name: &str, factory: F) -> Result<(), PluginError>
    where
        F: Fn(&toml::Table) -> Result<Arc<dyn Middleware>, PluginError> + Send + Sync + 'static,
    {
        let plugin = self
            .plugins
            .get_mut(name)
            .ok_or_else(|| PluginError::NotRegistered(name.to_string()))?;
        plugin.factory = Some(Arc::new(factory));
        tracing::info!(plugin = %name, "Middleware registered");
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.plugins.contains_key(name)
    }

    /// Build the middleware chain for the configured plugins, in order.
    pub fn build_chain(&self, configs: &[PluginConfig]) -> Result<MiddlewareChain, PluginError> {
        let mut chain = Vec::new();

        for config in configs {
            let Some(plugin) = self.plugins.get(&config.name) else {
                tracing::warn!(plugin = %config.name, "Plugin is not available, skipping");
                continue;
            };

            validate_options(&config.name, &plugin.schema, &config.options)?;

            if let Some(factory) = &plugin.factory {
                chain.push((config.name.clone(), factory(&config.options)?));
            }
        }

        Ok(MiddlewareChain { middlewares: chain })
    }
}

fn validate_options(
    plugin: &str,
    schema: &OptionsSchema,
    options: &toml::Table,
) -> Result<(), PluginError> {
    for (option, value) in options {
        let expected = schema
            .get(option)
            .copied()
            .ok_or_else(|| PluginError::UnknownOption {
                plugin: plugin.to_string(),
                option: option.clone(),
            })?;

        let found = OptionKind::of(value);
        if found != expected {
            return Err(PluginError::OptionType {
                plugin: plugin.to_string(),
                option: option.clone(),
                expected,
                found,
            });
        }
    }
    Ok(())
}

/// Ordered middlewares evaluated before a route's action.
#[derive(Clone, Default)]
pub struct MiddlewareChain {
    middlewares: Vec<(String, Arc<dyn Middleware>)>,
}

impl MiddlewareChain {
    /// Run every middleware until one answers.
    pub fn run(&self, ctx: &RequestContext<'_>) -> Option<Response> {
        for (name, middleware) in &self.middlewares {
            if let Some(response) = middleware.handle(ctx) {
                tracing::debug!(plugin = %name, server = %ctx.server, "Request answered by middleware");
                return Some(response);
            }
        }
        None
    }

    /// Plugin names in evaluation order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.middlewares.iter().map(|(name, _)| name.as_str())
    }

    pub fn len(&self) -> usize {
        self.middlewares.len()
    }

    pub fn is_empty(&self) -> bool {
        self.middlewares.is_empty()
    }
}

impl fmt::Debug for MiddlewareChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::StatusCode;
    use axum::response::IntoResponse;

    struct Deny;

    impl Middleware for Deny {
        fn handle(&self, ctx: &RequestContext<'_>) -> Option<Response> {
            (ctx.uri.path() == "/blocked").then(|| StatusCode::FORBIDDEN.into_response())
        }
    }

    fn plugin(name: &str, options: toml::Table) -> PluginConfig {
        PluginConfig {
            name: name.to_string(),
            options,
        }
    }

    fn registry_with_deny() -> PluginRegistry {
        let mut registry = PluginRegistry::new();
        let schema = OptionsSchema::from([("enabled".to_string(), OptionKind::Boolean)]);
        registry.register("deny", schema).unwrap();
        registry
            .register_middleware("deny", |_| Ok(Arc::new(Deny) as Arc<dyn Middleware>))
            .unwrap();
        registry
    }

    #[test]
    fn test_duplicate_registration() {
        let mut registry = registry_with_deny();
        assert_eq!(
            registry.register("deny", OptionsSchema::new()),
            Err(PluginError::AlreadyRegistered("deny".into()))
        );
    }

    #[test]
    fn test_middleware_needs_plugin() {
        let mut registry = PluginRegistry::new();
        let err = registry
            .register_middleware("ghost", |_| Ok(Arc::new(Deny) as Arc<dyn Middleware>))
            .unwrap_err();
        assert_eq!(err, PluginError::NotRegistered("ghost".into()));
    }

    #[test]
    fn test_option_validation() {
        let registry = registry_with_deny();

        let mut options = toml::Table::new();
        options.insert("enabled".into(), toml::Value::String("yes".into()));
        let err = registry.build_chain(&[plugin("deny", options)]).unwrap_err();
        assert!(matches!(err, PluginError::OptionType { .. }));

        let mut options = toml::Table::new();
        options.insert("colour".into(), toml::Value::Boolean(true));
        let err = registry.build_chain(&[plugin("deny", options)]).unwrap_err();
        assert!(matches!(err, PluginError::UnknownOption { .. }));
    }

    #[test]
    fn test_unknown_plugin_is_skipped() {
        let registry = registry_with_deny();
        let chain = registry
            .build_chain(&[plugin("missing", toml::Table::new()), plugin("deny", toml::Table::new())])
            .unwrap();
        assert_eq!(chain.names().collect::<Vec<_>>(), vec!["deny"]);
    }

    #[test]
    fn test_chain_short_circuits() {
        let registry = registry_with_deny();
        let chain = registry.build_chain(&[plugin("deny", toml::Table::new())]).unwrap();
        let peer: SocketAddr = "127.0.0.1:5000".parse().unwrap();

        let blocked = Request::builder().uri("/blocked").body(Body::empty()).unwrap();
        let response = chain.run(&RequestContext::new("s", peer, &blocked)).unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let allowed = Request::builder().uri("/ok").body(Body::empty()).unwrap();
        assert!(chain.run(&RequestContext::new("s", peer, &allowed)).is_none());
    }
}
