//! Built-in `access_log` plugin: one log event per request.

use std::sync::Arc;

use axum::response::Response;
use tracing::Level;

use crate::plugins::registry::{
    Middleware, OptionKind, OptionsSchema, PluginError, PluginRegistry, RequestContext,
};

pub const NAME: &str = "access_log";

/// Logs method, path and peer of every request reaching a route action.
#[derive(Debug, Clone, Copy)]
pub struct AccessLog {
    level: Level,
}

impl AccessLog {
    pub fn new(level: Level) -> Self {
        Self { level }
    }

    fn from_options(options: &toml::Table) -> Result<Self, PluginError> {
        let level = match options.get("level").and_then(toml::Value::as_str) {
            None => Level::INFO,
            Some(raw) => raw.parse().map_err(|_| PluginError::InvalidOptions {
                plugin: NAME.to_string(),
                message: format!("unknown log level '{raw}'"),
            })?,
        };
        Ok(Self::new(level))
    }
}

impl Middleware for AccessLog {
    fn handle(&self, ctx: &RequestContext<'_>) -> Option<Response> {
        macro_rules! access {
            ($lvl:expr) => {
                tracing::event!(
                    $lvl,
                    server = %ctx.server,
                    peer = %ctx.peer,
                    method = %ctx.method,
                    uri = %ctx.uri,
                    "Request"
                )
            };
        }

        match self.level {
            Level::TRACE => access!(Level::TRACE),
            Level::DEBUG => access!(Level::DEBUG),
            Level::INFO => access!(Level::INFO),
            Level::WARN => access!(Level::WARN),
            _ => access!(Level::ERROR),
        }
        None
    }
}

/// Register the plugin and its middleware.
pub fn register(registry: &mut PluginRegistry) -> Result<(), PluginError> {
    registry.register(
        NAME,
        OptionsSchema::from([("level".to_string(), OptionKind::String)]),
    )?;
    registry.register_middleware(NAME, |options| {
        Ok(Arc::new(AccessLog::from_options(options)?) as Arc<dyn Middleware>)
    })
}
