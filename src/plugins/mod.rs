//! Plugin subsystem.
//!
//! # Data Flow
//! ```text
//! Startup:
//!     PluginRegistry::with_builtins()
//!     → [[plugins]] from configuration (name + options)
//!     → registry.rs (validate options, build MiddlewareChain)
//!
//! Per request (after route match, before the route action):
//!     MiddlewareChain::run(RequestContext)
//!     → Some(response) short-circuits, None continues
//! ```
//!
//! # Design Decisions
//! - Native middlewares behind one trait; no embedded script runtime
//! - One chain shared by all servers

pub mod access_log;
pub mod registry;

pub use registry::{
    Middleware, MiddlewareChain, OptionKind, OptionsSchema, PluginError, PluginRegistry,
    RequestContext,
};
