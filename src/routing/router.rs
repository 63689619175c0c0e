//! Route lookup.
//!
//! # Responsibilities
//! - Store compiled routes of one server
//! - Return the first route whose prefix matches the path
//!
//! # Design Decisions
//! - Immutable after construction (thread-safe without locks)
//! - O(n) prefix scan in declaration order
//! - Explicit no-match rather than silent default

use std::path::PathBuf;

use crate::config::RouteConfig;
use crate::routing::matcher::wildcard_pattern;

/// What a matched route does with the request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteAction {
    /// Forward to the server's upstreams, joining `to` in front of the path.
    Forward { to: Option<String> },
    /// Serve files below `root`.
    Static { root: PathBuf, index_pages: bool },
}

/// A compiled route.
#[derive(Debug, Clone)]
pub struct RouteEntry {
    pub prefix: String,
    pub pattern: String,
    pub action: RouteAction,
}

/// Ordered routes of one virtual server.
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    routes: Vec<RouteEntry>,
}

impl RouteTable {
    /// Compile routes from configuration, keeping declaration order.
    pub fn from_config(server: &str, routes: &[RouteConfig]) -> Self {
        let routes = routes
            .iter()
            .map(|route| {
                let action = match &route.to_static {
                    Some(st) => RouteAction::Static {
                        root: st.root.clone(),
                        index_pages: st.index_pages,
                    },
                    None => RouteAction::Forward {
                        to: route.to.clone(),
                    },
                };
                let entry = RouteEntry {
                    prefix: route.value.clone(),
                    pattern: wildcard_pattern(&route.value),
                    action,
                };
                tracing::debug!(server = %server, pattern = %entry.pattern, "Route registered");
                entry
            })
            .collect();

        Self { routes }
    }

    /// First route whose prefix matches `path`, with its index.
    pub fn resolve(&self, path: &str) -> Option<(usize, &RouteEntry)> {
        self.routes
            .iter()
            .enumerate()
            .find(|(_, r)| path.starts_with(&r.prefix))
    }

    pub fn routes(&self) -> &[RouteEntry] {
        &self.routes
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }
}
