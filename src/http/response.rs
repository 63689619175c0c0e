//! Request-time errors and their responses.
//!
//! # Design Decisions
//! - Every rejection is a short plain-text body with a fixed status
//! - Upstream failures become 502; no retry, no failover

use std::net::SocketAddr;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Error type for request dispatch.
#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    #[error("Unknown domain")]
    UnknownDomain,

    #[error("Access denied")]
    AccessDenied,

    #[error("No destination")]
    NoDestination,

    #[error("Not found")]
    RouteNotFound,

    #[error("Upstream {upstream} failed: {source}")]
    Upstream {
        upstream: SocketAddr,
        #[source]
        source: BoxError,
    },
}

impl ProxyError {
    pub fn upstream(upstream: SocketAddr, source: impl Into<BoxError>) -> Self {
        ProxyError::Upstream {
            upstream,
            source: source.into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ProxyError::UnknownDomain | ProxyError::AccessDenied | ProxyError::NoDestination => {
                StatusCode::FORBIDDEN
            }
            ProxyError::RouteNotFound => StatusCode::NOT_FOUND,
            ProxyError::Upstream { .. } => StatusCode::BAD_GATEWAY,
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let body = match &self {
            ProxyError::Upstream { .. } => "Upstream request failed".to_string(),
            other => other.to_string(),
        };
        (self.status(), body).into_response()
    }
}
