//! Request inspection and request-id plumbing.
//!
//! # Responsibilities
//! - Generate a unique request ID (UUID v4) on every listener
//! - Extract routing-relevant information (host)
//!
//! # Design Decisions
//! - Request ID added as early as possible for tracing
//! - An ID supplied by the client is kept and echoed back

use axum::http::{header, HeaderValue, Request};
use axum::Router;
use tower_http::request_id::{
    MakeRequestId, PropagateRequestIdLayer, RequestId, SetRequestIdLayer,
};
use tower_http::trace::TraceLayer;
use uuid::Uuid;

/// Header carrying the request ID.
pub const X_REQUEST_ID: &str = "x-request-id";

/// Generates UUID v4 request IDs.
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidRequestId;

impl MakeRequestId for UuidRequestId {
    fn make_request_id<B>(&mut self, _request: &Request<B>) -> Option<RequestId> {
        HeaderValue::from_str(&Uuid::new_v4().to_string())
            .ok()
            .map(RequestId::new)
    }
}

/// Wrap a listener's router with request-id and trace layers.
pub fn with_request_layers<S>(router: Router<S>) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    router
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::x_request_id(UuidRequestId))
}

/// Host the client asked for: `Host` header first, then the URI authority.
pub fn request_host<B>(request: &Request<B>) -> Option<&str> {
    request
        .headers()
        .get(header::HOST)
        .and_then(|h| h.to_str().ok())
        .filter(|h| !h.is_empty())
        .or_else(|| request.uri().authority().map(|a| a.as_str()))
}

/// Request ID assigned by [`with_request_layers`], if any.
pub fn request_id<B>(request: &Request<B>) -> &str {
    request
        .headers()
        .get(X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;

    #[test]
    fn test_host_from_header() {
        let req = Request::builder()
            .uri("/path")
            .header("Host", "a.example:8080")
            .body(Body::empty())
            .unwrap();
        assert_eq!(request_host(&req), Some("a.example:8080"));
    }

    #[test]
    fn test_host_from_authority() {
        let req = Request::builder()
            .uri("https://b.example/path")
            .body(Body::empty())
            .unwrap();
        assert_eq!(request_host(&req), Some("b.example"));
    }

    #[test]
    fn test_missing_host() {
        let req = Request::builder().uri("/path").body(Body::empty()).unwrap();
        assert_eq!(request_host(&req), None);
        assert_eq!(request_id(&req), "unknown");
    }

    #[test]
    fn test_uuid_request_id() {
        let req = Request::builder().body(Body::empty()).unwrap();
        let id = UuidRequestId.make_request_id(&req).unwrap();
        let id = id.header_value().to_str().unwrap();
        assert_eq!(id.len(), 36);
    }
}
