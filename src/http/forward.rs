//! Forwarding of HTTP requests to upstreams.
//!
//! # Responsibilities
//! - Send a request to one upstream address over a pooled client
//! - Rewrite the request target, keep the client's Host
//! - Strip hop-by-hop headers in both directions
//! - Append the client address to `X-Forwarded-For`
//!
//! # Design Decisions
//! - Upstreams always speak HTTP/1.1 over plain TCP
//! - Bodies are streamed, never buffered
//! - One attempt per request

use std::net::SocketAddr;

use axum::body::Body;
use axum::http::uri::{Authority, PathAndQuery, Scheme};
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, Request, Uri, Version};
use axum::response::Response;
use hyper_util::client::legacy::{connect::HttpConnector, Client};
use hyper_util::rt::TokioExecutor;

use crate::http::response::ProxyError;

const X_FORWARDED_FOR: &str = "x-forwarded-for";

static HOP_BY_HOP: [HeaderName; 8] = [
    header::CONNECTION,
    HeaderName::from_static("keep-alive"),
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
];

/// HTTP client shared by every server.
#[derive(Debug, Clone)]
pub struct Forwarder {
    client: Client<HttpConnector, Body>,
}

impl Default for Forwarder {
    fn default() -> Self {
        Self::new()
    }
}

impl Forwarder {
    pub fn new() -> Self {
        let client = Client::builder(TokioExecutor::new()).build(HttpConnector::new());
        Self { client }
    }

    /// Forward `request` to `upstream`, replacing its path with `path`.
    pub async fn forward(
        &self,
        upstream: SocketAddr,
        request: Request<Body>,
        path: &str,
        peer: SocketAddr,
    ) -> Result<Response, ProxyError> {
        let (mut parts, body) = request.into_parts();

        let uri = upstream_uri(upstream, path, parts.uri.query())
            .map_err(|e| ProxyError::upstream(upstream, e))?;

        if !parts.headers.contains_key(header::HOST) {
            if let Some(authority) = parts.uri.authority() {
                if let Ok(host) = HeaderValue::from_str(authority.as_str()) {
                    parts.headers.insert(header::HOST, host);
                }
            }
        }
        strip_hop_by_hop(&mut parts.headers);
        append_forwarded_for(&mut parts.headers, peer);

        parts.uri = uri;
        parts.version = Version::HTTP_11;

        tracing::debug!(upstream = %upstream, uri = %parts.uri, "Forwarding request");

        let response = self
            .client
            .request(Request::from_parts(parts, body))
            .await
            .map_err(|e| {
                tracing::error!(upstream = %upstream, error = %e, "Upstream error");
                ProxyError::upstream(upstream, e)
            })?;

        let (mut parts, body) = response.into_parts();
        strip_hop_by_hop(&mut parts.headers);
        Ok(Response::from_parts(parts, Body::new(body)))
    }
}

fn upstream_uri(upstream: SocketAddr, path: &str, query: Option<&str>) -> Result<Uri, axum::http::Error> {
    let path_and_query = match query {
        Some(q) => format!("{path}?{q}"),
        None => path.to_string(),
    };
    Uri::builder()
        .scheme(Scheme::HTTP)
        .authority(Authority::try_from(upstream.to_string())?)
        .path_and_query(PathAndQuery::try_from(path_and_query)?)
        .build()
}

/// Remove hop-by-hop headers, including those named in `Connection`.
pub fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let named: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();

    for name in named.iter().chain(HOP_BY_HOP.iter()) {
        headers.remove(name);
    }
}

fn append_forwarded_for(headers: &mut HeaderMap, peer: SocketAddr) {
    let ip = peer.ip().to_canonical().to_string();
    let value = match headers.get(X_FORWARDED_FOR).and_then(|v| v.to_str().ok()) {
        Some(existing) if !existing.is_empty() => format!("{existing}, {ip}"),
        _ => ip,
    };
    if let Ok(value) = HeaderValue::from_str(&value) {
        headers.insert(X_FORWARDED_FOR, value);
    }
}
