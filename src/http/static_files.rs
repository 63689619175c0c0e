//! Static file serving and the handler cache.
//!
//! # Responsibilities
//! - Serve files below a route's root directory
//! - Redirect, index or list directories
//! - Build one handler per (scope, server, route) on first use
//!
//! # Design Decisions
//! - Files are served by tower-http's `ServeDir` (content type, ranges,
//!   conditional requests)
//! - Directory handling happens before `ServeDir` so redirects use the path
//!   the client sent, not the rewritten one
//! - Cache entries are `OnceLock` cells: the map lock is only held to fetch
//!   the cell, construction runs outside it, and a key is built at most once

use std::fmt::Write as _;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};

use axum::body::Body;
use axum::http::uri::PathAndQuery;
use axum::http::{header, Request, StatusCode, Uri};
use axum::response::{Html, IntoResponse, Response};
use dashmap::DashMap;
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, CONTROLS};
use tower::ServiceExt;
use tower_http::services::ServeDir;

use crate::http::response::ProxyError;

/// File served for directory requests.
pub const INDEX_FILE: &str = "index.html";

const SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'/')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

/// Listener family a handler belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    DefaultPort,
    DedicatedPort,
}

/// Identity of a cached static handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub scope: Scope,
    pub server: usize,
    pub route: usize,
}

/// File server for one static route.
#[derive(Debug, Clone)]
pub struct StaticHandler {
    root: PathBuf,
    index_pages: bool,
    files: ServeDir,
}

impl StaticHandler {
    pub fn new(root: impl Into<PathBuf>, index_pages: bool) -> Self {
        let root = root.into();
        Self {
            files: ServeDir::new(&root).append_index_html_on_directories(true),
            root,
            index_pages,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn index_pages(&self) -> bool {
        self.index_pages
    }

    /// Serve `path` (relative to the root, still percent-encoded).
    ///
    /// `client_path` is the path as the client sent it, used for redirects
    /// and listing titles.
    pub async fn serve(&self, request: Request<Body>, path: &str, client_path: &str) -> Response {
        let Some(relative) = relative_path(path) else {
            return ProxyError::RouteNotFound.into_response();
        };
        let fs_path = self.root.join(&relative);

        let is_dir = tokio::fs::metadata(&fs_path)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false);

        if is_dir {
            if !path.ends_with('/') {
                let location = match request.uri().query() {
                    Some(q) => format!("{client_path}/?{q}"),
                    None => format!("{client_path}/"),
                };
                return (StatusCode::MOVED_PERMANENTLY, [(header::LOCATION, location)])
                    .into_response();
            }

            let has_index = tokio::fs::metadata(fs_path.join(INDEX_FILE))
                .await
                .map(|m| m.is_file())
                .unwrap_or(false);

            if !has_index {
                if !self.index_pages {
                    return (StatusCode::FORBIDDEN, "Directory index is forbidden").into_response();
                }
                return match render_listing(&fs_path, client_path).await {
                    Ok(html) => Html(html).into_response(),
                    Err(e) => {
                        tracing::warn!(path = %fs_path.display(), error = %e, "Directory listing failed");
                        ProxyError::RouteNotFound.into_response()
                    }
                };
            }
        }

        self.serve_file(request, path).await
    }

    async fn serve_file(&self, request: Request<Body>, path: &str) -> Response {
        let (mut parts, body) = request.into_parts();

        let path_and_query = match parts.uri.query() {
            Some(q) => format!("{path}?{q}"),
            None => path.to_string(),
        };
        let uri = PathAndQuery::try_from(path_and_query)
            .ok()
            .and_then(|pq| Uri::builder().path_and_query(pq).build().ok());
        let Some(uri) = uri else {
            return ProxyError::RouteNotFound.into_response();
        };
        parts.uri = uri;

        match self.files.clone().oneshot(Request::from_parts(parts, body)).await {
            Ok(response) => response.map(Body::new),
            Err(never) => match never {},
        }
    }
}

/// Decode `path` and turn it into a root-relative path.
///
/// Returns `None` for undecodable paths and any `..` segment.
fn relative_path(path: &str) -> Option<PathBuf> {
    let decoded = percent_decode_str(path).decode_utf8().ok()?;
    let mut relative = PathBuf::new();
    for component in Path::new(decoded.as_ref()).components() {
        match component {
            Component::RootDir | Component::CurDir => {}
            Component::Normal(segment) => relative.push(segment),
            Component::ParentDir | Component::Prefix(_) => return None,
        }
    }
    Some(relative)
}

async fn render_listing(dir: &Path, client_path: &str) -> io::Result<String> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    let mut items: Vec<(String, bool)> = Vec::new();

    while let Some(entry) = entries.next_entry().await? {
        let is_dir = entry.file_type().await?.is_dir();
        if let Ok(name) = entry.file_name().into_string() {
            items.push((name, is_dir));
        }
    }
    items.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

    let title = html_escape::encode_text(client_path);
    let mut body = format!(
        "<!DOCTYPE html><html><head><title>{title}</title></head><body><h1>{title}</h1><ul>"
    );
    if client_path != "/" {
        body.push_str("<li><a href=\"../\">..</a></li>");
    }
    for (name, is_dir) in items {
        let slash = if is_dir { "/" } else { "" };
        let _ = write!(
            body,
            "<li><a href=\"{href}{slash}\">{display}{slash}</a></li>",
            href = utf8_percent_encode(&name, SEGMENT),
            display = html_escape::encode_text(&name),
        );
    }
    body.push_str("</ul></body></html>");
    Ok(body)
}

/// Lazily built static handlers, shared by all listeners.
#[derive(Debug, Default)]
pub struct StaticHandlerCache {
    handlers: DashMap<CacheKey, Arc<OnceLock<Arc<StaticHandler>>>>,
    builds: AtomicUsize,
}

impl StaticHandlerCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handler for `key`, built from `root` and `index_pages` on first use.
    pub fn get_or_build(&self, key: CacheKey, root: &Path, index_pages: bool) -> Arc<StaticHandler> {
        let cell = match self.handlers.get(&key) {
            Some(cell) => cell.value().clone(),
            None => self.handlers.entry(key).or_default().value().clone(),
        };

        let handler = cell.get_or_init(|| {
            self.builds.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(
                scope = ?key.scope,
                server = key.server,
                route = key.route,
                root = %root.display(),
                "Static handler built"
            );
            Arc::new(StaticHandler::new(root, index_pages))
        });

        Arc::clone(handler)
    }

    /// Number of handlers constructed so far.
    pub fn builds(&self) -> usize {
        self.builds.load(Ordering::Relaxed)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}
