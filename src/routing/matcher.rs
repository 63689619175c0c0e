//! Matching and path rewriting helpers.
//!
//! # Responsibilities
//! - Match request hosts against a server's domain list
//! - Rewrite paths for static and forwarded routes
//! - Derive the wildcard pattern a route is registered under
//!
//! # Design Decisions
//! - Host matching is ASCII case-insensitive and ignores the port
//! - Path matching is a plain, case-sensitive string prefix
//! - Empty domain list = any host

/// Matches a request host against a server's allowed domains.
#[derive(Debug, Clone, Default)]
pub struct HostMatcher {
    domains: Vec<String>,
}

impl HostMatcher {
    /// Create a new host matcher.
    /// Domains are normalized to lowercase without port.
    pub fn new<I, S>(domains: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            domains: domains
                .into_iter()
                .map(|d| strip_port(d.as_ref()).to_ascii_lowercase())
                .collect(),
        }
    }

    /// Returns true if the server has no domain restriction.
    pub fn is_any(&self) -> bool {
        self.domains.is_empty()
    }

    /// Returns true if `host` is accepted.
    pub fn matches(&self, host: Option<&str>) -> bool {
        if self.domains.is_empty() {
            return true;
        }
        self.matches_listed(host)
    }

    /// Returns true only if `host` equals one of the listed domains.
    pub fn matches_listed(&self, host: Option<&str>) -> bool {
        let Some(host) = host else {
            return false;
        };
        let host = strip_port(host);
        self.domains.iter().any(|d| d.eq_ignore_ascii_case(host))
    }

    pub fn domains(&self) -> &[String] {
        &self.domains
    }
}

/// Remove a trailing `:port` from a host, keeping bracketed IPv6 intact.
pub fn strip_port(host: &str) -> &str {
    let host = host.trim();
    if let Some(rest) = host.strip_prefix('[') {
        return match rest.find(']') {
            Some(end) => &host[..end + 2],
            None => host,
        };
    }
    match host.rsplit_once(':') {
        Some((name, port)) if !name.contains(':') && port.bytes().all(|b| b.is_ascii_digit()) => {
            name
        }
        _ => host,
    }
}

/// Pattern a route prefix is registered under: `/` → `/*`, other → `<value>/*`.
pub fn wildcard_pattern(value: &str) -> String {
    if value == "/" {
        "/*".to_string()
    } else {
        format!("{value}/*")
    }
}

/// Path handed to a static handler after removing the route prefix.
///
/// The root prefix leaves the path unchanged; otherwise the remainder gets a
/// leading `/` (an empty remainder becomes `/`).
pub fn strip_static_prefix(prefix: &str, path: &str) -> String {
    if prefix == "/" {
        return path.to_string();
    }
    let rest = path.strip_prefix(prefix).unwrap_or(path);
    if rest.starts_with('/') {
        rest.to_string()
    } else {
        format!("/{rest}")
    }
}

/// Path sent upstream for a forwarded route: `to` joined in front of `path`.
pub fn join_forward_path(to: Option<&str>, path: &str) -> String {
    let base = to.unwrap_or("/").trim_end_matches('/');
    if base.is_empty() {
        return path.to_string();
    }
    if path.starts_with('/') {
        format!("{base}{path}")
    } else {
        format!("{base}/{path}")
    }
}
