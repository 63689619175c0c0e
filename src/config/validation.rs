//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check route shape (exactly one action per route)
//! - Validate value ranges (weights, ports) and weight precision
//! - Check QUIC prerequisites (single upstream, certificate files on disk)
//! - Detect listeners competing for the same port
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Access-group references are checked against the *resolved* groups at
//!   startup, not here
//! - Runs before config is accepted into the system

use std::collections::HashMap;
use std::net::IpAddr;
use std::path::Path;

use crate::config::schema::{HttpServerConfig, ProxyConfig};

/// Largest accepted upstream weight.
pub const MAX_WEIGHT: f64 = 255.0;

/// Weights are scaled by at most this factor, so three decimals at most.
pub const WEIGHT_PRECISION: f64 = 1000.0;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("invalid DNS server address '{0}'")]
    InvalidDns(String),

    #[error("server '{server}': route '{route}' must start with '/'")]
    RouteNotAbsolute { server: String, route: String },

    #[error("server '{server}': route '{route}' must set exactly one of 'to' or 'to_static'")]
    RouteAction { server: String, route: String },

    #[error("server '{server}': upstream {host}:{port} has invalid weight {weight} (expected 0 < weight <= 255)")]
    InvalidWeight {
        server: String,
        host: String,
        port: u16,
        weight: f64,
    },

    #[error("server '{server}': upstream {host}:{port} weight {weight} has more than three decimals")]
    WeightPrecision {
        server: String,
        host: String,
        port: u16,
        weight: f64,
    },

    #[error("server '{server}': QUIC requires exactly one upstream, found {count}")]
    QuicUpstreams { server: String, count: usize },

    #[error("server '{server}': QUIC requires a dedicated port")]
    QuicDefaultPort { server: String },

    #[error("server '{server}': 'quic_certificate' and 'quic_key' must be set")]
    QuicMissingPaths { server: String },

    #[error("server '{server}': QUIC {kind} file not found: {path}")]
    QuicFileNotFound {
        server: String,
        kind: &'static str,
        path: String,
    },

    #[error("websocket server '{server}' needs a non-zero port")]
    WebSocketPort { server: String },

    #[error("websocket server '{server}' needs at least one upstream")]
    WebSocketUpstreams { server: String },

    #[error("port {port} is claimed by both '{first}' and '{second}'")]
    PortConflict {
        port: u16,
        first: String,
        second: String,
    },
}

/// Validate a parsed configuration, collecting every problem found.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if let Some(dns) = &config.dns {
        if dns.parse::<IpAddr>().is_err() {
            errors.push(ValidationError::InvalidDns(dns.clone()));
        }
    }

    let default_port = config.http.default_port;
    let mut ports: HashMap<u16, String> = HashMap::new();
    let mut claim = |port: u16, owner: &str, errors: &mut Vec<ValidationError>| {
        if let Some(first) = ports.get(&port) {
            errors.push(ValidationError::PortConflict {
                port,
                first: first.clone(),
                second: owner.to_string(),
            });
        } else {
            ports.insert(port, owner.to_string());
        }
    };

    let shares_default_port = config.http.default.is_some()
        || config
            .http
            .servers
            .iter()
            .any(|s| s.dedicated_port(default_port).is_none());
    if shares_default_port {
        claim(default_port, "default port", &mut errors);
    }

    for server in &config.http.servers {
        validate_http_server(server, default_port, &mut errors);
        if let Some(port) = server.dedicated_port(default_port) {
            claim(port, &server.name, &mut errors);
        }
    }

    for server in &config.websocket.servers {
        if server.port == 0 {
            errors.push(ValidationError::WebSocketPort {
                server: server.name.clone(),
            });
        } else {
            claim(server.port, &server.name, &mut errors);
        }
        if server.upstream.is_empty() {
            errors.push(ValidationError::WebSocketUpstreams {
                server: server.name.clone(),
            });
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn validate_http_server(server: &HttpServerConfig, default_port: u16, errors: &mut Vec<ValidationError>) {
    for route in &server.routes {
        if !route.value.starts_with('/') {
            errors.push(ValidationError::RouteNotAbsolute {
                server: server.name.clone(),
                route: route.value.clone(),
            });
        }
        if route.to.is_some() == route.to_static.is_some() {
            errors.push(ValidationError::RouteAction {
                server: server.name.clone(),
                route: route.value.clone(),
            });
        }
    }

    for upstream in &server.upstream {
        let w = upstream.weight;
        if !w.is_finite() || w <= 0.0 || w > MAX_WEIGHT {
            errors.push(ValidationError::InvalidWeight {
                server: server.name.clone(),
                host: upstream.host.clone(),
                port: upstream.port,
                weight: w,
            });
        } else if ((w * WEIGHT_PRECISION) - (w * WEIGHT_PRECISION).round()).abs() > 1e-6 {
            errors.push(ValidationError::WeightPrecision {
                server: server.name.clone(),
                host: upstream.host.clone(),
                port: upstream.port,
                weight: w,
            });
        }
    }

    if !server.quic {
        return;
    }

    if server.upstream.len() != 1 {
        errors.push(ValidationError::QuicUpstreams {
            server: server.name.clone(),
            count: server.upstream.len(),
        });
    }
    if server.dedicated_port(default_port).is_none() {
        errors.push(ValidationError::QuicDefaultPort {
            server: server.name.clone(),
        });
    }

    match (&server.quic_certificate, &server.quic_key) {
        (Some(cert), Some(key)) => {
            for (kind, path) in [("certificate", cert), ("key", key)] {
                if !Path::new(path).is_file() {
                    errors.push(ValidationError::QuicFileNotFound {
                        server: server.name.clone(),
                        kind,
                        path: path.display().to_string(),
                    });
                }
            }
        }
        _ => errors.push(ValidationError::QuicMissingPaths {
            server: server.name.clone(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::{
        RouteConfig, StaticRouteConfig, UpstreamConfig, WebSocketServerConfig, WebSocketUpstreamConfig,
    };

    fn upstream(host: &str, port: u16, weight: f64) -> UpstreamConfig {
        UpstreamConfig {
            host: host.to_string(),
            port,
            weight,
        }
    }

    fn server(name: &str, port: u16) -> HttpServerConfig {
        HttpServerConfig {
            name: name.to_string(),
            port: Some(port),
            upstream: vec![upstream("127.0.0.1", 3000, 1.0)],
            routes: vec![RouteConfig {
                value: "/".to_string(),
                to: Some("/".to_string()),
                to_static: None,
            }],
            ..Default::default()
        }
    }

    #[test]
    fn test_accepts_valid_config() {
        let mut config = ProxyConfig::default();
        config.http.servers.push(server("a", 8001));
        config.http.servers.push(server("b", 0));
        assert_eq!(validate_config(&config), Ok(()));
    }

    #[test]
    fn test_rejects_non_literal_dns() {
        let mut config = ProxyConfig::default();
        config.dns = Some("dns.example".to_string());
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors, vec![ValidationError::InvalidDns("dns.example".into())]);
    }

    #[test]
    fn test_route_needs_exactly_one_action() {
        let mut config = ProxyConfig::default();
        let mut s = server("a", 8001);
        s.routes = vec![
            RouteConfig {
                value: "/both".to_string(),
                to: Some("/".to_string()),
                to_static: Some(StaticRouteConfig {
                    root: "./public".into(),
                    index_pages: false,
                }),
            },
            RouteConfig {
                value: "/none".to_string(),
                to: None,
                to_static: None,
            },
        ];
        config.http.servers.push(s);

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 2);
        assert!(errors
            .iter()
            .all(|e| matches!(e, ValidationError::RouteAction { .. })));
    }

    #[test]
    fn test_rejects_out_of_range_weights() {
        let mut config = ProxyConfig::default();
        let mut s = server("a", 8001);
        s.upstream = vec![upstream("10.0.0.1", 80, 0.0), upstream("10.0.0.2", 80, 300.0)];
        config.http.servers.push(s);

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 2);
    }

    #[test]
    fn test_rejects_weights_finer_than_three_decimals() {
        let mut config = ProxyConfig::default();
        let mut s = server("a", 8001);
        s.upstream = vec![
            upstream("10.0.0.1", 80, 0.0004),
            upstream("10.0.0.2", 80, 0.0004),
            upstream("10.0.0.3", 80, 0.125),
            upstream("10.0.0.4", 80, 0.001),
        ];
        config.http.servers.push(s);

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 2);
        assert!(errors
            .iter()
            .all(|e| matches!(e, ValidationError::WeightPrecision { .. })));
    }

    #[test]
    fn test_quic_with_multiple_upstreams_is_rejected() {
        let mut config = ProxyConfig::default();
        let mut s = server("secure", 8443);
        s.quic = true;
        s.quic_certificate = Some("/nonexistent/cert.pem".into());
        s.quic_key = Some("/nonexistent/key.pem".into());
        s.upstream.push(upstream("127.0.0.1", 3001, 1.0));
        config.http.servers.push(s);

        let errors = validate_config(&config).unwrap_err();
        assert!(errors.contains(&ValidationError::QuicUpstreams {
            server: "secure".into(),
            count: 2
        }));
        assert_eq!(
            errors
                .iter()
                .filter(|e| matches!(e, ValidationError::QuicFileNotFound { .. }))
                .count(),
            2
        );
    }

    #[test]
    fn test_quic_needs_paths_and_dedicated_port() {
        let mut config = ProxyConfig::default();
        let mut s = server("secure", 80);
        s.quic = true;
        config.http.servers.push(s);

        let errors = validate_config(&config).unwrap_err();
        assert!(errors.contains(&ValidationError::QuicDefaultPort {
            server: "secure".into()
        }));
        assert!(errors.contains(&ValidationError::QuicMissingPaths {
            server: "secure".into()
        }));
    }

    #[test]
    fn test_detects_port_conflicts() {
        let mut config = ProxyConfig::default();
        config.http.servers.push(server("a", 8001));
        config.websocket.servers.push(WebSocketServerConfig {
            name: "ws".to_string(),
            port: 8001,
            allowed_hosts_groups: Vec::new(),
            upstream: vec![WebSocketUpstreamConfig {
                host: "127.0.0.1".to_string(),
                port: 9001,
            }],
        });

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(
            errors,
            vec![ValidationError::PortConflict {
                port: 8001,
                first: "a".into(),
                second: "ws".into()
            }]
        );
    }
}
