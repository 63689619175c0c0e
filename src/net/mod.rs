//! Network collaborators.
//!
//! # Data Flow
//! ```text
//! Startup:
//!     upstream host names → dns.rs (one lookup each) → socket addresses
//!     QUIC cert/key paths → tls.rs → quinn endpoint configuration
//! ```
//!
//! # Design Decisions
//! - Nothing here runs per request
//! - Failures surface as startup errors

pub mod dns;
pub mod tls;

pub use dns::{DnsError, DnsResolver};
pub use tls::{quic_server_config, TlsError};
