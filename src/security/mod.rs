//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Startup:
//!     security.allowed_hosts_groups
//!     → cidr.rs (expand blocks into host addresses)
//!     → access_control.rs (sorted, deduplicated groups)
//!
//! Incoming request:
//!     → access_control.rs (is the peer in one of the server's groups?)
//!     → 403 or pass to routing
//! ```
//!
//! # Design Decisions
//! - Fail closed: unknown group references abort startup
//! - No trust in client input (the peer address comes from the socket)

pub mod access_control;
pub mod cidr;

pub use access_control::{AccessControl, AccessControlError};
