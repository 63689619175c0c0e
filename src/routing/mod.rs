//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming Request (host, path)
//!     → matcher.rs (domain allow-list)
//!     → router.rs (first route whose prefix matches the path)
//!     → matcher.rs (strip static prefix / join forward path)
//!     → Return: matched RouteEntry or NoMatch
//!
//! Route Compilation (at startup):
//!     RouteConfig[]
//!     → Keep declaration order
//!     → Freeze as immutable RouteTable
//! ```
//!
//! # Design Decisions
//! - Routes compiled at startup, immutable at runtime
//! - No regex in hot path (prefix matching only)
//! - Deterministic: same input always matches same route
//! - First match wins

pub mod matcher;
pub mod router;

pub use matcher::HostMatcher;
pub use router::{RouteAction, RouteEntry, RouteTable};
