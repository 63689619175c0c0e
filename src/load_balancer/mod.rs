//! Load balancing subsystem.
//!
//! # Data Flow
//! ```text
//! Startup, per virtual server:
//!     resolved upstreams (address, weight)
//!     → selector.rs
//!         - one upstream → UpstreamTarget::Direct
//!         - several → weighted.rs (integer weights)
//!           + auxiliary.rs (loopback relay carrying a fractional share)
//!
//! Per request:
//!     UpstreamTarget::next() → address handed to the forwarder
//!
//! WebSocket servers:
//!     round_robin.rs (unweighted rotation)
//! ```
//!
//! # Design Decisions
//! - Targets are built once and shared read-only
//! - Load balancing is a routing decision; no retries or failover
//! - Auxiliary listeners live as long as the process

pub mod auxiliary;
pub mod round_robin;
pub mod selector;
pub mod weighted;

pub use auxiliary::AuxiliaryListener;
pub use round_robin::RoundRobin;
pub use selector::{select, ResolvedUpstream, UpstreamSelection, UpstreamTarget};
pub use weighted::WeightedUpstreamSet;
