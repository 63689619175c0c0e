//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → tracing events with structured fields
//!     → logging.rs (filter + pretty/JSON formatter)
//!
//! HTTP listeners add:
//!     → x-request-id on every request and response
//!     → tower-http TraceLayer spans
//! ```
//!
//! # Design Decisions
//! - Structured logging (JSON) for machine parsing
//! - Request ID flows through all subsystems

pub mod logging;

pub use logging::{init as init_logging, LoggingError};
