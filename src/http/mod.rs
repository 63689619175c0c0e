//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! Dedicated port (TCP)            Default port (TCP)           Dedicated port (UDP)
//!     → server.rs                     → default_port.rs            → quic.rs (HTTP/3)
//!       ServerDispatcher                Host → ServerDispatcher      → ServerDispatcher
//!
//! ServerDispatcher:
//!     domain check → access check → route match (routing)
//!     → plugins middleware chain
//!     → static_files.rs (cached handler per scope/server/route)
//!       or forward.rs (upstream from load_balancer)
//!     → response.rs (rejections as status + text)
//!
//! WebSocket port (TCP):
//!     → websocket.rs (access check, upstream connect, frame relay)
//! ```

pub mod default_port;
pub mod forward;
pub mod quic;
pub mod request;
pub mod response;
pub mod server;
pub mod static_files;
pub mod websocket;

pub use default_port::DefaultPortMultiplexer;
pub use forward::Forwarder;
pub use quic::QuicFrontend;
pub use request::{with_request_layers, UuidRequestId, X_REQUEST_ID};
pub use response::ProxyError;
pub use server::{GatewayContext, ServerDispatcher, VirtualServer};
pub use static_files::{CacheKey, Scope, StaticHandler, StaticHandlerCache};
pub use websocket::WebSocketProxy;
