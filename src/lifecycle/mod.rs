//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Validate → DNS + access groups → plugins → servers → bind sockets
//!
//! Running (supervisor.rs):
//!     One task per listener → wait for signal or first listener exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → clean exit
//! ```
//!
//! # Design Decisions
//! - Ordered startup: config first, then core, then listeners
//! - Every socket is bound before the first task is spawned
//! - No configuration reload; restart to apply changes

pub mod signals;
pub mod startup;
pub mod supervisor;

use std::future::Future;

use crate::config::ProxyConfig;
use crate::plugins::PluginRegistry;

pub use signals::shutdown_signal;
pub use startup::{Gateway, StartupError};
pub use supervisor::{ListenerSupervisor, SupervisorError};

/// Error type for a gateway run.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("startup failed: {0}")]
    Startup(#[from] StartupError),

    #[error(transparent)]
    Listener(#[from] SupervisorError),
}

/// Build, bind and run the gateway until `shutdown` completes.
pub async fn run<S>(config: &ProxyConfig, registry: &PluginRegistry, shutdown: S) -> Result<(), GatewayError>
where
    S: Future<Output = ()>,
{
    let gateway = Gateway::build(config, registry).await?;
    let supervisor = gateway.bind().await?;
    supervisor.run(shutdown).await?;
    Ok(())
}
