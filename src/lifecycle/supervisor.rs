//! Listener supervision.
//!
//! # Responsibilities
//! - Run every bound listener as its own task
//! - Wait for a shutdown signal or the first listener to stop
//!
//! # Design Decisions
//! - Listeners are added already bound, so spawning cannot fail half way
//! - A listener that stops for any reason stops the gateway
//! - Remaining tasks are aborted on exit

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::pin::Pin;

use tokio::task::JoinSet;

type ListenerFuture = Pin<Box<dyn Future<Output = io::Result<()>> + Send>>;

/// Error type for listeners ending while the gateway runs.
#[derive(Debug, thiserror::Error)]
pub enum SupervisorError {
    #[error("listener '{name}' failed: {source}")]
    Failed {
        name: String,
        #[source]
        source: io::Error,
    },

    #[error("listener '{0}' stopped unexpectedly")]
    Stopped(String),

    #[error("listener task panicked: {0}")]
    Panicked(String),
}

struct ListenerTask {
    name: String,
    addr: SocketAddr,
    future: ListenerFuture,
}

/// Bound listeners waiting to be run.
#[derive(Default)]
pub struct ListenerSupervisor {
    listeners: Vec<ListenerTask>,
}

impl ListenerSupervisor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener future.
    pub fn add<F>(&mut self, name: impl Into<String>, addr: SocketAddr, future: F)
    where
        F: Future<Output = io::Result<()>> + Send + 'static,
    {
        self.listeners.push(ListenerTask {
            name: name.into(),
            addr,
            future: Box::pin(future),
        });
    }

    /// Names and addresses of registered listeners.
    pub fn listeners(&self) -> impl Iterator<Item = (&str, SocketAddr)> {
        self.listeners.iter().map(|l| (l.name.as_str(), l.addr))
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    /// Run all listeners until `shutdown` completes or one of them ends.
    pub async fn run<S>(self, shutdown: S) -> Result<(), SupervisorError>
    where
        S: Future<Output = ()>,
    {
        let mut tasks = JoinSet::new();
        for listener in self.listeners {
            tracing::info!(listener = %listener.name, address = %listener.addr, "Starting listener");
            let name = listener.name;
            let future = listener.future;
            tasks.spawn(async move { (name, future.await) });
        }

        if tasks.is_empty() {
            tracing::warn!("No listeners configured");
        }

        tokio::pin!(shutdown);

        let result = tokio::select! {
            _ = &mut shutdown => {
                tracing::info!("Shutdown signal received");
                Ok(())
            }
            Some(joined) = tasks.join_next() => match joined {
                Ok((name, Ok(()))) => Err(SupervisorError::Stopped(name)),
                Ok((name, Err(source))) => Err(SupervisorError::Failed { name, source }),
                Err(e) => Err(SupervisorError::Panicked(e.to_string())),
            },
        };

        if let Err(e) = &result {
            tracing::error!(error = %e, "Listener ended, stopping gateway");
        }

        tasks.abort_all();
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn addr() -> SocketAddr {
        "127.0.0.1:0".parse().unwrap()
    }

    #[tokio::test]
    async fn test_shutdown_is_clean() {
        let mut supervisor = ListenerSupervisor::new();
        supervisor.add("idle", addr(), std::future::pending());
        assert_eq!(supervisor.len(), 1);

        let result = supervisor.run(async {}).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_first_failure_stops_everything() {
        let mut supervisor = ListenerSupervisor::new();
        supervisor.add("idle", addr(), std::future::pending());
        supervisor.add("broken", addr(), async {
            Err(io::Error::new(io::ErrorKind::AddrInUse, "taken"))
        });

        let result = supervisor
            .run(tokio::time::sleep(Duration::from_secs(30)))
            .await;
        match result {
            Err(SupervisorError::Failed { name, .. }) => assert_eq!(name, "broken"),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_listener_returning_is_an_error() {
        let mut supervisor = ListenerSupervisor::new();
        supervisor.add("quits", addr(), async { Ok(()) });

        let result = supervisor
            .run(tokio::time::sleep(Duration::from_secs(30)))
            .await;
        assert!(matches!(result, Err(SupervisorError::Stopped(name)) if name == "quits"));
    }
}
