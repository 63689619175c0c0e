//! Round-robin selection over unweighted upstreams.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Round-robin selector.
/// Stores an internal counter to rotate through upstreams.
#[derive(Debug, Default)]
pub struct RoundRobin {
    upstreams: Vec<SocketAddr>,
    counter: AtomicUsize,
}

impl RoundRobin {
    pub fn new(upstreams: Vec<SocketAddr>) -> Self {
        Self {
            upstreams,
            counter: AtomicUsize::new(0),
        }
    }

    /// Select the next upstream.
    pub fn next(&self) -> Option<SocketAddr> {
        if self.upstreams.is_empty() {
            return None;
        }

        let index = self.counter.fetch_add(1, Ordering::Relaxed) % self.upstreams.len();
        Some(self.upstreams[index])
    }

    pub fn upstreams(&self) -> &[SocketAddr] {
        &self.upstreams
    }
}
