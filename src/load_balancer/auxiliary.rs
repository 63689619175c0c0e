//! Auxiliary loopback listeners.
//!
//! An auxiliary listener is an internal hop that forwards all of its traffic
//! to one upstream. The selector registers its loopback address in a
//! weighted set to carry part of that upstream's share.

use std::io;
use std::net::{Ipv4Addr, SocketAddr, TcpListener};

use tokio::io::copy_bidirectional;
use tokio::net::TcpStream;

/// A bound, not yet serving, auxiliary listener.
#[derive(Debug)]
pub struct AuxiliaryListener {
    listener: TcpListener,
    local_addr: SocketAddr,
    target: SocketAddr,
}

impl AuxiliaryListener {
    /// Bind an OS-assigned loopback port that will relay to `target`.
    pub fn bind(target: SocketAddr) -> io::Result<Self> {
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0))?;
        listener.set_nonblocking(true)?;
        let local_addr = listener.local_addr()?;

        Ok(Self {
            listener,
            local_addr,
            target,
        })
    }

    /// Loopback address registered in the weighted set.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Upstream receiving everything this listener accepts.
    pub fn target(&self) -> SocketAddr {
        self.target
    }

    /// Relay every accepted connection to the target until accepting fails.
    pub async fn run(self) -> io::Result<()> {
        let listener = tokio::net::TcpListener::from_std(self.listener)?;
        let target = self.target;
        tracing::info!(address = %self.local_addr, target = %target, "Auxiliary listener starting");

        loop {
            let (mut inbound, peer) = listener.accept().await?;
            tokio::spawn(async move {
                let mut outbound = match TcpStream::connect(target).await {
                    Ok(stream) => stream,
                    Err(e) => {
                        tracing::warn!(target = %target, error = %e, "Auxiliary relay could not reach upstream");
                        return;
                    }
                };
                if let Err(e) = copy_bidirectional(&mut inbound, &mut outbound).await {
                    tracing::debug!(peer = %peer, target = %target, error = %e, "Auxiliary relay closed");
                }
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn test_relays_to_target() {
        let upstream = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let target = upstream.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = upstream.accept().await.unwrap();
            let mut buf = [0u8; 4];
            socket.read_exact(&mut buf).await.unwrap();
            socket.write_all(&buf).await.unwrap();
        });

        let aux = AuxiliaryListener::bind(target).unwrap();
        let addr = aux.local_addr();
        assert_eq!(aux.target(), target);
        tokio::spawn(aux.run());

        let mut client = TcpStream::connect(addr).await.unwrap();
        client.write_all(b"ping").await.unwrap();
        let mut buf = [0u8; 4];
        client.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"ping");
    }
}
