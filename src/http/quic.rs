//! HTTP/3 over QUIC front end.
//!
//! # Responsibilities
//! - Accept QUIC connections on a server's dedicated port (UDP)
//! - Turn each HTTP/3 request into a regular request for the server's dispatcher
//! - Stream the dispatcher's response back on the same QUIC stream
//!
//! # Design Decisions
//! - Only servers with exactly one upstream get a QUIC front end
//! - Request bodies are collected before dispatch; responses are streamed
//! - A failing connection or stream is logged and dropped, never fatal

use std::io;
use std::net::SocketAddr;

use axum::body::Body;
use axum::http::{Request, Response};
use bytes::{Buf, Bytes, BytesMut};
use futures_util::StreamExt;
use h3::server::RequestResolver;
use quinn::{Endpoint, Incoming};

use crate::http::server::ServerDispatcher;

type BoxError = Box<dyn std::error::Error + Send + Sync>;
type H3Connection = h3_quinn::Connection;

/// QUIC listener serving one virtual server.
pub struct QuicFrontend {
    endpoint: Endpoint,
    dispatcher: ServerDispatcher,
}

impl QuicFrontend {
    /// Bind the UDP socket. Must be called inside the Tokio runtime.
    pub fn bind(
        addr: SocketAddr,
        config: quinn::ServerConfig,
        dispatcher: ServerDispatcher,
    ) -> io::Result<Self> {
        let endpoint = Endpoint::server(config, addr)?;
        tracing::info!(
            server = %dispatcher.server().name,
            address = %endpoint.local_addr()?,
            "QUIC endpoint bound"
        );
        Ok(Self {
            endpoint,
            dispatcher,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.endpoint.local_addr()
    }

    /// Accept connections until the endpoint is closed.
    pub async fn run(self) -> io::Result<()> {
        let addr = self.endpoint.local_addr()?;
        tracing::info!(address = %addr, "QUIC listener starting");

        while let Some(incoming) = self.endpoint.accept().await {
            let dispatcher = self.dispatcher.clone();
            tokio::spawn(async move {
                let remote = incoming.remote_address();
                if let Err(e) = handle_connection(incoming, dispatcher).await {
                    tracing::debug!(peer = %remote, error = %e, "QUIC connection ended with error");
                }
            });
        }

        tracing::info!(address = %addr, "QUIC listener stopped");
        Ok(())
    }
}

async fn handle_connection(incoming: Incoming, dispatcher: ServerDispatcher) -> Result<(), BoxError> {
    let connection = incoming.await?;
    let peer = connection.remote_address();
    tracing::debug!(peer = %peer, "QUIC connection established");

    let mut h3: h3::server::Connection<H3Connection, Bytes> =
        h3::server::Connection::new(H3Connection::new(connection)).await?;

    loop {
        match h3.accept().await {
            Ok(Some(resolver)) => {
                let dispatcher = dispatcher.clone();
                tokio::spawn(async move {
                    if let Err(e) = handle_request(resolver, dispatcher, peer).await {
                        tracing::warn!(peer = %peer, error = %e, "HTTP/3 request failed");
                    }
                });
            }
            Ok(None) => break,
            Err(e) => {
                tracing::debug!(peer = %peer, error = %e, "HTTP/3 connection closed");
                break;
            }
        }
    }

    Ok(())
}

async fn handle_request(
    resolver: RequestResolver<H3Connection, Bytes>,
    dispatcher: ServerDispatcher,
    peer: SocketAddr,
) -> Result<(), BoxError> {
    let (request, mut stream) = resolver.resolve_request().await?;

    // 1. Collect body
    let mut body = BytesMut::new();
    while let Some(mut chunk) = stream.recv_data().await? {
        while chunk.has_remaining() {
            let bytes = chunk.chunk();
            body.extend_from_slice(bytes);
            let len = bytes.len();
            chunk.advance(len);
        }
    }

    // 2. Dispatch
    let (parts, ()) = request.into_parts();
    let request = Request::from_parts(parts, Body::from(body.freeze()));
    let response = dispatcher.dispatch(request, peer).await;

    // 3. Respond
    let (parts, body) = response.into_parts();
    stream.send_response(Response::from_parts(parts, ())).await?;

    let mut data = body.into_data_stream();
    while let Some(chunk) = data.next().await {
        stream.send_data(chunk?).await?;
    }
    stream.finish().await?;

    Ok(())
}
