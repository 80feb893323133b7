//! TCP Server Adapter
//!
//! Accepts TCP connections, asks the active [`BackendProvider`] where
//! each one should go, and relays bytes in both directions.

use crate::application::BackendProvider;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{self, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

/// TCP Server - inbound adapter for handling client connections.
///
/// This adapter:
/// 1. Accepts incoming TCP connections
/// 2. Resolves a backend through the provider (inside the connection's task)
/// 3. Dials the backend once
/// 4. Copies bytes both ways, half-closing each side on end-of-stream
pub struct TcpServer {
    provider: Arc<BackendProvider>,
    listen_addr: String,
}

impl TcpServer {
    pub fn new(provider: Arc<BackendProvider>, listen_addr: String) -> Self {
        Self {
            provider,
            listen_addr,
        }
    }

    pub fn listen_addr(&self) -> &str {
        &self.listen_addr
    }

    /// Bind the listen address and serve until `accept` fails.
    #[cfg_attr(coverage_nightly, coverage(off))]
    pub async fn run(&self) -> anyhow::Result<()> {
        let listener = TcpListener::bind(&self.listen_addr).await?;
        tracing::info!(
            "ambassadord listening on {} using {}",
            listener.local_addr()?,
            self.provider
        );
        self.serve(listener).await
    }

    /// Serve connections from an already-bound listener.
    ///
    /// Only an `accept` error ends the loop; everything that goes wrong
    /// with a single connection stays inside that connection's task.
    pub async fn serve(&self, listener: TcpListener) -> anyhow::Result<()> {
        loop {
            let (stream, addr) = listener.accept().await?;
            let provider = self.provider.clone();

            tokio::spawn(async move {
                if let Err(e) = Self::handle_connection(provider, stream, addr).await {
                    tracing::error!("connection error from {}: {:?}", addr, e);
                }
            });
        }
    }

    /// Handle a single client connection.
    async fn handle_connection(
        provider: Arc<BackendProvider>,
        client_stream: TcpStream,
        client_addr: SocketAddr,
    ) -> anyhow::Result<()> {
        let backend = match provider.next_backend(&client_stream).await {
            Some(b) if !b.is_empty() => b,
            _ => {
                tracing::warn!("no backends, closing connection from {}", client_addr);
                return Ok(());
            }
        };

        let backend_stream = match TcpStream::connect(backend.as_str()).await {
            Ok(s) => s,
            Err(e) => {
                tracing::error!("failed to connect to backend {}: {}", backend, e);
                return Ok(());
            }
        };

        tracing::info!("{} -> {}", client_addr, backend);

        let (sent, received) = Self::proxy_bidirectional(client_stream, backend_stream).await?;
        tracing::debug!(
            "closed {} -> {} ({} bytes sent, {} bytes received)",
            client_addr,
            backend,
            sent,
            received
        );
        Ok(())
    }

    /// Copy bytes in both directions until both sides are done.
    ///
    /// Each direction shuts down the write half of its destination when
    /// its source reaches end-of-stream, so the opposite direction keeps
    /// flowing. Returns (client→backend, backend→client) byte counts.
    #[cfg_attr(coverage_nightly, coverage(off))]
    async fn proxy_bidirectional(
        client_stream: TcpStream,
        backend_stream: TcpStream,
    ) -> io::Result<(u64, u64)> {
        let (mut client_read, mut client_write) = client_stream.into_split();
        let (mut backend_read, mut backend_write) = backend_stream.into_split();

        let client_to_backend = tokio::spawn(async move {
            let result = io::copy(&mut client_read, &mut backend_write).await;
            let _ = backend_write.shutdown().await;
            result
        });

        let backend_to_client = tokio::spawn(async move {
            let result = io::copy(&mut backend_read, &mut client_write).await;
            let _ = client_write.shutdown().await;
            result
        });

        let (c2b, b2c) = tokio::join!(client_to_backend, backend_to_client);

        // A peer going away mid-stream is normal; log and carry on
        let sent = match c2b {
            Ok(Ok(n)) => n,
            Ok(Err(e)) => {
                tracing::trace!("client->backend copy error: {:?}", e);
                0
            }
            Err(e) => return Err(io::Error::new(io::ErrorKind::Other, e)),
        };
        let received = match b2c {
            Ok(Ok(n)) => n,
            Ok(Err(e)) => {
                tracing::trace!("backend->client copy error: {:?}", e);
                0
            }
            Err(e) => return Err(io::Error::new(io::ErrorKind::Other, e)),
        };

        Ok((sent, received))
    }
}
