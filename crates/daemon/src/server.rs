use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use common::transport::PinnedTls;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{watch, Semaphore};
use tracing::Instrument;

use crate::payload::ConnectionHandler;

/// How long a stopping server waits for in-flight connections
const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("failed to listen on {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to read listener address: {0}")]
    LocalAddr(#[source] io::Error),

    #[error("failed to accept connection: {0}")]
    Accept(#[source] io::Error),

    #[error("server task failed: {0}")]
    Task(String),
}

/// Accepts TCP connections and runs each one through the pinned handshake
/// and then `H`, one task per connection.
pub struct Server<H> {
    listener: TcpListener,
    tls: Arc<PinnedTls>,
    handler: Arc<H>,
    slots: Arc<Semaphore>,
    max_connections: usize,
}

impl<H: ConnectionHandler> Server<H> {
    pub async fn bind(
        addr: &str,
        tls: PinnedTls,
        handler: H,
        max_connections: usize,
    ) -> Result<Self, ServerError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: addr.to_string(),
                source,
            })?;
        let max_connections = max_connections.max(1);

        Ok(Self {
            listener,
            tls: Arc::new(tls),
            handler: Arc::new(handler),
            slots: Arc::new(Semaphore::new(max_connections)),
            max_connections,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        self.listener.local_addr().map_err(ServerError::LocalAddr)
    }

    /// Run the accept loop until `shutdown` fires or accepting fails.
    ///
    /// Handshake and handler failures only end their own connection. Once
    /// the loop stops, in-flight connections get [`DRAIN_TIMEOUT`] to finish.
    pub async fn run(self, mut shutdown: watch::Receiver<()>) -> Result<(), ServerError> {
        let result = loop {
            let permit = tokio::select! {
                _ = shutdown.changed() => break Ok(()),
                permit = self.slots.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break Ok(()),
                },
            };

            let (raw, remote) = tokio::select! {
                _ = shutdown.changed() => break Ok(()),
                accepted = self.listener.accept() => match accepted {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        tracing::error!("accept failed: {}", e);
                        break Err(ServerError::Accept(e));
                    }
                },
            };

            let tls = self.tls.clone();
            let handler = self.handler.clone();
            let span = tracing::info_span!("connection", %remote);
            tokio::spawn(
                async move {
                    let _permit = permit;
                    handle_connection(raw, &tls, handler.as_ref()).await;
                }
                .instrument(span),
            );
        };

        tracing::info!("server stopped accepting connections");
        self.drain().await;
        result
    }

    async fn drain(&self) {
        let all = u32::try_from(self.max_connections).unwrap_or(u32::MAX);
        match tokio::time::timeout(DRAIN_TIMEOUT, self.slots.acquire_many(all)).await {
            Ok(_) => tracing::debug!("all connections finished"),
            Err(_) => tracing::warn!(
                "connections still open after {} seconds, abandoning them",
                DRAIN_TIMEOUT.as_secs()
            ),
        }
    }
}

async fn handle_connection<H: ConnectionHandler>(raw: TcpStream, tls: &PinnedTls, handler: &H) {
    let mut conn = match tls.wrap_as_server(raw).await {
        Ok(conn) => conn,
        Err(e) => {
            tracing::warn!("handshake failed: {}", e);
            return;
        }
    };

    let peer = conn.peer_identity();
    tracing::info!(%peer, "peer authenticated");

    if let Err(e) = handler.handle(&mut conn).await {
        tracing::warn!(%peer, "connection handler failed: {}", e);
    }
    if let Err(e) = conn.close().await {
        tracing::debug!(%peer, "error closing connection: {}", e);
    }
}
