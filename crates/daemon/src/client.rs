use std::io;

use common::crypto::Identity;
use common::transport::{AuthenticatedConnection, HandshakeError, PinnedTls};
use tokio::net::TcpStream;

use crate::payload::ConnectionHandler;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("failed to connect to {addr}: {source}")]
    Dial {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to authenticate server: {0}")]
    Handshake(#[from] HandshakeError),

    #[error("failed to send payload: {0}")]
    Payload(#[source] io::Error),
}

/// Dial `addr` and authenticate the server against `tls`'s trust set
pub async fn connect(
    addr: &str,
    tls: &PinnedTls,
) -> Result<AuthenticatedConnection<TcpStream>, ClientError> {
    let raw = TcpStream::connect(addr)
        .await
        .map_err(|source| ClientError::Dial {
            addr: addr.to_string(),
            source,
        })?;
    tracing::debug!(%addr, "connected, starting handshake");

    let conn = tls.wrap_as_client(raw).await?;
    tracing::info!(%addr, peer = %conn.peer_identity(), "server authenticated");
    Ok(conn)
}

/// Connect, run `handler` over the connection, and close it.
/// Returns the server's identity.
pub async fn send<H: ConnectionHandler>(
    addr: &str,
    tls: &PinnedTls,
    handler: &H,
) -> Result<Identity, ClientError> {
    let mut conn = connect(addr, tls).await?;
    let peer = conn.peer_identity();

    handler.handle(&mut conn).await.map_err(ClientError::Payload)?;
    conn.close().await.map_err(ClientError::Payload)?;
    Ok(peer)
}
