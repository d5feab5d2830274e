use std::io;

use common::transport::AuthenticatedConnection;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Most bytes [`ReceiveMessage`] reads from one connection
pub const MAX_MESSAGE_SIZE: u64 = 64 * 1024;

pub const DEFAULT_MESSAGE: &str = "test 1234";

/// Application logic run over a connection once the peer is authenticated.
///
/// The caller owns the connection and closes it after `handle` returns,
/// whether or not it succeeded.
#[async_trait::async_trait]
pub trait ConnectionHandler: Send + Sync + 'static {
    async fn handle<S>(&self, conn: &mut AuthenticatedConnection<S>) -> io::Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send;
}

/// Server side: read one message until the peer closes, and log it
#[derive(Debug, Clone, Copy, Default)]
pub struct ReceiveMessage;

#[async_trait::async_trait]
impl ConnectionHandler for ReceiveMessage {
    async fn handle<S>(&self, conn: &mut AuthenticatedConnection<S>) -> io::Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send,
    {
        let peer = conn.peer_identity();
        let mut message = Vec::new();
        (&mut *conn)
            .take(MAX_MESSAGE_SIZE)
            .read_to_end(&mut message)
            .await?;

        if message.len() as u64 == MAX_MESSAGE_SIZE {
            tracing::warn!(%peer, "message truncated to {} bytes", MAX_MESSAGE_SIZE);
        }
        tracing::info!(
            %peer,
            bytes = message.len(),
            "received message: {}",
            String::from_utf8_lossy(&message)
        );
        Ok(())
    }
}

/// Client side: write one message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendMessage {
    message: Vec<u8>,
}

impl SendMessage {
    pub fn new(message: impl Into<Vec<u8>>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.message.len()
    }

    pub fn is_empty(&self) -> bool {
        self.message.is_empty()
    }
}

impl Default for SendMessage {
    fn default() -> Self {
        Self::new(DEFAULT_MESSAGE)
    }
}

#[async_trait::async_trait]
impl ConnectionHandler for SendMessage {
    async fn handle<S>(&self, conn: &mut AuthenticatedConnection<S>) -> io::Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send,
    {
        conn.write_all(&self.message).await?;
        conn.flush().await?;
        tracing::debug!(peer = %conn.peer_identity(), bytes = self.message.len(), "sent message");
        Ok(())
    }
}
