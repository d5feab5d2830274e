use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, ReadBuf};
use tokio_rustls::TlsStream;

use crate::crypto::Identity;

/// An encrypted stream whose peer has been verified against a trust set.
///
/// Only [`super::PinnedTls`] creates these, and only after the peer's
/// identity check has passed. The connection owns the raw stream: `close`
/// (or dropping the connection) closes it exactly once.
pub struct AuthenticatedConnection<S> {
    stream: TlsStream<S>,
    peer: Identity,
}

impl<S> AuthenticatedConnection<S> {
    pub(crate) fn new(stream: TlsStream<S>, peer: Identity) -> Self {
        Self { stream, peer }
    }

    /// The verified identity of the remote peer
    pub fn peer_identity(&self) -> Identity {
        self.peer
    }
}

impl<S> AuthenticatedConnection<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Send close_notify and shut down the raw stream
    pub async fn close(mut self) -> io::Result<()> {
        self.stream.shutdown().await
    }
}

impl<S> std::fmt::Debug for AuthenticatedConnection<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthenticatedConnection")
            .field("peer", &self.peer)
            .finish_non_exhaustive()
    }
}

impl<S> AsyncRead for AuthenticatedConnection<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().stream).poll_read(cx, buf)
    }
}

impl<S> AsyncWrite for AuthenticatedConnection<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.get_mut().stream).poll_write(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().stream).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().stream).poll_shutdown(cx)
    }
}
