//! Mutually authenticated TLS with pinned identities
//!
//! Both ends present their own self-signed [`Credential`] and both ends
//! verify the other. Verification happens in two strictly ordered steps:
//!
//! 1. The rustls handshake completes. The peer's certificate must parse and
//!    the handshake signatures must verify against its key, but no CA chain
//!    is consulted.
//! 2. The peer's [`Identity`] is derived from the certificate it presented
//!    and looked up in the [`TrustSet`].
//!
//! Only when both pass is an [`AuthenticatedConnection`] returned. On any
//! failure the stream is torn down and never handed to the caller.

mod connection;
mod verifier;

use std::future::Future;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use rustls::pki_types::ServerName;
use rustls::{ClientConfig, CommonState, ServerConfig};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio_rustls::{TlsAcceptor, TlsConnector, TlsStream};

use crate::crypto::{Credential, CredentialError, Identity, TrustSet};

pub use connection::AuthenticatedConnection;
use verifier::SelfSignedVerifier;

/// Name sent as SNI by clients; never checked by either side
pub const SERVER_NAME: &str = "ffsend";

/// Upper bound on sending close_notify to a rejected peer
const TEARDOWN_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Debug, thiserror::Error)]
pub enum HandshakeError {
    #[error("invalid local credential: {0}")]
    Credential(#[from] CredentialError),

    #[error("failed to configure TLS: {0}")]
    Config(#[from] rustls::Error),

    #[error("TLS handshake failed: {0}")]
    Tls(#[source] io::Error),

    #[error("TLS handshake timed out after {0:?}")]
    TimedOut(Duration),

    #[error("peer did not present a certificate")]
    MissingPeerCertificate,

    #[error("peer presented a malformed certificate: {0}")]
    MalformedPeerCertificate(String),

    #[error("peer identity {0} is not trusted")]
    UntrustedPeer(Identity),
}

impl HandshakeError {
    /// True if the handshake succeeded cryptographically but the peer is not pinned
    pub fn is_untrusted(&self) -> bool {
        matches!(self, HandshakeError::UntrustedPeer(_))
    }
}

/// The local side of a pinned TLS connection.
///
/// Holds TLS configurations for both roles, built once from this node's
/// credential, together with the trust set every peer is checked against.
/// It is read-only after construction and cheap to clone, so one instance
/// can be shared by every connection a server handles.
///
/// # Examples
///
/// ```ignore
/// let credential = CredentialStore::at(None)?.load()?;
/// let server_identity: Identity = "9f2c...".parse()?;
/// let tls = PinnedTls::new(&credential, TrustSet::only(server_identity))?
///     .with_handshake_timeout(Duration::from_secs(30));
///
/// let raw = TcpStream::connect("localhost:12345").await?;
/// let mut conn = tls.wrap_as_client(raw).await?;
/// conn.write_all(b"test 1234").await?;
/// conn.close().await?;
/// ```
#[derive(Clone)]
pub struct PinnedTls {
    acceptor: TlsAcceptor,
    connector: TlsConnector,
    trust: Arc<TrustSet>,
    local: Identity,
    handshake_timeout: Option<Duration>,
}

impl std::fmt::Debug for PinnedTls {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PinnedTls")
            .field("local", &self.local)
            .field("trust", &self.trust)
            .field("handshake_timeout", &self.handshake_timeout)
            .finish()
    }
}

impl PinnedTls {
    pub fn new(credential: &Credential, trust: TrustSet) -> Result<Self, HandshakeError> {
        let local = credential.identity()?;
        let provider = Arc::new(rustls::crypto::ring::default_provider());
        let verifier = SelfSignedVerifier::new(provider.clone());

        let server = ServerConfig::builder_with_provider(provider.clone())
            .with_safe_default_protocol_versions()?
            .with_client_cert_verifier(verifier.clone())
            .with_single_cert(
                vec![credential.certificate_der()],
                credential.private_key_der(),
            )?;

        let client = ClientConfig::builder_with_provider(provider)
            .with_safe_default_protocol_versions()?
            .dangerous()
            .with_custom_certificate_verifier(verifier)
            .with_client_auth_cert(
                vec![credential.certificate_der()],
                credential.private_key_der(),
            )?;

        Ok(Self {
            acceptor: TlsAcceptor::from(Arc::new(server)),
            connector: TlsConnector::from(Arc::new(client)),
            trust: Arc::new(trust),
            local,
            handshake_timeout: None,
        })
    }

    /// Abort handshakes that take longer than `timeout`
    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = Some(timeout);
        self
    }

    /// This node's own identity, as derived from its credential
    pub fn local_identity(&self) -> Identity {
        self.local
    }

    /// Accept a TLS handshake on `raw` and verify the client's identity
    pub async fn wrap_as_server<S>(&self, raw: S) -> Result<AuthenticatedConnection<S>, HandshakeError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let stream = self.bounded(self.acceptor.accept(raw)).await?;
        self.verify_peer(TlsStream::from(stream)).await
    }

    /// Initiate a TLS handshake on `raw` and verify the server's identity
    pub async fn wrap_as_client<S>(&self, raw: S) -> Result<AuthenticatedConnection<S>, HandshakeError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let server_name = ServerName::try_from(SERVER_NAME)
            .map_err(|e| HandshakeError::Config(rustls::Error::General(e.to_string())))?;
        let stream = self
            .bounded(self.connector.connect(server_name, raw))
            .await?;
        self.verify_peer(TlsStream::from(stream)).await
    }

    async fn bounded<F, T>(&self, handshake: F) -> Result<T, HandshakeError>
    where
        F: Future<Output = io::Result<T>>,
    {
        let result = match self.handshake_timeout {
            Some(limit) => tokio::time::timeout(limit, handshake)
                .await
                .map_err(|_| HandshakeError::TimedOut(limit))?,
            None => handshake.await,
        };
        result.map_err(HandshakeError::Tls)
    }

    async fn verify_peer<S>(
        &self,
        mut stream: TlsStream<S>,
    ) -> Result<AuthenticatedConnection<S>, HandshakeError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let peer = match peer_identity(stream.get_ref().1) {
            Ok(peer) => peer,
            Err(e) => {
                teardown(&mut stream).await;
                return Err(e);
            }
        };

        if !self.trust.contains(&peer) {
            tracing::warn!(%peer, "rejecting peer with untrusted identity");
            teardown(&mut stream).await;
            return Err(HandshakeError::UntrustedPeer(peer));
        }

        tracing::debug!(%peer, "peer identity verified");
        Ok(AuthenticatedConnection::new(stream, peer))
    }
}

fn peer_identity(state: &CommonState) -> Result<Identity, HandshakeError> {
    let end_entity = state
        .peer_certificates()
        .and_then(|certs| certs.first())
        .ok_or(HandshakeError::MissingPeerCertificate)?;
    Identity::from_der(end_entity.as_ref())
        .map_err(|e| HandshakeError::MalformedPeerCertificate(e.to_string()))
}

async fn teardown<S>(stream: &mut TlsStream<S>)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    if let Ok(Err(e)) = tokio::time::timeout(TEARDOWN_TIMEOUT, stream.shutdown()).await {
        tracing::debug!("error shutting down rejected connection: {}", e);
    }
}

/// Accept a TLS handshake on `raw` using `credential`, and require the
/// client's identity to be in `trust`
pub async fn wrap_as_server<S>(
    raw: S,
    credential: &Credential,
    trust: &TrustSet,
) -> Result<AuthenticatedConnection<S>, HandshakeError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    PinnedTls::new(credential, trust.clone())?
        .wrap_as_server(raw)
        .await
}

/// Initiate a TLS handshake on `raw` using `credential`, and require the
/// server's identity to be in `trust`
pub async fn wrap_as_client<S>(
    raw: S,
    credential: &Credential,
    trust: &TrustSet,
) -> Result<AuthenticatedConnection<S>, HandshakeError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    PinnedTls::new(credential, trust.clone())?
        .wrap_as_client(raw)
        .await
}
