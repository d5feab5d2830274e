use clap::Args;

use common::crypto::{CredentialError, Identity};
use common::store::StoreError;
use common::transport::{HandshakeError, PinnedTls};
use ffsend_daemon::payload::{SendMessage, DEFAULT_MESSAGE};
use ffsend_daemon::state::{AppState, StateError};
use ffsend_daemon::trust_file::{resolve_trust, TrustFileError};
use ffsend_daemon::{init_logging, send, ClientError as SendError};

#[derive(Args, Debug, Clone)]
pub struct Client {
    /// Server address to connect to (default from config)
    #[arg(long)]
    pub remote: Option<String>,

    /// Accept this server identity; repeatable, replaces the trust file
    #[arg(long = "trust", value_name = "HEX")]
    pub trust: Vec<Identity>,

    /// Message to send once the server is authenticated
    #[arg(long, default_value = DEFAULT_MESSAGE)]
    pub message: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("state error: {0}")]
    State(#[from] StateError),

    #[error("failed to load credential: {0}")]
    Store(#[from] StoreError),

    #[error("failed to derive identity: {0}")]
    Credential(#[from] CredentialError),

    #[error("failed to read trusted peers: {0}")]
    TrustFile(#[from] TrustFileError),

    #[error("failed to set up TLS: {0}")]
    Tls(#[from] HandshakeError),

    #[error(transparent)]
    Send(#[from] SendError),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Client {
    type Error = ClientError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let state = AppState::load(ctx.config_path.clone())?;
        let _guards = init_logging(state.config.log_level()?, state.config.log_dir.as_deref());

        let credential = state.store().load()?;
        let local = credential.identity()?;
        let trust = resolve_trust(&self.trust, &state.trust_file(), local)?;

        let mut tls = PinnedTls::new(&credential, trust)?;
        if let Some(timeout) = state.config.handshake_timeout() {
            tls = tls.with_handshake_timeout(timeout);
        }

        let remote = self
            .remote
            .clone()
            .unwrap_or_else(|| state.config.server_addr.clone());
        let message = SendMessage::new(self.message.as_bytes());
        let peer = send(&remote, &tls, &message).await?;

        Ok(format!(
            "Sent {} bytes to {} (identity {})",
            message.len(),
            remote,
            peer
        ))
    }
}
