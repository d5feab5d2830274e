use std::path::PathBuf;

use clap::Args;

use common::crypto::{CredentialError, Identity};
use common::store::StoreError;
use ffsend_daemon::state::{AppState, StateError};
use ffsend_daemon::trust_file::{resolve_trust, TrustFileError};
use ffsend_daemon::{run_server, ServiceConfig, StartError};

#[derive(Args, Debug, Clone)]
pub struct Server {
    /// Address to listen on (default from config)
    #[arg(long)]
    pub listen: Option<String>,

    /// Accept this client identity; repeatable, replaces the trust file
    #[arg(long = "trust", value_name = "HEX")]
    pub trust: Vec<Identity>,

    /// Directory for log files (default from config, stdout only if unset)
    #[arg(long)]
    pub log_dir: Option<PathBuf>,
}

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("state error: {0}")]
    State(#[from] StateError),

    #[error("failed to load credential: {0}")]
    Store(#[from] StoreError),

    #[error("failed to derive identity: {0}")]
    Credential(#[from] CredentialError),

    #[error("failed to read trusted peers: {0}")]
    TrustFile(#[from] TrustFileError),

    #[error("server failed: {0}")]
    Start(#[from] StartError),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Server {
    type Error = ServerError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let state = AppState::load(ctx.config_path.clone())?;
        let credential = state.store().load()?;
        let local = credential.identity()?;
        let trust = resolve_trust(&self.trust, &state.trust_file(), local)?;

        let config = ServiceConfig {
            listen_addr: self
                .listen
                .clone()
                .unwrap_or_else(|| state.config.listen_addr.clone()),
            max_connections: state.config.max_connections,
            credential,
            trust,
            handshake_timeout: state.config.handshake_timeout(),
            log_level: state.config.log_level()?,
            log_dir: self.log_dir.clone().or_else(|| state.config.log_dir.clone()),
        };

        run_server(&config).await?;
        Ok("server stopped".to_string())
    }
}
