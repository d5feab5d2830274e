use clap::Args;

use common::crypto::CredentialError;
use common::store::StoreError;
use ffsend_daemon::state::{AppState, StateError};

/// Print this node's identity, for peers to pin
#[derive(Args, Debug, Clone)]
pub struct Identity;

#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    #[error("state error: {0}")]
    State(#[from] StateError),

    #[error("failed to load credential: {0}")]
    Store(#[from] StoreError),

    #[error("failed to derive identity: {0}")]
    Credential(#[from] CredentialError),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Identity {
    type Error = IdentityError;
    type Output = common::crypto::Identity;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let state = AppState::load(ctx.config_path.clone())?;
        let credential = state.store().load()?;
        Ok(credential.identity()?)
    }
}
