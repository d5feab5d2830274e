use clap::Args;

use common::crypto::Identity;
use ffsend_daemon::state::{AppState, StateError};
use ffsend_daemon::trust_file::TrustFileError;

/// Pin a peer identity in the trust file
#[derive(Args, Debug, Clone)]
pub struct Add {
    /// Hex identity, as printed by 'ffsend identity' on the peer
    #[arg(value_name = "HEX")]
    pub identity: Identity,
}

#[derive(Debug, thiserror::Error)]
pub enum AddError {
    #[error("state error: {0}")]
    State(#[from] StateError),

    #[error("failed to update trusted peers: {0}")]
    TrustFile(#[from] TrustFileError),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Add {
    type Error = AddError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let state = AppState::load(ctx.config_path.clone())?;
        let trust_file = state.trust_file();

        if trust_file.add(self.identity)? {
            Ok(format!(
                "Trusted {} ({})",
                self.identity,
                trust_file.path().display()
            ))
        } else {
            Ok(format!("{} is already trusted", self.identity))
        }
    }
}
