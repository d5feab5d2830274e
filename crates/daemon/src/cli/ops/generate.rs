use clap::Args;

use common::crypto::CredentialError;
use common::store::{Generated, StoreError};
use ffsend_daemon::state::{AppState, StateError};

#[derive(Args, Debug, Clone)]
pub struct Generate {
    /// Replace an existing credential (peers that pinned the old identity will reject this node)
    #[arg(short, long)]
    pub force: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum GenerateError {
    #[error("state error: {0}")]
    State(#[from] StateError),

    #[error("failed to generate credential: {0}")]
    Store(#[from] StoreError),

    #[error("failed to derive identity: {0}")]
    Identity(#[from] CredentialError),

    #[error("credential generation task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Generate {
    type Error = GenerateError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let state = AppState::load(ctx.config_path.clone())?;
        let store = state.store();
        let dir = store.dir().display().to_string();

        // RSA key generation is CPU bound
        let force = self.force;
        let generated = tokio::task::spawn_blocking(move || store.generate(force)).await??;
        state.write_default_config()?;

        let identity = generated.credential().identity()?;
        let output = match generated {
            Generated::Created(_) => format!("Generated new credential in {}\nidentity: {}", dir, identity),
            Generated::Existing(_) => format!(
                "Credential already present in {} (use --force to replace it)\nidentity: {}",
                dir, identity
            ),
        };
        Ok(output)
    }
}
