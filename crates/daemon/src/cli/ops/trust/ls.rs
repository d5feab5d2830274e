use clap::Args;

use ffsend_daemon::state::{AppState, StateError};
use ffsend_daemon::trust_file::TrustFileError;

/// List the identities in the trust file
#[derive(Args, Debug, Clone)]
pub struct Ls;

#[derive(Debug, thiserror::Error)]
pub enum LsError {
    #[error("state error: {0}")]
    State(#[from] StateError),

    #[error("failed to read trusted peers: {0}")]
    TrustFile(#[from] TrustFileError),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Ls {
    type Error = LsError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let state = AppState::load(ctx.config_path.clone())?;
        let trust_file = state.trust_file();
        let path = trust_file.path().display();

        let output = match trust_file.load()? {
            None => format!(
                "No trust file at {}; only this node's own identity is trusted",
                path
            ),
            Some(trust) if trust.is_empty() => {
                format!("{} lists no peers; every connection is rejected", path)
            }
            Some(trust) => trust
                .sorted()
                .iter()
                .map(|identity| identity.to_hex())
                .collect::<Vec<_>>()
                .join("\n"),
        };
        Ok(output)
    }
}
