use clap::{Args, Subcommand};

pub mod add;
pub mod ls;

use crate::cli::op::Op;

crate::command_enum! {
    (Add, add::Add),
    (Ls, ls::Ls),
}

// Rename the generated Command to TrustCommand for clarity
pub type TrustCommand = Command;

/// Manage the identities this node accepts
#[derive(Args, Debug, Clone)]
pub struct Trust {
    #[command(subcommand)]
    pub command: TrustCommand,
}

#[async_trait::async_trait]
impl Op for Trust {
    type Error = OpError;
    type Output = OpOutput;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        self.command.execute(ctx).await
    }
}
