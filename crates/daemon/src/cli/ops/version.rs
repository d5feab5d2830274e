use clap::Args;

use common::prelude::build_info;

#[derive(Args, Debug, Clone)]
pub struct Version;

#[async_trait::async_trait]
impl crate::cli::op::Op for Version {
    type Error = std::convert::Infallible;
    type Output = String;

    async fn execute(&self, _ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        Ok(build_info().to_string())
    }
}
