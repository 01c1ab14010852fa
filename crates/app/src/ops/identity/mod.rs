use clap::{Args, Subcommand};

pub mod claim;

use crate::op::Op;

crate::command_enum! {
    (Claim, claim::Claim),
}

pub type IdentityCommand = Command;

#[derive(Args, Debug, Clone)]
pub struct Identity {
    #[command(subcommand)]
    pub command: IdentityCommand,
}

#[async_trait::async_trait]
impl Op for Identity {
    type Error = OpError;
    type Output = OpOutput;

    async fn execute(&self, ctx: &crate::op::OpContext) -> Result<Self::Output, Self::Error> {
        self.command.execute(ctx).await
    }
}
