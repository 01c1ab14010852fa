use clap::{Args, Subcommand};

pub mod list;
pub mod verify;

use crate::op::Op;

crate::command_enum! {
    (List, list::List),
    (Verify, verify::Verify),
}

// Rename the generated Command to ChainCommand for clarity
pub type ChainCommand = Command;

#[derive(Args, Debug, Clone)]
pub struct Chain {
    #[command(subcommand)]
    pub command: ChainCommand,
}

#[async_trait::async_trait]
impl Op for Chain {
    type Error = OpError;
    type Output = OpOutput;

    async fn execute(&self, ctx: &crate::op::OpContext) -> Result<Self::Output, Self::Error> {
        self.command.execute(ctx).await
    }
}
