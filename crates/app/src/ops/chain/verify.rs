use clap::Args;

use common::sigchain::{SigchainError, SledClaimStoreError};

use crate::state::AppState;

/// Re-verify every hash link and signature on this node's chain
#[derive(Args, Debug, Clone)]
pub struct Verify {}

#[derive(Debug, thiserror::Error)]
pub enum VerifyError {
    #[error("state error: {0}")]
    State(#[from] crate::state::StateError),
    #[error("chain error: {0}")]
    Chain(#[from] SigchainError<SledClaimStoreError>),
}

#[async_trait::async_trait]
impl crate::op::Op for Verify {
    type Error = VerifyError;
    type Output = String;

    async fn execute(&self, ctx: &crate::op::OpContext) -> Result<Self::Output, Self::Error> {
        let state = AppState::load(ctx.config_path.clone())?;
        // open_chain verifies once already; verify_chain again so the op
        // reports the chain length it checked
        let chain = state.open_chain().await?;
        let len = chain.verify_chain().await?;
        Ok(format!("chain ok: {} claim(s) verified", len))
    }
}
