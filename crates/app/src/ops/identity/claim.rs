use clap::Args;

use common::claims::ClaimType;
use common::sigchain::{SigchainError, SledClaimStoreError};

use crate::state::AppState;

/// Append a self-signed claim linking this node to an external identity
#[derive(Args, Debug, Clone)]
pub struct Claim {
    /// Identity provider, e.g. "github.com"
    pub provider: String,

    /// Identity on that provider, e.g. a username
    pub identity: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ClaimError {
    #[error("state error: {0}")]
    State(#[from] crate::state::StateError),
    #[error("chain error: {0}")]
    Chain(#[from] SigchainError<SledClaimStoreError>),
}

#[async_trait::async_trait]
impl crate::op::Op for Claim {
    type Error = ClaimError;
    type Output = String;

    async fn execute(&self, ctx: &crate::op::OpContext) -> Result<Self::Output, Self::Error> {
        let state = AppState::load(ctx.config_path.clone())?;
        let chain = state.open_chain().await?;

        let mut txn = chain.transaction().await?;
        let claim_id = txn.append(ClaimType::IdentityLink {
            provider_id: self.provider.clone(),
            identity_id: self.identity.clone(),
        })?;
        txn.commit().await?;

        Ok(format!(
            "claimed {}:{}\nclaim id: {}",
            self.provider, self.identity, claim_id
        ))
    }
}
