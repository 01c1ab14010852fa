use clap::Args;

use common::claims::ClaimType;
use common::sigchain::{IterOrder, SigchainError, SledClaimStoreError};

use crate::state::AppState;

/// List the committed claims on this node's chain, oldest first
#[derive(Args, Debug, Clone)]
pub struct List {
    /// Emit the full claim envelopes as JSON instead of a summary
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum ListError {
    #[error("state error: {0}")]
    State(#[from] crate::state::StateError),
    #[error("chain error: {0}")]
    Chain(#[from] SigchainError<SledClaimStoreError>),
    #[error("encoding error: {0}")]
    Encoding(#[from] serde_json::Error),
}

#[async_trait::async_trait]
impl crate::op::Op for List {
    type Error = ListError;
    type Output = String;

    async fn execute(&self, ctx: &crate::op::OpContext) -> Result<Self::Output, Self::Error> {
        let state = AppState::load(ctx.config_path.clone())?;
        let chain = state.open_chain().await?;

        let entries = chain
            .iter(IterOrder::Asc, None)
            .await?
            .collect_entries()
            .await?;

        if self.json {
            let claims: Vec<_> = entries.iter().map(|entry| &entry.claim).collect();
            return Ok(serde_json::to_string_pretty(&claims)?);
        }

        if entries.is_empty() {
            return Ok("chain is empty".to_string());
        }

        let mut output = String::new();
        for entry in &entries {
            let description = match &entry.claim.payload.claim_type {
                ClaimType::NodeLink { linked_node } => {
                    format!("node-link {}", linked_node.to_hex())
                }
                ClaimType::IdentityLink {
                    provider_id,
                    identity_id,
                } => format!("identity-link {}:{}", provider_id, identity_id),
            };
            output.push_str(&format!(
                "{:>4}  {}  {}  ({} signature{})\n",
                entry.sequence_number,
                entry.claim_id,
                description,
                entry.claim.signatures.len(),
                if entry.claim.signatures.len() == 1 {
                    ""
                } else {
                    "s"
                }
            ));
        }
        Ok(output.trim_end().to_string())
    }
}
