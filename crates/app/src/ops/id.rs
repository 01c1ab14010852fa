use clap::Args;

use crate::state::AppState;

/// Print this node's id (its hex-encoded public key)
#[derive(Args, Debug, Clone)]
pub struct Id {}

#[derive(Debug, thiserror::Error)]
pub enum IdError {
    #[error("state error: {0}")]
    State(#[from] crate::state::StateError),
}

#[async_trait::async_trait]
impl crate::op::Op for Id {
    type Error = IdError;
    type Output = String;

    async fn execute(&self, ctx: &crate::op::OpContext) -> Result<Self::Output, Self::Error> {
        let state = AppState::load(ctx.config_path.clone())?;
        let key = state.load_key()?;
        Ok(key.public().to_hex())
    }
}
