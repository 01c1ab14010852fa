use std::net::SocketAddr;
use std::str::FromStr;

use clap::Args;

use common::crypto::PublicKey;
use common::peer::{NodeAddr, PeerBuilder, PeerError};
use common::sigchain::{SledClaimStore, SledClaimStoreError};

use crate::state::AppState;

/// Establish a mutual link with another node via the cross-sign handshake
#[derive(Args, Debug, Clone)]
pub struct Link {
    /// The target node's id (hex-encoded public key)
    pub node_id: String,

    /// Direct socket address(es) for the target node; if omitted, the node
    /// is located via DHT discovery
    #[arg(long)]
    pub addr: Vec<SocketAddr>,
}

#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    #[error("state error: {0}")]
    State(#[from] crate::state::StateError),
    #[error("invalid node id: {0}")]
    InvalidNodeId(String),
    #[error("store error: {0}")]
    Store(#[from] SledClaimStoreError),
    #[error("peer error: {0}")]
    Peer(#[from] PeerError<SledClaimStoreError>),
    #[error(transparent)]
    Transport(#[from] anyhow::Error),
}

#[async_trait::async_trait]
impl crate::op::Op for Link {
    type Error = LinkError;
    type Output = String;

    async fn execute(&self, ctx: &crate::op::OpContext) -> Result<Self::Output, Self::Error> {
        let state = AppState::load(ctx.config_path.clone())?;
        let key = state.load_key()?;
        let store = SledClaimStore::open(&state.chain_path)?;

        let peer_key = PublicKey::from_str(&self.node_id)
            .map_err(|e| LinkError::InvalidNodeId(e.to_string()))?;
        if peer_key == key.public() {
            return Err(LinkError::InvalidNodeId(
                "cannot link a node to itself".to_string(),
            ));
        }

        let peer = PeerBuilder::new()
            .secret_key(key)
            .store(store)
            .discovery(state.config.discovery)
            .build()
            .await?;

        let node_addr = if self.addr.is_empty() {
            NodeAddr::new(*peer_key)
        } else {
            NodeAddr::from_parts(*peer_key, None, self.addr.clone())
        };

        let claim = peer.cross_sign(node_addr).await?;

        Ok(format!(
            "linked with {}\nclaim id: {}",
            peer_key.to_hex(),
            claim.payload.claim_id
        ))
    }
}
