use std::net::{Ipv4Addr, SocketAddr};

use clap::Args;
use tracing::info;

use common::peer::{self, PeerBuilder};
use common::sigchain::SledClaimStore;

use crate::state::AppState;

/// Run this node in the foreground, serving inbound cross-sign requests
/// until interrupted
#[derive(Args, Debug, Clone)]
pub struct Daemon {}

#[derive(Debug, thiserror::Error)]
pub enum DaemonError {
    #[error("state error: {0}")]
    State(#[from] crate::state::StateError),
    #[error("store error: {0}")]
    Store(#[from] common::sigchain::SledClaimStoreError),
    #[error(transparent)]
    Runtime(#[from] anyhow::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[async_trait::async_trait]
impl crate::op::Op for Daemon {
    type Error = DaemonError;
    type Output = String;

    async fn execute(&self, ctx: &crate::op::OpContext) -> Result<Self::Output, Self::Error> {
        let state = AppState::load(ctx.config_path.clone())?;
        let key = state.load_key()?;
        let store = SledClaimStore::open(&state.chain_path)?;

        let port = state.config.peer_port.unwrap_or(0);
        let socket_address = SocketAddr::new(Ipv4Addr::UNSPECIFIED.into(), port);

        let peer = PeerBuilder::new()
            .socket_address(socket_address)
            .secret_key(key)
            .store(store)
            .discovery(state.config.discovery)
            .build()
            .await?;

        info!(
            node_id = %peer.node_id(),
            socket = %peer.socket(),
            discovery = state.config.discovery,
            "daemon started"
        );
        println!("node id: {}", peer.node_id().to_hex());
        println!("listening on {}", peer.socket());

        let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(());
        let handle = tokio::spawn(peer::spawn(peer, shutdown_rx));

        tokio::signal::ctrl_c().await?;
        info!("shutting down");

        let _ = shutdown_tx.send(());
        handle
            .await
            .map_err(|e| anyhow::anyhow!("daemon task panicked: {}", e))??;

        Ok("daemon stopped".to_string())
    }
}
