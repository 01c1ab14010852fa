use iroh::protocol::Router;
use tokio::sync::watch::Receiver as WatchReceiver;

mod peer;
mod protocol;

pub use peer::{Peer, PeerBuilder, PeerError};
pub use protocol::ALPN;

// Re-export iroh types for convenience
pub use iroh::NodeAddr;

use crate::sigchain::ClaimStore;

/// Serve the claims protocol until the shutdown channel fires
pub async fn spawn<S: ClaimStore>(
    peer: Peer<S>,
    mut shutdown_rx: WatchReceiver<()>,
) -> anyhow::Result<()> {
    let router = Router::builder(peer.endpoint().clone())
        .accept(ALPN, peer)
        .spawn();

    let _ = shutdown_rx.changed().await;

    router.shutdown().await?;
    Ok(())
}
