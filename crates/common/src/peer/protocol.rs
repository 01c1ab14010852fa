use anyhow::anyhow;
use futures::future::BoxFuture;
use iroh::endpoint::Connection;
use iroh::protocol::AcceptError;

use crate::crypto::PublicKey;
use crate::handshake::{self, FramedStream};
use crate::sigchain::ClaimStore;

use super::peer::Peer;

/// ALPN identifier for the claims protocol
pub const ALPN: &[u8] = b"/keynode/claims/1";

impl<S: ClaimStore> Peer<S> {
    /// Handle an incoming connection
    ///
    /// Called by the iroh router for each connection with the claims ALPN.
    /// The remote's node id doubles as its Ed25519 public key, which is the
    /// out-of-band identity the handshake verifies signatures against.
    pub fn handle_connection(
        self,
        conn: Connection,
    ) -> BoxFuture<'static, Result<(), AcceptError>> {
        Box::pin(async move {
            let remote = conn.remote_node_id().map_err(|e| {
                let err: Box<dyn std::error::Error + Send + Sync> =
                    anyhow!("failed to resolve remote node id: {}", e).into();
                AcceptError::from(err)
            })?;
            let initiator = PublicKey::from(remote);
            tracing::debug!(peer = %initiator, "accepted claims connection");

            let (send, recv) = conn.accept_bi().await.map_err(AcceptError::from)?;
            let mut stream = FramedStream::new(recv, send);

            match handshake::respond(
                self.chain(),
                &initiator,
                &mut stream,
                self.handshake_config(),
            )
            .await
            {
                Ok(claim) => {
                    tracing::info!(
                        peer = %initiator,
                        claim_id = %claim.payload.claim_id,
                        "cross-sign completed"
                    );
                }
                Err(e) => {
                    // dropping the stream aborts the handshake; the
                    // initiator sees the closure and no chain mutates
                    tracing::warn!(peer = %initiator, "cross-sign failed: {}", e);
                    return Ok(());
                }
            }

            conn.closed().await;
            Ok(())
        })
    }
}

// Implement the iroh protocol handler trait
// This allows the router to accept connections for this protocol
impl<S: ClaimStore> iroh::protocol::ProtocolHandler for Peer<S> {
    #[allow(refining_impl_trait)]
    fn accept(&self, conn: Connection) -> BoxFuture<'static, Result<(), AcceptError>> {
        let this = self.clone();
        this.handle_connection(conn)
    }
}
