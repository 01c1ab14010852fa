use anyhow::Result;
use tokio::io::{DuplexStream, ReadHalf, WriteHalf};

use crate::claims::SignedClaim;
use crate::crypto::{PublicKey, SecretKey};
use crate::handshake::{self, FramedStream, HandshakeConfig, HandshakeError};
use crate::sigchain::{MemoryClaimStore, MemoryClaimStoreError, Sigchain};

/// A framed stream end over an in-process duplex pipe
pub type DuplexFramed = FramedStream<ReadHalf<DuplexStream>, WriteHalf<DuplexStream>>;

/// One in-memory node: a fresh keypair and a memory-backed chain
///
/// The store handle is kept alongside the chain so tests can reach past the
/// chain's integrity checks (e.g. to corrupt entries).
pub struct TestNode {
    pub secret_key: SecretKey,
    pub store: MemoryClaimStore,
    pub chain: Sigchain<MemoryClaimStore>,
}

impl TestNode {
    pub async fn new() -> Result<Self> {
        let secret_key = SecretKey::generate();
        let store = MemoryClaimStore::new();
        let chain = Sigchain::open(store.clone(), secret_key.clone()).await?;
        Ok(Self {
            secret_key,
            store,
            chain,
        })
    }

    pub fn node_id(&self) -> PublicKey {
        self.secret_key.public()
    }
}

/// Two connected framed stream ends over an in-process pipe
pub fn framed_pair() -> (DuplexFramed, DuplexFramed) {
    let (a, b) = tokio::io::duplex(64 * 1024);
    let (a_read, a_write) = tokio::io::split(a);
    let (b_read, b_write) = tokio::io::split(b);
    (
        FramedStream::new(a_read, a_write),
        FramedStream::new(b_read, b_write),
    )
}

type HandshakeResult = Result<SignedClaim, HandshakeError<MemoryClaimStoreError>>;

/// Run a full cross-sign handshake between two nodes over an in-process
/// pipe, driving both sides concurrently. Returns both sides' outcomes.
pub async fn cross_sign(
    initiator: &TestNode,
    responder: &TestNode,
) -> (HandshakeResult, HandshakeResult) {
    let config = HandshakeConfig::default();
    let (mut i_stream, mut r_stream) = framed_pair();
    let responder_id = responder.node_id();
    let initiator_id = initiator.node_id();
    tokio::join!(
        handshake::initiate(
            &initiator.chain,
            &responder_id,
            &mut i_stream,
            &config,
        ),
        handshake::respond(
            &responder.chain,
            &initiator_id,
            &mut r_stream,
            &config,
        ),
    )
}
