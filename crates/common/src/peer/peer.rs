use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};

use anyhow::{anyhow, Context};
use iroh::discovery::pkarr::dht::DhtDiscovery;
use iroh::{Endpoint, NodeAddr, NodeId};

use crate::claims::SignedClaim;
use crate::crypto::{PublicKey, SecretKey};
use crate::handshake::{self, FramedStream, HandshakeConfig, HandshakeError};
use crate::sigchain::{ClaimStore, Sigchain, SigchainError};

use super::protocol::ALPN;

#[derive(Default)]
pub struct PeerBuilder<S: ClaimStore> {
    /// the socket addr to expose the peer on
    ///  if not set, an ephemeral port will be used
    socket_address: Option<SocketAddr>,
    /// the identity of the peer, as a SecretKey
    secret_key: Option<SecretKey>,
    /// storage backend for the peer's own chain
    store: Option<S>,
    handshake: Option<HandshakeConfig>,
    /// whether to announce the peer on the mainline DHT
    discovery: bool,
}

impl<S: ClaimStore> PeerBuilder<S> {
    pub fn new() -> Self {
        PeerBuilder {
            socket_address: None,
            secret_key: None,
            store: None,
            handshake: None,
            discovery: false,
        }
    }

    pub fn socket_address(mut self, socket_addr: SocketAddr) -> Self {
        self.socket_address = Some(socket_addr);
        self
    }

    pub fn secret_key(mut self, secret_key: SecretKey) -> Self {
        self.secret_key = Some(secret_key);
        self
    }

    pub fn store(mut self, store: S) -> Self {
        self.store = Some(store);
        self
    }

    pub fn handshake_config(mut self, config: HandshakeConfig) -> Self {
        self.handshake = Some(config);
        self
    }

    pub fn discovery(mut self, enabled: bool) -> Self {
        self.discovery = enabled;
        self
    }

    pub async fn build(self) -> anyhow::Result<Peer<S>> {
        // set the socket port to unspecified if not set
        let socket_addr = self
            .socket_address
            .unwrap_or_else(|| SocketAddr::new(Ipv4Addr::UNSPECIFIED.into(), 0));
        // generate a new secret key if not set
        let secret_key = self.secret_key.unwrap_or_else(SecretKey::generate);
        let store = self.store.context("store is required")?;
        let handshake = self.handshake.unwrap_or_default();

        let sigchain = Sigchain::open(store, secret_key.clone())
            .await
            .map_err(|e| anyhow!("failed to open sigchain: {}", e))?;

        let addr = SocketAddrV4::new(
            match socket_addr.ip() {
                std::net::IpAddr::V4(ip) => ip,
                std::net::IpAddr::V6(_) => anyhow::bail!("only ipv4 socket addresses are supported"),
            },
            socket_addr.port(),
        );

        let mut endpoint_builder = Endpoint::builder()
            .secret_key(secret_key.0.clone())
            .bind_addr_v4(addr);
        if self.discovery {
            let mainline_discovery = DhtDiscovery::builder()
                .secret_key(secret_key.0.clone())
                .build()
                .context("failed to build mainline discovery")?;
            endpoint_builder = endpoint_builder.discovery(mainline_discovery);
        }
        let endpoint = endpoint_builder
            .bind()
            .await
            .context("failed to bind endpoint")?;

        Ok(Peer {
            sigchain,
            secret_key,
            socket_address: socket_addr,
            endpoint,
            handshake,
        })
    }
}

#[derive(thiserror::Error, Debug)]
pub enum PeerError<E: std::error::Error + Send + Sync + 'static> {
    #[error("handshake failed: {0}")]
    Handshake(#[from] HandshakeError<E>),
    #[error(transparent)]
    Sigchain(#[from] SigchainError<E>),
    #[error("transport error: {0}")]
    Transport(#[from] anyhow::Error),
}

/// A node on the claims network
///
/// Owns the node identity, the QUIC endpoint and the node's sigchain.
/// Serves inbound cross-sign attempts when registered on a router (see
/// [`super::spawn`]) and runs outbound ones via [`Peer::cross_sign`].
#[derive(Debug, Clone)]
pub struct Peer<S: ClaimStore> {
    sigchain: Sigchain<S>,
    secret_key: SecretKey,
    socket_address: SocketAddr,
    endpoint: Endpoint,
    handshake: HandshakeConfig,
}

impl<S: ClaimStore> Peer<S> {
    pub fn chain(&self) -> &Sigchain<S> {
        &self.sigchain
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn secret(&self) -> &SecretKey {
        &self.secret_key
    }

    pub fn socket(&self) -> &SocketAddr {
        &self.socket_address
    }

    pub fn id(&self) -> NodeId {
        self.endpoint.node_id()
    }

    pub fn node_id(&self) -> PublicKey {
        self.sigchain.node_id()
    }

    pub(super) fn handshake_config(&self) -> &HandshakeConfig {
        &self.handshake
    }

    /// Establish a mutual link with another node
    ///
    /// Connects to the given address, runs the cross-sign handshake as the
    /// initiator, and returns the doubly-signed claim now committed on both
    /// chains. Safe to re-run: an existing link short-circuits on either
    /// side.
    pub async fn cross_sign(
        &self,
        node_addr: impl Into<NodeAddr>,
    ) -> Result<SignedClaim, PeerError<S::Error>> {
        let node_addr: NodeAddr = node_addr.into();
        let responder = PublicKey::from(node_addr.node_id);
        tracing::info!(peer = %responder, "initiating cross-sign");

        let conn = self
            .endpoint
            .connect(node_addr, ALPN)
            .await
            .map_err(|e| anyhow!("failed to connect to peer: {}", e))?;
        let (send, recv) = conn
            .open_bi()
            .await
            .map_err(|e| anyhow!("failed to open stream: {}", e))?;
        let mut stream = FramedStream::new(recv, send);

        let claim =
            handshake::initiate(&self.sigchain, &responder, &mut stream, &self.handshake).await?;
        conn.close(0u32.into(), b"done");
        Ok(claim)
    }
}
