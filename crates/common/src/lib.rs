/**
 * Claim data model and codec.
 *  - Sortable claim identifiers
 *  - Canonical (RFC 8785) payload encoding and digests
 *  - Detached-signature envelopes and verification
 */
pub mod claims;
/**
 * Cryptographic types and operations.
 *  - Public and Private key implementations
 *  - Ed25519 signing / verification
 */
pub mod crypto;
/**
 * The cross-sign handshake: the bilateral protocol two
 *  nodes run over a duplex stream to mutually produce and
 *  commit one doubly-signed node-link claim.
 */
pub mod handshake;
/**
 * Peer implementation. Wraps an iroh endpoint and serves
 *  the claims ALPN so remote nodes can cross-sign with us.
 */
pub mod peer;
/**
 * The sigchain: a per-node, append-only, hash-linked
 *  ledger of signed claims over a transactional ordered
 *  key-value store.
 */
pub mod sigchain;
/**
 * In-process helpers for exercising chains and handshakes
 *  in tests without real networking.
 */
pub mod testkit;

pub mod prelude {
    pub use crate::claims::{
        ChainEntry, ClaimId, ClaimPayload, ClaimSignature, ClaimType, Digest, SignedClaim,
    };
    pub use crate::crypto::{PublicKey, SecretKey};
    pub use crate::peer::Peer;
    pub use crate::sigchain::{MemoryClaimStore, Sigchain, SledClaimStore};
}
