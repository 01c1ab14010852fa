use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::crypto::PublicKey;

use super::ClaimId;

/// Size of a claim digest in bytes
pub const DIGEST_SIZE: usize = 32;

/// Blake3 digest of a claim's canonical encoding
///
/// Referenced by the next claim in a chain to prove ordering and
/// immutability. Serializes as a hex string.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Digest([u8; DIGEST_SIZE]);

impl Digest {
    /// Sentinel `prev_digest` for the first claim in a chain
    pub const GENESIS: Digest = Digest([0u8; DIGEST_SIZE]);

    pub fn from_bytes(bytes: [u8; DIGEST_SIZE]) -> Self {
        Digest(bytes)
    }

    pub fn to_bytes(&self) -> [u8; DIGEST_SIZE] {
        self.0
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn from_hex(hex: &str) -> Result<Self, hex::FromHexError> {
        let mut buff = [0u8; DIGEST_SIZE];
        hex::decode_to_slice(hex, &mut buff)?;
        Ok(Digest(buff))
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn is_genesis(&self) -> bool {
        *self == Self::GENESIS
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Digest({})", self.to_hex())
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl Serialize for Digest {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Digest {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let hex_str = String::deserialize(deserializer)?;
        Digest::from_hex(&hex_str).map_err(serde::de::Error::custom)
    }
}

/// The kind of trust statement a claim makes
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields, rename_all = "snake_case")]
pub enum ClaimType {
    /// Mutual trust edge to another node, produced by the cross-sign
    /// handshake and carrying both parties' signatures
    NodeLink { linked_node: PublicKey },
    /// Statement that this node controls an identity on an external
    /// provider, self-issued with a single signature
    IdentityLink {
        provider_id: String,
        identity_id: String,
    },
}

/// The unsigned logical content of one ledger entry
///
/// For a cross-signed `NodeLink` the payload is built - and framed - by the
/// handshake initiator: `issuer` is always the initiator, and `claim_id` /
/// `sequence_number` / `prev_digest` describe the initiator's chain tail.
/// The responder adopts the payload byte-for-byte and frames it into its own
/// chain via the surrounding [`ChainEntry`]. Consumers treat a `NodeLink` as
/// an undirected edge between `issuer` and `linked_node`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ClaimPayload {
    /// The node whose chain this claim was issued on
    pub issuer: PublicKey,
    /// Sortable id assigned by the issuer at draft time
    pub claim_id: ClaimId,
    /// 0-based position in the issuer's chain
    pub sequence_number: u64,
    /// Digest of the issuer's previous claim, or [`Digest::GENESIS`]
    pub prev_digest: Digest,
    pub claim_type: ClaimType,
    /// Advisory only; ordering authority is `sequence_number`
    pub issued_at: DateTime<Utc>,
}

/// One detached signature over a claim payload
///
/// `protected` is a base64url-encoded JSON header naming the algorithm and
/// the signer's key; `signature` is the base64url-encoded Ed25519 signature
/// over the protected header and the payload digest.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ClaimSignature {
    pub signer: PublicKey,
    pub protected: String,
    pub signature: String,
}

/// A claim payload plus its ordered, non-empty signature set
///
/// This envelope is both the wire shape and the storage shape. A singly
/// signed envelope in flight during the handshake is the "claim
/// intermediary"; it is never persisted with fewer signatures than its
/// claim type requires.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct SignedClaim {
    pub payload: ClaimPayload,
    pub signatures: Vec<ClaimSignature>,
}

impl SignedClaim {
    /// Whether this claim carries both parties' signatures
    pub fn is_cross_signed(&self) -> bool {
        self.signatures.len() == 2
    }

    /// Find the signature attributable to a given signer, if any
    pub fn signature_by(&self, signer: &PublicKey) -> Option<&ClaimSignature> {
        self.signatures.iter().find(|sig| sig.signer == *signer)
    }

    /// For a `NodeLink` claim, the party that is not `node`
    pub fn link_counterpart(&self, node: &PublicKey) -> Option<PublicKey> {
        match &self.payload.claim_type {
            ClaimType::NodeLink { linked_node } => {
                if self.payload.issuer == *node {
                    Some(*linked_node)
                } else if *linked_node == *node {
                    Some(self.payload.issuer)
                } else {
                    None
                }
            }
            ClaimType::IdentityLink { .. } => None,
        }
    }
}

/// One committed position in a chain: local framing plus the signed claim
///
/// For self-issued claims (and for the initiator's copy of a cross-signed
/// claim) the framing mirrors the payload's own fields. For a claim adopted
/// from a handshake counterpart the payload stays byte-identical to the
/// initiator's copy while the framing links it into this chain's history.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ChainEntry {
    /// Id of this entry in the local chain
    pub claim_id: ClaimId,
    /// 0-based position in the local chain
    pub sequence_number: u64,
    /// Digest of the previous entry's claim, or [`Digest::GENESIS`]
    pub prev_digest: Digest,
    pub claim: SignedClaim,
}
