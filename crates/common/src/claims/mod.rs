mod codec;
mod id;
mod payload;
mod verify;

pub use codec::{
    claim_digest, decode_claim, decode_payload, decode_protected, digest, encode_claim,
    encode_payload, encode_protected, payload_digest, sign_payload, signing_input,
    ProtectedHeader, ALG_ED25519,
};
pub(crate) use codec::{decode_entry, encode_entry};
pub use id::{ClaimId, ClaimIdError, ClaimIdGenerator, CLAIM_ID_SIZE};
pub use payload::{
    ChainEntry, ClaimPayload, ClaimSignature, ClaimType, Digest, SignedClaim, DIGEST_SIZE,
};
pub use verify::{verify_link, verify_signature};

/// Errors produced by the claim codec.
#[derive(Debug, thiserror::Error)]
pub enum ClaimError {
    /// The bytes do not decode to a claim of the expected schema.
    /// Unknown fields are rejected rather than silently dropped.
    #[error("malformed claim: {0}")]
    Malformed(String),
    /// A claim could not be canonically encoded. This indicates a bug
    /// in the payload type rather than bad input.
    #[error("claim encoding failed: {0}")]
    Encoding(#[from] serde_json::Error),
    #[error(transparent)]
    Id(#[from] ClaimIdError),
}
