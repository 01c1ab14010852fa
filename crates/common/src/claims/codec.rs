use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::crypto::SecretKey;

use super::{ChainEntry, ClaimError, ClaimPayload, ClaimSignature, Digest, SignedClaim};

/// Algorithm identifier for Ed25519 signatures, JWS-style
pub const ALG_ED25519: &str = "EdDSA";

/// Protected header carried (base64url-encoded) inside every signature
///
/// Covered by the signature itself, so neither the algorithm nor the key
/// reference can be swapped after signing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ProtectedHeader {
    /// Signature algorithm identifier. Anything other than [`ALG_ED25519`]
    /// fails verification closed.
    pub alg: String,
    /// Hex encoding of the signer's public key
    pub kid: String,
}

/// Canonically encode a claim payload (RFC 8785 JSON)
///
/// Deterministic and reproducible across implementations: this is the byte
/// string that gets digested and signed.
///
/// # Errors
/// Returns an error when serialization fails, which indicates a bug rather
/// than bad input.
pub fn encode_payload(payload: &ClaimPayload) -> Result<Vec<u8>, ClaimError> {
    Ok(serde_jcs::to_vec(payload)?)
}

/// Decode a claim payload, rejecting unknown fields
///
/// # Errors
/// Fails with [`ClaimError::Malformed`] on any schema violation.
pub fn decode_payload(bytes: &[u8]) -> Result<ClaimPayload, ClaimError> {
    serde_json::from_slice(bytes).map_err(|e| ClaimError::Malformed(e.to_string()))
}

/// Canonically encode a signed claim envelope
pub fn encode_claim(claim: &SignedClaim) -> Result<Vec<u8>, ClaimError> {
    Ok(serde_jcs::to_vec(claim)?)
}

/// Decode a signed claim envelope, rejecting unknown fields
pub fn decode_claim(bytes: &[u8]) -> Result<SignedClaim, ClaimError> {
    serde_json::from_slice(bytes).map_err(|e| ClaimError::Malformed(e.to_string()))
}

pub(crate) fn encode_entry(entry: &ChainEntry) -> Result<Vec<u8>, ClaimError> {
    Ok(serde_jcs::to_vec(entry)?)
}

pub(crate) fn decode_entry(bytes: &[u8]) -> Result<ChainEntry, ClaimError> {
    serde_json::from_slice(bytes).map_err(|e| ClaimError::Malformed(e.to_string()))
}

/// Fixed-size cryptographic hash of a canonical encoding
pub fn digest(bytes: &[u8]) -> Digest {
    Digest::from_bytes(*blake3::hash(bytes).as_bytes())
}

/// Digest of a payload's canonical encoding: the value that gets signed
pub fn payload_digest(payload: &ClaimPayload) -> Result<Digest, ClaimError> {
    Ok(digest(&encode_payload(payload)?))
}

/// Digest of a full claim envelope: the value the next chain entry links to
pub fn claim_digest(claim: &SignedClaim) -> Result<Digest, ClaimError> {
    Ok(digest(&encode_claim(claim)?))
}

/// Base64url-encode a protected header
pub fn encode_protected(header: &ProtectedHeader) -> Result<String, ClaimError> {
    Ok(URL_SAFE_NO_PAD.encode(serde_jcs::to_vec(header)?))
}

/// Decode a base64url protected header, rejecting unknown fields
pub fn decode_protected(protected: &str) -> Result<ProtectedHeader, ClaimError> {
    let bytes = URL_SAFE_NO_PAD
        .decode(protected)
        .map_err(|_| ClaimError::Malformed("protected header is not valid base64url".to_string()))?;
    serde_json::from_slice(&bytes).map_err(|e| ClaimError::Malformed(e.to_string()))
}

/// The exact byte string a claim signature covers:
/// `{protected}.{base64url(payload digest)}`
pub fn signing_input(protected: &str, digest: &Digest) -> Vec<u8> {
    let mut input = Vec::with_capacity(protected.len() + 1 + 43);
    input.extend_from_slice(protected.as_bytes());
    input.push(b'.');
    input.extend_from_slice(URL_SAFE_NO_PAD.encode(digest.as_bytes()).as_bytes());
    input
}

/// Produce one detached signature over a payload with the given key
pub fn sign_payload(
    payload: &ClaimPayload,
    secret_key: &SecretKey,
) -> Result<ClaimSignature, ClaimError> {
    let signer = secret_key.public();
    let header = ProtectedHeader {
        alg: ALG_ED25519.to_string(),
        kid: signer.to_hex(),
    };
    let protected = encode_protected(&header)?;
    let digest = payload_digest(payload)?;
    let signature = secret_key.sign(&signing_input(&protected, &digest));
    Ok(ClaimSignature {
        signer,
        protected,
        signature: URL_SAFE_NO_PAD.encode(signature.to_bytes()),
    })
}

/// Decode the raw signature bytes of a claim signature
pub(crate) fn signature_bytes(sig: &ClaimSignature) -> Result<[u8; 64], ClaimError> {
    let bytes = URL_SAFE_NO_PAD
        .decode(&sig.signature)
        .map_err(|_| ClaimError::Malformed("signature is not valid base64url".to_string()))?;
    bytes
        .try_into()
        .map_err(|_| ClaimError::Malformed("signature is not 64 bytes".to_string()))
}
