use ed25519_dalek::Signature;

use crate::crypto::PublicKey;

use super::codec::{self, ALG_ED25519};
use super::{ChainEntry, ClaimPayload, ClaimSignature};

/// Verify one detached signature over a claim payload
///
/// Recomputes the canonical payload digest and checks the Ed25519 signature
/// over it against `public_key`. Every failure mode - unknown algorithm,
/// key-reference mismatch, undecodable signature, bad signature - returns
/// `false`; verification never errs toward trust.
pub fn verify_signature(
    payload: &ClaimPayload,
    sig: &ClaimSignature,
    public_key: &PublicKey,
) -> bool {
    if sig.signer != *public_key {
        return false;
    }
    let header = match codec::decode_protected(&sig.protected) {
        Ok(header) => header,
        Err(_) => return false,
    };
    // fail closed on algorithms we do not implement
    if header.alg != ALG_ED25519 || header.kid != public_key.to_hex() {
        return false;
    }
    let digest = match codec::payload_digest(payload) {
        Ok(digest) => digest,
        Err(_) => return false,
    };
    let signature_bytes = match codec::signature_bytes(sig) {
        Ok(bytes) => bytes,
        Err(_) => return false,
    };
    let signature = Signature::from_bytes(&signature_bytes);
    public_key
        .verify(&codec::signing_input(&sig.protected, &digest), &signature)
        .is_ok()
}

/// Check sequence and digest continuity between two adjacent chain entries
///
/// Pure function, usable without any storage: `entry` must sit immediately
/// after `prev` and its `prev_digest` must equal the digest of `prev`'s
/// claim envelope.
pub fn verify_link(entry: &ChainEntry, prev: &ChainEntry) -> bool {
    if entry.sequence_number != prev.sequence_number + 1 {
        return false;
    }
    match codec::claim_digest(&prev.claim) {
        Ok(digest) => entry.prev_digest == digest,
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use crate::claims::{ClaimId, ClaimIdGenerator, ClaimType, Digest, SignedClaim};
    use crate::crypto::SecretKey;

    use super::*;

    fn payload_for(secret_key: &SecretKey, sequence_number: u64) -> ClaimPayload {
        ClaimPayload {
            issuer: secret_key.public(),
            claim_id: ClaimIdGenerator::new().next().unwrap(),
            sequence_number,
            prev_digest: Digest::GENESIS,
            claim_type: ClaimType::IdentityLink {
                provider_id: "github.com".to_string(),
                identity_id: "keynode-tester".to_string(),
            },
            issued_at: Utc::now(),
        }
    }

    #[test]
    fn test_valid_signature_verifies() {
        let secret_key = SecretKey::generate();
        let payload = payload_for(&secret_key, 0);
        let sig = codec::sign_payload(&payload, &secret_key).unwrap();
        assert!(verify_signature(&payload, &sig, &secret_key.public()));
    }

    #[test]
    fn test_signature_fails_against_wrong_key() {
        let secret_key = SecretKey::generate();
        let payload = payload_for(&secret_key, 0);
        let sig = codec::sign_payload(&payload, &secret_key).unwrap();
        let other = SecretKey::generate().public();
        assert!(!verify_signature(&payload, &sig, &other));
    }

    #[test]
    fn test_signature_fails_on_modified_payload() {
        let secret_key = SecretKey::generate();
        let mut payload = payload_for(&secret_key, 0);
        let sig = codec::sign_payload(&payload, &secret_key).unwrap();

        payload.sequence_number = 7;
        assert!(!verify_signature(&payload, &sig, &secret_key.public()));
    }

    #[test]
    fn test_unknown_algorithm_fails_closed() {
        let secret_key = SecretKey::generate();
        let payload = payload_for(&secret_key, 0);
        let mut sig = codec::sign_payload(&payload, &secret_key).unwrap();

        let header = codec::ProtectedHeader {
            alg: "ES256".to_string(),
            kid: secret_key.public().to_hex(),
        };
        sig.protected = codec::encode_protected(&header).unwrap();
        assert!(!verify_signature(&payload, &sig, &secret_key.public()));
    }

    #[test]
    fn test_garbage_signature_fails_closed() {
        let secret_key = SecretKey::generate();
        let payload = payload_for(&secret_key, 0);
        let mut sig = codec::sign_payload(&payload, &secret_key).unwrap();
        sig.signature = "not-base64url!!!".to_string();
        assert!(!verify_signature(&payload, &sig, &secret_key.public()));
    }

    fn entry_at(secret_key: &SecretKey, sequence_number: u64, prev_digest: Digest) -> ChainEntry {
        let mut payload = payload_for(secret_key, sequence_number);
        payload.prev_digest = prev_digest;
        let sig = codec::sign_payload(&payload, secret_key).unwrap();
        let claim = SignedClaim {
            payload,
            signatures: vec![sig],
        };
        ChainEntry {
            claim_id: claim.payload.claim_id,
            sequence_number,
            prev_digest,
            claim,
        }
    }

    #[test]
    fn test_verify_link_accepts_adjacent_entries() {
        let secret_key = SecretKey::generate();
        let genesis = entry_at(&secret_key, 0, Digest::GENESIS);
        let next = entry_at(
            &secret_key,
            1,
            codec::claim_digest(&genesis.claim).unwrap(),
        );
        assert!(verify_link(&next, &genesis));
    }

    #[test]
    fn test_verify_link_rejects_gap_and_stale_digest() {
        let secret_key = SecretKey::generate();
        let genesis = entry_at(&secret_key, 0, Digest::GENESIS);
        let digest = codec::claim_digest(&genesis.claim).unwrap();

        let gap = entry_at(&secret_key, 2, digest);
        assert!(!verify_link(&gap, &genesis));

        let stale = entry_at(&secret_key, 1, Digest::from_bytes([9u8; 32]));
        assert!(!verify_link(&stale, &genesis));
    }

    #[test]
    fn test_claim_id_hex_sorts_like_bytes() {
        // hex encoding preserves byte order, which the storage layer
        // relies on for ranged iteration
        let a = ClaimId::from_bytes([1u8; 16]);
        let b = ClaimId::from_bytes([2u8; 16]);
        assert!(a.to_hex() < b.to_hex());
    }
}
