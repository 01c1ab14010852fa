use std::path::Path;

use async_trait::async_trait;
use sled::transaction::{ConflictableTransactionError, TransactionError};
use sled::Transactional;

use crate::claims::{decode_entry, encode_entry, ChainEntry, ClaimId};

use super::store::{ClaimStore, ClaimStoreError, IterOrder, Tail};

const CLAIMS_TREE: &str = "claims";
const META_TREE: &str = "meta";
const TAIL_KEY: &[u8] = b"tail";

/// On-disk claim store backed by sled
///
/// Two trees: `claims` maps claim id bytes (sortable, so sled's key order
/// is chain order) to encoded chain entries, and `meta` holds the tail
/// pointer. `apply` runs as a single sled transaction across both trees so
/// the tail check, the entry writes, and the tail update commit or fail
/// together.
#[derive(Debug, Clone)]
pub struct SledClaimStore {
    db: sled::Db,
    claims: sled::Tree,
    meta: sled::Tree,
}

#[derive(Debug, thiserror::Error)]
pub enum SledClaimStoreError {
    #[error("sled: {0}")]
    Sled(#[from] sled::Error),
    #[error("entry encoding: {0}")]
    Encoding(String),
}

enum Abort {
    TailConflict(Option<Tail>),
    Corrupt(String),
}

impl SledClaimStore {
    /// Open (or create) a store at the given path
    pub fn open(path: impl AsRef<Path>) -> Result<Self, SledClaimStoreError> {
        let db = sled::open(path)?;
        let claims = db.open_tree(CLAIMS_TREE)?;
        let meta = db.open_tree(META_TREE)?;
        Ok(Self { db, claims, meta })
    }

    fn decode_tail(bytes: &[u8]) -> Result<Tail, String> {
        serde_json::from_slice(bytes).map_err(|e| format!("undecodable tail pointer: {}", e))
    }
}

#[async_trait]
impl ClaimStore for SledClaimStore {
    type Error = SledClaimStoreError;

    async fn tail(&self) -> Result<Option<Tail>, ClaimStoreError<Self::Error>> {
        let bytes = self
            .meta
            .get(TAIL_KEY)
            .map_err(SledClaimStoreError::from)?;
        match bytes {
            Some(bytes) => {
                let tail = Self::decode_tail(&bytes).map_err(ClaimStoreError::Corrupt)?;
                Ok(Some(tail))
            }
            None => Ok(None),
        }
    }

    async fn get(&self, id: &ClaimId) -> Result<Option<ChainEntry>, ClaimStoreError<Self::Error>> {
        let bytes = self
            .claims
            .get(id.as_bytes())
            .map_err(SledClaimStoreError::from)?;
        match bytes {
            Some(bytes) => {
                let entry = decode_entry(&bytes)
                    .map_err(|e| ClaimStoreError::Corrupt(e.to_string()))?;
                Ok(Some(entry))
            }
            None => Ok(None),
        }
    }

    async fn scan(
        &self,
        seek: Option<&ClaimId>,
        order: IterOrder,
        limit: usize,
    ) -> Result<Vec<ChainEntry>, ClaimStoreError<Self::Error>> {
        let iter: Box<dyn Iterator<Item = Result<(sled::IVec, sled::IVec), sled::Error>>> =
            match (order, seek) {
                (IterOrder::Asc, None) => Box::new(self.claims.iter()),
                (IterOrder::Asc, Some(seek)) => {
                    Box::new(self.claims.range(seek.to_bytes().to_vec()..))
                }
                (IterOrder::Desc, None) => Box::new(self.claims.iter().rev()),
                (IterOrder::Desc, Some(seek)) => {
                    Box::new(self.claims.range(..=seek.to_bytes().to_vec()).rev())
                }
            };

        let mut entries = Vec::new();
        for item in iter.take(limit) {
            let (_, bytes) = item.map_err(SledClaimStoreError::from)?;
            let entry =
                decode_entry(&bytes).map_err(|e| ClaimStoreError::Corrupt(e.to_string()))?;
            entries.push(entry);
        }
        Ok(entries)
    }

    async fn apply(
        &self,
        expected: Option<&Tail>,
        batch: &[ChainEntry],
        new_tail: &Tail,
    ) -> Result<(), ClaimStoreError<Self::Error>> {
        // encode outside the transaction closure; sled may retry it
        let mut encoded = Vec::with_capacity(batch.len());
        for entry in batch {
            let bytes = encode_entry(entry).map_err(|e| {
                ClaimStoreError::Provider(SledClaimStoreError::Encoding(e.to_string()))
            })?;
            encoded.push((entry.claim_id.to_bytes().to_vec(), bytes));
        }
        let tail_bytes = serde_json::to_vec(new_tail).map_err(|e| {
            ClaimStoreError::Provider(SledClaimStoreError::Encoding(e.to_string()))
        })?;
        let expected = expected.copied();

        let result = (&self.claims, &self.meta).transaction(|(claims, meta)| {
            let found = match meta.get(TAIL_KEY)? {
                Some(bytes) => Some(Self::decode_tail(&bytes).map_err(|e| {
                    ConflictableTransactionError::Abort(Abort::Corrupt(e))
                })?),
                None => None,
            };
            if found != expected {
                return Err(ConflictableTransactionError::Abort(Abort::TailConflict(
                    found,
                )));
            }
            for (key, bytes) in &encoded {
                claims.insert(key.as_slice(), bytes.as_slice())?;
            }
            meta.insert(TAIL_KEY, tail_bytes.as_slice())?;
            Ok(())
        });

        match result {
            Ok(()) => {
                self.db
                    .flush_async()
                    .await
                    .map_err(SledClaimStoreError::from)?;
                Ok(())
            }
            Err(TransactionError::Abort(Abort::TailConflict(found))) => {
                Err(ClaimStoreError::TailConflict { expected, found })
            }
            Err(TransactionError::Abort(Abort::Corrupt(msg))) => Err(ClaimStoreError::Corrupt(msg)),
            Err(TransactionError::Storage(e)) => {
                Err(ClaimStoreError::Provider(SledClaimStoreError::Sled(e)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use crate::claims::{
        claim_digest, sign_payload, ClaimIdGenerator, ClaimPayload, ClaimType, Digest, SignedClaim,
    };
    use crate::crypto::SecretKey;

    use super::*;

    fn entry(generator: &mut ClaimIdGenerator, sequence_number: u64, prev: Digest) -> ChainEntry {
        let secret_key = SecretKey::generate();
        let payload = ClaimPayload {
            issuer: secret_key.public(),
            claim_id: generator.next().unwrap(),
            sequence_number,
            prev_digest: prev,
            claim_type: ClaimType::IdentityLink {
                provider_id: "github.com".to_string(),
                identity_id: "tester".to_string(),
            },
            issued_at: Utc::now(),
        };
        let sig = sign_payload(&payload, &secret_key).unwrap();
        let claim = SignedClaim {
            payload,
            signatures: vec![sig],
        };
        ChainEntry {
            claim_id: claim.payload.claim_id,
            sequence_number,
            prev_digest: prev,
            claim,
        }
    }

    fn tail_of(entry: &ChainEntry) -> Tail {
        Tail {
            claim_id: entry.claim_id,
            sequence_number: entry.sequence_number,
            digest: claim_digest(&entry.claim).unwrap(),
        }
    }

    #[tokio::test]
    async fn test_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let mut generator = ClaimIdGenerator::new();
        let genesis = entry(&mut generator, 0, Digest::GENESIS);
        let tail = tail_of(&genesis);

        {
            let store = SledClaimStore::open(dir.path()).unwrap();
            store
                .apply(None, std::slice::from_ref(&genesis), &tail)
                .await
                .unwrap();
        }

        let store = SledClaimStore::open(dir.path()).unwrap();
        assert_eq!(store.tail().await.unwrap(), Some(tail));
        assert_eq!(store.get(&genesis.claim_id).await.unwrap(), Some(genesis));
    }

    #[tokio::test]
    async fn test_apply_is_atomic_on_conflict() {
        let dir = tempfile::tempdir().unwrap();
        let store = SledClaimStore::open(dir.path()).unwrap();
        let mut generator = ClaimIdGenerator::new();

        let genesis = entry(&mut generator, 0, Digest::GENESIS);
        let tail = tail_of(&genesis);
        store
            .apply(None, std::slice::from_ref(&genesis), &tail)
            .await
            .unwrap();

        let race = entry(&mut generator, 0, Digest::GENESIS);
        let race_tail = tail_of(&race);
        let result = store
            .apply(None, std::slice::from_ref(&race), &race_tail)
            .await;
        assert!(matches!(result, Err(ClaimStoreError::TailConflict { .. })));

        // the losing batch must leave no trace
        assert_eq!(store.get(&race.claim_id).await.unwrap(), None);
        assert_eq!(store.tail().await.unwrap(), Some(tail));
    }

    #[tokio::test]
    async fn test_scan_matches_append_order() {
        let dir = tempfile::tempdir().unwrap();
        let store = SledClaimStore::open(dir.path()).unwrap();
        let mut generator = ClaimIdGenerator::new();

        let mut prev = Digest::GENESIS;
        let mut expected = None;
        let mut entries = Vec::new();
        for sequence_number in 0..3 {
            let e = entry(&mut generator, sequence_number, prev);
            let tail = tail_of(&e);
            store
                .apply(expected.as_ref(), std::slice::from_ref(&e), &tail)
                .await
                .unwrap();
            prev = tail.digest;
            expected = Some(tail);
            entries.push(e);
        }

        let asc = store.scan(None, IterOrder::Asc, 10).await.unwrap();
        assert_eq!(asc, entries);

        let from_second = store
            .scan(Some(&entries[1].claim_id), IterOrder::Asc, 10)
            .await
            .unwrap();
        assert_eq!(from_second, &entries[1..]);
    }
}
