use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use crate::claims::{ChainEntry, ClaimId};

use super::store::{ClaimStore, ClaimStoreError, IterOrder, Tail};

/// In-memory claim store backed by a BTreeMap
///
/// Used by tests and short-lived nodes; the map's key order gives us the
/// same ranged iteration semantics as the on-disk store.
#[derive(Debug, Clone)]
pub struct MemoryClaimStore {
    inner: Arc<RwLock<MemoryClaimStoreInner>>,
}

#[derive(Debug, Default)]
struct MemoryClaimStoreInner {
    entries: BTreeMap<ClaimId, ChainEntry>,
    tail: Option<Tail>,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum MemoryClaimStoreError {
    #[error("memory store error: {0}")]
    Internal(String),
}

impl MemoryClaimStore {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(MemoryClaimStoreInner::default())),
        }
    }

    /// Overwrite one stored entry in place, bypassing every integrity
    /// check. Exists so tests can corrupt a chain and assert that
    /// verification catches it.
    pub fn tamper(&self, id: &ClaimId, f: impl FnOnce(&mut ChainEntry)) -> bool {
        let mut inner = match self.inner.write() {
            Ok(inner) => inner,
            Err(_) => return false,
        };
        match inner.entries.get_mut(id) {
            Some(entry) => {
                f(entry);
                true
            }
            None => false,
        }
    }
}

impl Default for MemoryClaimStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ClaimStore for MemoryClaimStore {
    type Error = MemoryClaimStoreError;

    async fn tail(&self) -> Result<Option<Tail>, ClaimStoreError<Self::Error>> {
        let inner = self.inner.read().map_err(|e| {
            ClaimStoreError::Provider(MemoryClaimStoreError::Internal(format!(
                "failed to acquire read lock: {}",
                e
            )))
        })?;
        Ok(inner.tail)
    }

    async fn get(&self, id: &ClaimId) -> Result<Option<ChainEntry>, ClaimStoreError<Self::Error>> {
        let inner = self.inner.read().map_err(|e| {
            ClaimStoreError::Provider(MemoryClaimStoreError::Internal(format!(
                "failed to acquire read lock: {}",
                e
            )))
        })?;
        Ok(inner.entries.get(id).cloned())
    }

    async fn scan(
        &self,
        seek: Option<&ClaimId>,
        order: IterOrder,
        limit: usize,
    ) -> Result<Vec<ChainEntry>, ClaimStoreError<Self::Error>> {
        let inner = self.inner.read().map_err(|e| {
            ClaimStoreError::Provider(MemoryClaimStoreError::Internal(format!(
                "failed to acquire read lock: {}",
                e
            )))
        })?;

        let entries: Vec<ChainEntry> = match (order, seek) {
            (IterOrder::Asc, None) => inner.entries.values().take(limit).cloned().collect(),
            (IterOrder::Asc, Some(seek)) => inner
                .entries
                .range((Bound::Included(*seek), Bound::Unbounded))
                .map(|(_, entry)| entry)
                .take(limit)
                .cloned()
                .collect(),
            (IterOrder::Desc, None) => inner.entries.values().rev().take(limit).cloned().collect(),
            (IterOrder::Desc, Some(seek)) => inner
                .entries
                .range((Bound::Unbounded, Bound::Included(*seek)))
                .rev()
                .map(|(_, entry)| entry)
                .take(limit)
                .cloned()
                .collect(),
        };
        Ok(entries)
    }

    async fn apply(
        &self,
        expected: Option<&Tail>,
        batch: &[ChainEntry],
        new_tail: &Tail,
    ) -> Result<(), ClaimStoreError<Self::Error>> {
        let mut inner = self.inner.write().map_err(|e| {
            ClaimStoreError::Provider(MemoryClaimStoreError::Internal(format!(
                "failed to acquire write lock: {}",
                e
            )))
        })?;

        if inner.tail.as_ref() != expected {
            return Err(ClaimStoreError::TailConflict {
                expected: expected.copied(),
                found: inner.tail,
            });
        }

        for entry in batch {
            inner.entries.insert(entry.claim_id, entry.clone());
        }
        inner.tail = Some(*new_tail);
        Ok(())
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
    async fn test_apply_and_get() {
        let store = MemoryClaimStore::new();
        let mut generator = ClaimIdGenerator::new();
        let genesis = entry(&mut generator, 0, Digest::GENESIS);
        let tail = tail_of(&genesis);

        store
            .apply(None, std::slice::from_ref(&genesis), &tail)
            .await
            .unwrap();

        assert_eq!(store.tail().await.unwrap(), Some(tail));
        assert_eq!(store.get(&genesis.claim_id).await.unwrap(), Some(genesis));
    }

    #[tokio::test]
    async fn test_apply_detects_tail_conflict() {
        let store = MemoryClaimStore::new();
        let mut generator = ClaimIdGenerator::new();
        let genesis = entry(&mut generator, 0, Digest::GENESIS);
        let tail = tail_of(&genesis);

        store
            .apply(None, std::slice::from_ref(&genesis), &tail)
            .await
            .unwrap();

        // a second writer that still thinks the chain is empty must lose
        let race = entry(&mut generator, 0, Digest::GENESIS);
        let race_tail = tail_of(&race);
        let result = store.apply(None, std::slice::from_ref(&race), &race_tail).await;
        assert!(matches!(result, Err(ClaimStoreError::TailConflict { .. })));
        assert_eq!(store.tail().await.unwrap(), Some(tail));
    }

    #[tokio::test]
    async fn test_scan_orders_and_seeks() {
        let store = MemoryClaimStore::new();
        let mut generator = ClaimIdGenerator::new();

        let mut prev = Digest::GENESIS;
        let mut expected = None;
        let mut entries = Vec::new();
        for sequence_number in 0..4 {
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

        let desc = store.scan(None, IterOrder::Desc, 10).await.unwrap();
        let mut reversed = entries.clone();
        reversed.reverse();
        assert_eq!(desc, reversed);

        // seek lands at-or-after for ascending scans
        let from_third = store
            .scan(Some(&entries[2].claim_id), IterOrder::Asc, 10)
            .await
            .unwrap();
        assert_eq!(from_third, &entries[2..]);

        // and at-or-before for descending scans
        let to_second = store
            .scan(Some(&entries[1].claim_id), IterOrder::Desc, 10)
            .await
            .unwrap();
        assert_eq!(to_second, vec![entries[1].clone(), entries[0].clone()]);
    }
}
