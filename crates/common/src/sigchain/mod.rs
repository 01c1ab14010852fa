mod disk;
mod memory;
mod store;

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{Mutex, MutexGuard};
use tracing::instrument;

use crate::claims::{
    claim_digest, sign_payload, verify_link, verify_signature, ChainEntry, ClaimError, ClaimId,
    ClaimIdError, ClaimIdGenerator, ClaimPayload, ClaimSignature, ClaimType, Digest, SignedClaim,
};
use crate::crypto::{PublicKey, SecretKey};

pub use disk::{SledClaimStore, SledClaimStoreError};
pub use memory::{MemoryClaimStore, MemoryClaimStoreError};
pub use store::{ClaimStore, ClaimStoreError, IterOrder, Tail};

/// Entries fetched per storage round-trip while iterating
const CURSOR_PAGE: usize = 32;

#[derive(Debug, thiserror::Error)]
pub enum SigchainError<E: std::error::Error + Send + Sync + 'static> {
    #[error(transparent)]
    Store(#[from] ClaimStoreError<E>),
    /// The chain grew underneath the caller. Retryable: rebuild the
    /// claim against the new tail and try again.
    #[error("chain sequence conflict: claim is for position {expected}, chain is at {found}")]
    SequenceConflict { expected: u64, found: u64 },
    /// The caller's `prev_digest` no longer names the tail. Retryable,
    /// same as a sequence conflict.
    #[error("chain digest mismatch: expected tail {expected}, claim links {found}")]
    DigestMismatch { expected: Digest, found: Digest },
    /// Stored entries fail re-verification. Fatal: the chain must not
    /// be written to until the store is repaired or replaced.
    #[error("chain corrupted: {0}")]
    Corrupted(String),
    #[error(transparent)]
    Claim(#[from] ClaimError),
    #[error(transparent)]
    ClaimId(#[from] ClaimIdError),
}

/// One node's append-only, hash-linked ledger of signed claims
///
/// Exclusively owns its chain: every mutation goes through
/// [`Sigchain::transaction`], which serializes writers on a single async
/// lock, and commits with an optimistic tail check against the store. Reads
/// never take the lock.
#[derive(Debug, Clone)]
pub struct Sigchain<S: ClaimStore> {
    store: S,
    secret_key: SecretKey,
    node_id: PublicKey,
    writer: Arc<Mutex<ClaimIdGenerator>>,
}

impl<S: ClaimStore> Sigchain<S> {
    /// Open a chain over the given store
    ///
    /// Seeds the claim id generator from the stored tail so ids stay
    /// monotonic across restarts, then re-verifies the whole chain.
    ///
    /// # Errors
    /// Fails with [`SigchainError::Corrupted`] when the stored entries do
    /// not verify; the chain must not be used in that case.
    pub async fn open(store: S, secret_key: SecretKey) -> Result<Self, SigchainError<S::Error>> {
        let tail = store.tail().await?;
        let generator = match &tail {
            Some(tail) => ClaimIdGenerator::seeded(&tail.claim_id),
            None => ClaimIdGenerator::new(),
        };
        let node_id = secret_key.public();
        let chain = Self {
            store,
            secret_key,
            node_id,
            writer: Arc::new(Mutex::new(generator)),
        };
        let len = chain.verify_chain().await?;
        tracing::debug!(node_id = %chain.node_id, len, "opened sigchain");
        Ok(chain)
    }

    /// The public key this chain belongs to
    pub fn node_id(&self) -> PublicKey {
        self.node_id
    }

    /// Begin a write transaction
    ///
    /// Waits for the single writer lock, then snapshots the tail. Entries
    /// staged on the returned [`SigchainTxn`] are persisted only by
    /// [`SigchainTxn::commit`]; dropping the txn discards them.
    pub async fn transaction(&self) -> Result<SigchainTxn<'_, S>, SigchainError<S::Error>> {
        let generator = self.writer.lock().await;
        let base = self.store.tail().await?;
        Ok(SigchainTxn {
            chain: self,
            generator,
            base,
            staged: Vec::new(),
            staged_tail: base,
        })
    }

    /// Current tail pointer, `None` for an empty chain
    pub async fn tail(&self) -> Result<Option<Tail>, SigchainError<S::Error>> {
        Ok(self.store.tail().await?)
    }

    /// Number of committed entries
    pub async fn len(&self) -> Result<u64, SigchainError<S::Error>> {
        Ok(match self.store.tail().await? {
            Some(tail) => tail.sequence_number + 1,
            None => 0,
        })
    }

    pub async fn is_empty(&self) -> Result<bool, SigchainError<S::Error>> {
        Ok(self.store.tail().await?.is_none())
    }

    /// Look up one committed entry by claim id
    pub async fn get(&self, id: &ClaimId) -> Result<Option<ChainEntry>, SigchainError<S::Error>> {
        Ok(self.store.get(id).await?)
    }

    /// Iterate committed entries
    ///
    /// The cursor is bounded by the tail as of this call; entries committed
    /// afterwards are not yielded. `seek` is inclusive: the cursor starts at
    /// the first entry at-or-after (ascending) / at-or-before (descending)
    /// the given id, so resuming a previous iteration means seeking to the
    /// last seen id and discarding the first yield.
    pub async fn iter(
        &self,
        order: IterOrder,
        seek: Option<ClaimId>,
    ) -> Result<ClaimCursor<S>, SigchainError<S::Error>> {
        let bound = self.store.tail().await?;
        let next_seek = match (order, seek, &bound) {
            (_, Some(seek), _) => Some(seek),
            (IterOrder::Desc, None, Some(tail)) => Some(tail.claim_id),
            _ => None,
        };
        Ok(ClaimCursor {
            store: self.store.clone(),
            order,
            bound,
            buffer: VecDeque::new(),
            next_seek,
            skip_seek: false,
            exhausted: bound.is_none(),
        })
    }

    /// Sign a claim payload with this chain's key
    pub fn sign(&self, payload: &ClaimPayload) -> Result<ClaimSignature, SigchainError<S::Error>> {
        Ok(sign_payload(payload, &self.secret_key)?)
    }

    /// Draft a node-link payload against the current tail and sign it
    ///
    /// Used by the cross-sign handshake initiator. The lock is held only
    /// long enough to read the tail and draw an id; committing the resulting
    /// claim later will fail with a sequence conflict if the chain moved in
    /// between.
    pub async fn draft_node_link(
        &self,
        linked_node: &PublicKey,
    ) -> Result<(ClaimPayload, ClaimSignature), SigchainError<S::Error>> {
        let (claim_id, tail) = {
            let mut generator = self.writer.lock().await;
            let tail = self.store.tail().await?;
            (generator.next()?, tail)
        };
        let payload = ClaimPayload {
            issuer: self.node_id,
            claim_id,
            sequence_number: tail.map(|t| t.sequence_number + 1).unwrap_or(0),
            prev_digest: tail.map(|t| t.digest).unwrap_or(Digest::GENESIS),
            claim_type: ClaimType::NodeLink {
                linked_node: *linked_node,
            },
            issued_at: Utc::now(),
        };
        let signature = self.sign(&payload)?;
        Ok((payload, signature))
    }

    /// Find the committed node-link claim for a given peer, if any
    ///
    /// Scans newest-first, so a handshake re-attempt finds the existing
    /// link without walking the whole chain in the common case.
    pub async fn find_node_link(
        &self,
        peer: &PublicKey,
    ) -> Result<Option<SignedClaim>, SigchainError<S::Error>> {
        let mut cursor = self.iter(IterOrder::Desc, None).await?;
        while let Some(entry) = cursor.next_entry().await? {
            if entry.claim.link_counterpart(&self.node_id) == Some(*peer) {
                return Ok(Some(entry.claim));
            }
        }
        Ok(None)
    }

    /// Re-verify the whole chain from genesis
    ///
    /// Recomputes every hash link, re-checks every stored signature and the
    /// per-claim-type signature rules, and checks the tail pointer against
    /// the last entry. Returns the chain length on success.
    ///
    /// # Errors
    /// Any violation is [`SigchainError::Corrupted`]; the chain must not be
    /// appended to afterwards.
    #[instrument(skip(self), fields(node_id = %self.node_id))]
    pub async fn verify_chain(&self) -> Result<u64, SigchainError<S::Error>> {
        let tail = self.store.tail().await?;
        let mut prev: Option<ChainEntry> = None;
        let mut index: u64 = 0;
        let mut seek: Option<ClaimId> = None;
        let mut skip_seek = false;

        loop {
            let want = CURSOR_PAGE + usize::from(skip_seek);
            let page = self.store.scan(seek.as_ref(), IterOrder::Asc, want).await?;
            let returned = page.len();
            let mut entries = page.into_iter();
            if skip_seek {
                entries.next();
            }

            for entry in entries {
                self.verify_entry(&entry, index, prev.as_ref())?;
                seek = Some(entry.claim_id);
                skip_seek = true;
                prev = Some(entry);
                index += 1;
            }
            if returned < want {
                break;
            }
        }

        match (&tail, &prev) {
            (None, None) => {}
            (Some(tail), Some(last)) => {
                let digest = claim_digest(&last.claim)?;
                if tail.claim_id != last.claim_id
                    || tail.sequence_number != last.sequence_number
                    || tail.digest != digest
                {
                    return Err(SigchainError::Corrupted(
                        "tail pointer does not match the last entry".to_string(),
                    ));
                }
            }
            _ => {
                return Err(SigchainError::Corrupted(
                    "tail pointer and entries disagree about emptiness".to_string(),
                ));
            }
        }
        Ok(index)
    }

    fn verify_entry(
        &self,
        entry: &ChainEntry,
        index: u64,
        prev: Option<&ChainEntry>,
    ) -> Result<(), SigchainError<S::Error>> {
        let corrupt = |msg: String| Err(SigchainError::Corrupted(msg));

        if entry.sequence_number != index {
            return corrupt(format!(
                "entry {} has sequence {} at position {}",
                entry.claim_id, entry.sequence_number, index
            ));
        }
        match prev {
            None => {
                if !entry.prev_digest.is_genesis() {
                    return corrupt(format!(
                        "first entry {} does not link the genesis digest",
                        entry.claim_id
                    ));
                }
            }
            Some(prev) => {
                if !verify_link(entry, prev) {
                    return corrupt(format!(
                        "entry {} does not link its predecessor {}",
                        entry.claim_id, prev.claim_id
                    ));
                }
            }
        }

        let payload = &entry.claim.payload;
        if payload.claim_id == entry.claim_id {
            // an entry keeping the payload's own id must keep the rest of
            // its framing too
            if payload.sequence_number != entry.sequence_number
                || payload.prev_digest != entry.prev_digest
            {
                return corrupt(format!(
                    "entry {} disagrees with its payload about its framing",
                    entry.claim_id
                ));
            }
        }

        let signers: Vec<PublicKey> = match &payload.claim_type {
            ClaimType::IdentityLink { .. } => {
                if payload.issuer != self.node_id {
                    return corrupt(format!(
                        "identity-link entry {} was not issued by this chain's node",
                        entry.claim_id
                    ));
                }
                vec![payload.issuer]
            }
            ClaimType::NodeLink { linked_node } => {
                if payload.issuer != self.node_id && *linked_node != self.node_id {
                    return corrupt(format!(
                        "node-link entry {} does not involve this chain's node",
                        entry.claim_id
                    ));
                }
                vec![payload.issuer, *linked_node]
            }
        };
        if entry.claim.signatures.len() != signers.len() {
            return corrupt(format!(
                "entry {} has {} signatures, requires {}",
                entry.claim_id,
                entry.claim.signatures.len(),
                signers.len()
            ));
        }
        for signer in &signers {
            let sig = match entry.claim.signature_by(signer) {
                Some(sig) => sig,
                None => {
                    return corrupt(format!(
                        "entry {} is missing the signature of {}",
                        entry.claim_id, signer
                    ));
                }
            };
            if !verify_signature(payload, sig, signer) {
                return corrupt(format!(
                    "entry {} carries an invalid signature by {}",
                    entry.claim_id, signer
                ));
            }
        }
        Ok(())
    }
}

/// An in-flight write transaction on one chain
///
/// Holds the chain's writer lock for its whole lifetime. Staged entries are
/// visible to [`SigchainTxn::get`] but reach storage only on
/// [`SigchainTxn::commit`]; dropping the txn rolls everything back.
pub struct SigchainTxn<'a, S: ClaimStore> {
    chain: &'a Sigchain<S>,
    generator: MutexGuard<'a, ClaimIdGenerator>,
    base: Option<Tail>,
    staged: Vec<ChainEntry>,
    staged_tail: Option<Tail>,
}

impl<'a, S: ClaimStore> SigchainTxn<'a, S> {
    /// Sequence number the next staged entry will take
    pub fn next_sequence(&self) -> u64 {
        match &self.staged_tail {
            Some(tail) => tail.sequence_number + 1,
            None => 0,
        }
    }

    /// Digest the next staged entry must link to
    pub fn prev_digest(&self) -> Digest {
        match &self.staged_tail {
            Some(tail) => tail.digest,
            None => Digest::GENESIS,
        }
    }

    /// Stage a self-signed claim of the given type
    ///
    /// # Errors
    /// Rejects [`ClaimType::NodeLink`]: node links require both parties'
    /// signatures and only come out of the cross-sign handshake (via
    /// [`SigchainTxn::append_signed`] / [`SigchainTxn::append_adopted`]);
    /// a singly-signed one would fail verification on the next open.
    pub fn append(&mut self, claim_type: ClaimType) -> Result<ClaimId, SigchainError<S::Error>> {
        if matches!(claim_type, ClaimType::NodeLink { .. }) {
            return Err(SigchainError::Claim(ClaimError::Malformed(
                "node links carry two signatures and cannot be self-appended".to_string(),
            )));
        }
        let claim_id = self.generator.next()?;
        let payload = ClaimPayload {
            issuer: self.chain.node_id,
            claim_id,
            sequence_number: self.next_sequence(),
            prev_digest: self.prev_digest(),
            claim_type,
            issued_at: Utc::now(),
        };
        let signature = sign_payload(&payload, &self.chain.secret_key)?;
        let claim = SignedClaim {
            payload,
            signatures: vec![signature],
        };
        self.stage(claim_id, claim)
    }

    /// Stage a claim this node drafted earlier, with its framing intact
    ///
    /// Used for the initiator's copy of a cross-signed node link: the
    /// payload was framed against a tail snapshot before the handshake, so
    /// this re-validates it against the tail now.
    ///
    /// # Errors
    /// [`SigchainError::SequenceConflict`] / [`SigchainError::DigestMismatch`]
    /// when the chain moved since the payload was drafted.
    pub fn append_signed(
        &mut self,
        claim: SignedClaim,
    ) -> Result<ClaimId, SigchainError<S::Error>> {
        let payload = &claim.payload;
        if payload.issuer != self.chain.node_id {
            return Err(SigchainError::Claim(ClaimError::Malformed(
                "claim was not issued by this chain's node".to_string(),
            )));
        }
        let found = self.next_sequence();
        if payload.sequence_number != found {
            return Err(SigchainError::SequenceConflict {
                expected: payload.sequence_number,
                found,
            });
        }
        let expected = self.prev_digest();
        if payload.prev_digest != expected {
            return Err(SigchainError::DigestMismatch {
                expected,
                found: payload.prev_digest,
            });
        }
        if let Some(tail) = &self.staged_tail {
            // ids must keep sorting in append order
            if payload.claim_id <= tail.claim_id {
                return Err(SigchainError::Claim(ClaimError::Malformed(
                    "claim id does not sort after the chain tail".to_string(),
                )));
            }
        }
        self.stage(payload.claim_id, claim)
    }

    /// Stage a counterpart-framed claim, assigning fresh local framing
    ///
    /// Used for the responder's copy of a cross-signed node link: the
    /// payload stays byte-identical to the initiator's while the entry gets
    /// this chain's id, sequence and digest link.
    pub fn append_adopted(
        &mut self,
        claim: SignedClaim,
    ) -> Result<ClaimId, SigchainError<S::Error>> {
        let claim_id = self.generator.next()?;
        self.stage(claim_id, claim)
    }

    fn stage(
        &mut self,
        claim_id: ClaimId,
        claim: SignedClaim,
    ) -> Result<ClaimId, SigchainError<S::Error>> {
        let entry = ChainEntry {
            claim_id,
            sequence_number: self.next_sequence(),
            prev_digest: self.prev_digest(),
            claim,
        };
        let digest = claim_digest(&entry.claim)?;
        self.staged_tail = Some(Tail {
            claim_id,
            sequence_number: entry.sequence_number,
            digest,
        });
        self.staged.push(entry);
        Ok(claim_id)
    }

    /// Look up an entry, staged entries included
    pub async fn get(
        &self,
        id: &ClaimId,
    ) -> Result<Option<ChainEntry>, SigchainError<S::Error>> {
        if let Some(entry) = self.staged.iter().find(|entry| entry.claim_id == *id) {
            return Ok(Some(entry.clone()));
        }
        Ok(self.chain.store.get(id).await?)
    }

    /// Persist every staged entry atomically and release the lock
    ///
    /// # Errors
    /// [`SigchainError::SequenceConflict`] when the store's tail moved since
    /// this txn snapshotted it; nothing is written in that case.
    pub async fn commit(self) -> Result<(), SigchainError<S::Error>> {
        let new_tail = match &self.staged_tail {
            Some(tail) if !self.staged.is_empty() => *tail,
            _ => return Ok(()),
        };
        match self
            .chain
            .store
            .apply(self.base.as_ref(), &self.staged, &new_tail)
            .await
        {
            Ok(()) => {
                tracing::debug!(
                    node_id = %self.chain.node_id,
                    entries = self.staged.len(),
                    sequence = new_tail.sequence_number,
                    "committed to sigchain"
                );
                Ok(())
            }
            Err(ClaimStoreError::TailConflict { found, .. }) => {
                Err(SigchainError::SequenceConflict {
                    expected: self.base.map(|t| t.sequence_number + 1).unwrap_or(0),
                    found: found.map(|t| t.sequence_number + 1).unwrap_or(0),
                })
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// Lazy, restartable cursor over a chain's committed entries
///
/// Bounded by the tail as of its creation; fetches [`CURSOR_PAGE`] entries
/// per storage round-trip. To restart iteration in a later cursor, pass the
/// last yielded id as `seek` to [`Sigchain::iter`]; the seek entry is
/// yielded again as the first element.
pub struct ClaimCursor<S: ClaimStore> {
    store: S,
    order: IterOrder,
    bound: Option<Tail>,
    buffer: VecDeque<ChainEntry>,
    next_seek: Option<ClaimId>,
    skip_seek: bool,
    exhausted: bool,
}

impl<S: ClaimStore> ClaimCursor<S> {
    /// The next entry, or `None` when the snapshot is exhausted
    pub async fn next_entry(&mut self) -> Result<Option<ChainEntry>, SigchainError<S::Error>> {
        if self.buffer.is_empty() && !self.exhausted {
            self.refill().await?;
        }
        Ok(self.buffer.pop_front())
    }

    /// Drain the cursor into a vector
    pub async fn collect_entries(mut self) -> Result<Vec<ChainEntry>, SigchainError<S::Error>> {
        let mut entries = Vec::new();
        while let Some(entry) = self.next_entry().await? {
            entries.push(entry);
        }
        Ok(entries)
    }

    async fn refill(&mut self) -> Result<(), SigchainError<S::Error>> {
        let want = CURSOR_PAGE + usize::from(self.skip_seek);
        let mut page = self
            .store
            .scan(self.next_seek.as_ref(), self.order, want)
            .await?;
        let returned = page.len();
        if self.skip_seek && page.first().map(|e| e.claim_id) == self.next_seek {
            page.remove(0);
        }
        if returned < want {
            self.exhausted = true;
        }
        if let Some(bound) = &self.bound {
            // ignore entries committed after this cursor was created
            let before = page.len();
            page.retain(|entry| entry.claim_id <= bound.claim_id);
            if page.len() < before {
                self.exhausted = true;
            }
        }
        if let Some(last) = page.last() {
            self.next_seek = Some(last.claim_id);
            self.skip_seek = true;
        } else {
            self.exhausted = true;
        }
        self.buffer.extend(page);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::claims::encode_claim;

    use super::*;

    async fn open_chain() -> (Sigchain<MemoryClaimStore>, MemoryClaimStore) {
        let store = MemoryClaimStore::new();
        let chain = Sigchain::open(store.clone(), SecretKey::generate())
            .await
            .unwrap();
        (chain, store)
    }

    fn identity(n: u64) -> ClaimType {
        ClaimType::IdentityLink {
            provider_id: "github.com".to_string(),
            identity_id: format!("account-{n}"),
        }
    }

    #[tokio::test]
    async fn test_append_commit_and_reload() {
        let store = MemoryClaimStore::new();
        let secret_key = SecretKey::generate();
        let chain = Sigchain::open(store.clone(), secret_key.clone())
            .await
            .unwrap();

        let mut txn = chain.transaction().await.unwrap();
        let first = txn.append(identity(0)).unwrap();
        let second = txn.append(identity(1)).unwrap();
        txn.commit().await.unwrap();

        assert_eq!(chain.len().await.unwrap(), 2);
        assert!(first < second);

        // reopening re-seeds the generator and re-verifies
        let reopened = Sigchain::open(store, secret_key).await.unwrap();
        assert_eq!(reopened.verify_chain().await.unwrap(), 2);

        let mut txn = reopened.transaction().await.unwrap();
        let third = txn.append(identity(2)).unwrap();
        txn.commit().await.unwrap();
        assert!(third > second);
    }

    #[tokio::test]
    async fn test_dropped_txn_rolls_back() {
        let (chain, _) = open_chain().await;

        {
            let mut txn = chain.transaction().await.unwrap();
            txn.append(identity(0)).unwrap();
            // no commit
        }

        assert!(chain.is_empty().await.unwrap());
        assert_eq!(chain.verify_chain().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_staged_entries_visible_in_txn_only() {
        let (chain, _) = open_chain().await;

        let mut txn = chain.transaction().await.unwrap();
        let id = txn.append(identity(0)).unwrap();
        assert!(txn.get(&id).await.unwrap().is_some());
        txn.commit().await.unwrap();

        assert!(chain.get(&id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_append_rejects_singly_signed_node_link() {
        let (chain, _) = open_chain().await;
        let peer = SecretKey::generate().public();

        let mut txn = chain.transaction().await.unwrap();
        let result = txn.append(ClaimType::NodeLink { linked_node: peer });
        assert!(matches!(
            result,
            Err(SigchainError::Claim(ClaimError::Malformed(_)))
        ));
        drop(txn);

        // nothing staged, the chain still opens clean
        assert!(chain.is_empty().await.unwrap());
        assert_eq!(chain.verify_chain().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_append_signed_rejects_stale_framing() {
        let (chain, _) = open_chain().await;
        let peer = SecretKey::generate().public();

        let (payload, signature) = chain.draft_node_link(&peer).await.unwrap();
        let claim = SignedClaim {
            payload,
            signatures: vec![signature],
        };

        // the chain moves on before the drafted claim lands
        let mut txn = chain.transaction().await.unwrap();
        txn.append(identity(0)).unwrap();
        txn.commit().await.unwrap();

        let mut txn = chain.transaction().await.unwrap();
        let result = txn.append_signed(claim);
        assert!(matches!(
            result,
            Err(SigchainError::SequenceConflict { expected: 0, found: 1 })
        ));
    }

    #[tokio::test]
    async fn test_verify_chain_catches_tampered_entry() {
        let (chain, store) = open_chain().await;

        let mut txn = chain.transaction().await.unwrap();
        txn.append(identity(0)).unwrap();
        let target = txn.append(identity(1)).unwrap();
        txn.append(identity(2)).unwrap();
        txn.commit().await.unwrap();

        assert!(store.tamper(&target, |entry| {
            entry.claim.payload.claim_type = identity(99);
        }));

        assert!(matches!(
            chain.verify_chain().await,
            Err(SigchainError::Corrupted(_))
        ));
    }

    #[tokio::test]
    async fn test_cursor_pages_and_resumes() {
        let (chain, _) = open_chain().await;

        let mut txn = chain.transaction().await.unwrap();
        let mut ids = Vec::new();
        for n in 0..(CURSOR_PAGE as u64 * 2 + 5) {
            ids.push(txn.append(identity(n)).unwrap());
        }
        txn.commit().await.unwrap();

        let all = chain
            .iter(IterOrder::Asc, None)
            .await
            .unwrap()
            .collect_entries()
            .await
            .unwrap();
        assert_eq!(
            all.iter().map(|e| e.claim_id).collect::<Vec<_>>(),
            ids
        );

        // seeking starts at the given id, inclusive
        let resumed = chain
            .iter(IterOrder::Asc, Some(ids[2]))
            .await
            .unwrap()
            .collect_entries()
            .await
            .unwrap();
        assert_eq!(
            resumed.iter().map(|e| e.claim_id).collect::<Vec<_>>(),
            &ids[2..]
        );

        let newest = chain
            .iter(IterOrder::Desc, None)
            .await
            .unwrap()
            .next_entry()
            .await
            .unwrap()
            .unwrap();
        assert_eq!(newest.claim_id, *ids.last().unwrap());
    }

    #[tokio::test]
    async fn test_cursor_seek_is_inclusive() {
        let (chain, _) = open_chain().await;

        let mut txn = chain.transaction().await.unwrap();
        let mut ids = Vec::new();
        for n in 0..5 {
            ids.push(txn.append(identity(n)).unwrap());
        }
        txn.commit().await.unwrap();

        // the seek entry itself is the first yield in both directions
        let first_asc = chain
            .iter(IterOrder::Asc, Some(ids[0]))
            .await
            .unwrap()
            .next_entry()
            .await
            .unwrap()
            .unwrap();
        assert_eq!(first_asc.claim_id, ids[0]);

        let first_desc = chain
            .iter(IterOrder::Desc, Some(ids[3]))
            .await
            .unwrap()
            .next_entry()
            .await
            .unwrap()
            .unwrap();
        assert_eq!(first_desc.claim_id, ids[3]);
    }

    #[tokio::test]
    async fn test_cursor_ignores_entries_after_snapshot() {
        let (chain, _) = open_chain().await;

        let mut txn = chain.transaction().await.unwrap();
        txn.append(identity(0)).unwrap();
        txn.commit().await.unwrap();

        let cursor = chain.iter(IterOrder::Asc, None).await.unwrap();

        let mut txn = chain.transaction().await.unwrap();
        txn.append(identity(1)).unwrap();
        txn.commit().await.unwrap();

        assert_eq!(cursor.collect_entries().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_cross_signed_link_round_trip() {
        let (initiator, _) = open_chain().await;
        let responder_key = SecretKey::generate();
        let responder = Sigchain::open(MemoryClaimStore::new(), responder_key.clone())
            .await
            .unwrap();

        let (payload, initiator_sig) = initiator
            .draft_node_link(&responder.node_id())
            .await
            .unwrap();
        let responder_sig = responder.sign(&payload).unwrap();
        let claim = SignedClaim {
            payload,
            signatures: vec![initiator_sig, responder_sig],
        };

        let mut txn = responder.transaction().await.unwrap();
        txn.append_adopted(claim.clone()).unwrap();
        txn.commit().await.unwrap();

        let mut txn = initiator.transaction().await.unwrap();
        txn.append_signed(claim.clone()).unwrap();
        txn.commit().await.unwrap();

        assert_eq!(initiator.verify_chain().await.unwrap(), 1);
        assert_eq!(responder.verify_chain().await.unwrap(), 1);

        // both chains hold the byte-identical claim envelope
        let on_initiator = initiator
            .find_node_link(&responder.node_id())
            .await
            .unwrap()
            .unwrap();
        let on_responder = responder
            .find_node_link(&initiator.node_id())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            encode_claim(&on_initiator).unwrap(),
            encode_claim(&on_responder).unwrap()
        );
    }

    #[tokio::test]
    async fn test_find_node_link_misses_unlinked_peer() {
        let (chain, _) = open_chain().await;
        let mut txn = chain.transaction().await.unwrap();
        txn.append(identity(0)).unwrap();
        txn.commit().await.unwrap();

        let stranger = SecretKey::generate().public();
        assert!(chain.find_node_link(&stranger).await.unwrap().is_none());
    }
}
