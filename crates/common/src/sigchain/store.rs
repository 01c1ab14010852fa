use std::fmt::Debug;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::claims::{ChainEntry, ClaimId, Digest};

/// Pointer to the newest committed entry of a chain
///
/// Kept alongside the entries so append validation is O(1) instead of a
/// full scan, and so `apply` can detect a racing writer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tail {
    pub claim_id: ClaimId,
    pub sequence_number: u64,
    pub digest: Digest,
}

/// Direction for ranged iteration over a chain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IterOrder {
    Asc,
    Desc,
}

#[derive(Debug, thiserror::Error)]
pub enum ClaimStoreError<T> {
    /// An error from the underlying storage backend
    #[error("unhandled claim store provider error: {0}")]
    Provider(#[from] T),
    /// The tail moved between snapshot and apply: another writer
    /// committed first
    #[error("chain tail moved during apply: expected {expected:?}, found {found:?}")]
    TailConflict {
        expected: Option<Tail>,
        found: Option<Tail>,
    },
    /// The stored bytes do not decode to a chain entry
    #[error("claim store corrupt: {0}")]
    Corrupt(String),
}

/// Ordered, transactional storage for one chain's entries
///
/// Keys are claim ids (sortable byte strings); iteration order is id order,
/// which the sigchain guarantees equals append order. All mutation goes
/// through [`ClaimStore::apply`], which commits a batch atomically and
/// fails if the tail is not the one the writer snapshotted - the sigchain
/// turns that into its sequence-conflict error.
#[async_trait]
pub trait ClaimStore: Send + Sync + Debug + Clone + 'static {
    type Error: std::error::Error + Send + Sync + 'static;

    /// The current tail pointer, `None` for an empty chain
    async fn tail(&self) -> Result<Option<Tail>, ClaimStoreError<Self::Error>>;

    /// Look up one entry by claim id
    async fn get(&self, id: &ClaimId) -> Result<Option<ChainEntry>, ClaimStoreError<Self::Error>>;

    /// Return up to `limit` entries in `order`, starting at-or-after
    /// (ascending) / at-or-before (descending) `seek`, or at the
    /// respective end of the chain when `seek` is `None`
    async fn scan(
        &self,
        seek: Option<&ClaimId>,
        order: IterOrder,
        limit: usize,
    ) -> Result<Vec<ChainEntry>, ClaimStoreError<Self::Error>>;

    /// Atomically append `batch` and move the tail pointer
    ///
    /// Fails with [`ClaimStoreError::TailConflict`] when the stored tail no
    /// longer equals `expected`; in that case nothing is written.
    async fn apply(
        &self,
        expected: Option<&Tail>,
        batch: &[ChainEntry],
        new_tail: &Tail,
    ) -> Result<(), ClaimStoreError<Self::Error>>;
}
