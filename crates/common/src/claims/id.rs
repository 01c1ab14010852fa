use std::fmt;

use chrono::Utc;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Size of a claim id in bytes
pub const CLAIM_ID_SIZE: usize = 16;

/// Errors that can occur while generating claim ids
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClaimIdError {
    /// The per-millisecond counter wrapped. Treated as fatal: the
    /// process must restart so the generator picks up a fresh epoch.
    #[error("claim id counter exhausted within one millisecond epoch")]
    CounterExhausted,
    #[error("invalid claim id: {0}")]
    Invalid(String),
}

/// Sortable identifier for one claim within a chain
///
/// Layout (16 bytes, big-endian throughout so byte order equals sort order):
/// - 8 bytes: unix-epoch milliseconds at generation time
/// - 4 bytes: per-process counter, disambiguates ids within one millisecond
/// - 4 bytes: random tiebreaker
///
/// Ids are unique and monotonic within one chain; they make no claim to
/// global uniqueness across different nodes' chains.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ClaimId([u8; CLAIM_ID_SIZE]);

impl ClaimId {
    pub fn from_bytes(bytes: [u8; CLAIM_ID_SIZE]) -> Self {
        ClaimId(bytes)
    }

    pub fn to_bytes(&self) -> [u8; CLAIM_ID_SIZE] {
        self.0
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn from_hex(hex: &str) -> Result<Self, ClaimIdError> {
        let mut buff = [0u8; CLAIM_ID_SIZE];
        hex::decode_to_slice(hex, &mut buff)
            .map_err(|_| ClaimIdError::Invalid("claim id hex decode error".to_string()))?;
        Ok(ClaimId(buff))
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// The wall-clock millisecond component of this id
    pub fn timestamp_millis(&self) -> u64 {
        let mut buff = [0u8; 8];
        buff.copy_from_slice(&self.0[..8]);
        u64::from_be_bytes(buff)
    }

    /// The per-process counter component of this id
    pub fn counter(&self) -> u32 {
        let mut buff = [0u8; 4];
        buff.copy_from_slice(&self.0[8..12]);
        u32::from_be_bytes(buff)
    }
}

impl TryFrom<&[u8]> for ClaimId {
    type Error = ClaimIdError;
    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        if bytes.len() != CLAIM_ID_SIZE {
            return Err(ClaimIdError::Invalid(format!(
                "expected {} bytes, got {}",
                CLAIM_ID_SIZE,
                bytes.len()
            )));
        }
        let mut buff = [0u8; CLAIM_ID_SIZE];
        buff.copy_from_slice(bytes);
        Ok(ClaimId(buff))
    }
}

impl fmt::Debug for ClaimId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ClaimId({})", self.to_hex())
    }
}

impl fmt::Display for ClaimId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl Serialize for ClaimId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for ClaimId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let hex_str = String::deserialize(deserializer)?;
        ClaimId::from_hex(&hex_str).map_err(serde::de::Error::custom)
    }
}

/// Generator of strictly increasing claim ids
///
/// Every id returned by one generator instance sorts after every id it
/// returned before, even when the wall clock stalls or goes backwards:
/// the millisecond component never decreases and the counter bumps
/// whenever the clock fails to advance. Seeding from the chain tail on
/// open extends the guarantee across process restarts.
#[derive(Debug)]
pub struct ClaimIdGenerator {
    last_millis: u64,
    counter: u32,
}

impl ClaimIdGenerator {
    pub fn new() -> Self {
        ClaimIdGenerator {
            last_millis: 0,
            counter: 0,
        }
    }

    /// Restore monotonicity across restarts from the last id the chain stored
    pub fn seeded(last: &ClaimId) -> Self {
        ClaimIdGenerator {
            last_millis: last.timestamp_millis(),
            counter: last.counter(),
        }
    }

    pub fn next(&mut self) -> Result<ClaimId, ClaimIdError> {
        let now = Utc::now().timestamp_millis().max(0) as u64;
        if now > self.last_millis {
            self.last_millis = now;
            self.counter = 0;
        } else {
            // clock stalled or went backwards: stay on the previous
            // millisecond epoch and disambiguate with the counter
            self.counter = self
                .counter
                .checked_add(1)
                .ok_or(ClaimIdError::CounterExhausted)?;
        }

        let mut bytes = [0u8; CLAIM_ID_SIZE];
        bytes[..8].copy_from_slice(&self.last_millis.to_be_bytes());
        bytes[8..12].copy_from_slice(&self.counter.to_be_bytes());
        bytes[12..].copy_from_slice(&rand::random::<[u8; 4]>());
        Ok(ClaimId(bytes))
    }
}

impl Default for ClaimIdGenerator {
    fn default() -> Self {
        Self::new()
    }
}
