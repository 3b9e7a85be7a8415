use crate::{
    constants::GENESIS_PAYLOAD,
    error::{ChainError, Result},
    hashing,
    pow::{CancelToken, ProofOfWork, Solution},
    Hash,
};
use bincode::Options;
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

fn unix_seconds(now: SystemTime) -> Result<u64> {
    let since = now.duration_since(UNIX_EPOCH).map_err(ChainError::Clock)?;
    Ok(since.as_secs())
}

/// Fixed-width little-endian fields; a record must be consumed exactly.
fn record_options() -> impl Options {
    bincode::DefaultOptions::new()
        .with_fixint_encoding()
        .reject_trailing_bytes()
}

/// A block that has everything but its proof of work.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Candidate {
    pub(crate) timestamp: u64,
    pub(crate) payload: Vec<u8>,
    pub(crate) prev_hash: Option<Hash>,
}

impl Candidate {
    /// Stamp the candidate with the current time. Fails if the system clock
    /// reads earlier than the Unix epoch.
    pub fn new(payload: impl Into<Vec<u8>>, prev_hash: Option<Hash>) -> Result<Self> {
        let timestamp = unix_seconds(SystemTime::now())?;
        Ok(Self::with_timestamp(timestamp, payload, prev_hash))
    }

    pub fn with_timestamp(
        timestamp: u64,
        payload: impl Into<Vec<u8>>,
        prev_hash: Option<Hash>,
    ) -> Self {
        Self {
            timestamp,
            payload: payload.into(),
            prev_hash,
        }
    }

    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn prev_hash(&self) -> Option<&Hash> {
        self.prev_hash.as_ref()
    }

    pub(crate) fn prefix(&self, target_bits: u32) -> Vec<u8> {
        hashing::header_prefix(
            self.prev_hash.as_ref(),
            &self.payload,
            self.timestamp,
            target_bits,
        )
    }

    pub(crate) fn seal(self, solution: &Solution) -> Block {
        Block {
            timestamp: self.timestamp,
            payload: self.payload,
            prev_hash: self.prev_hash,
            hash: solution.hash,
            nonce: solution.nonce,
        }
    }
}

/// An immutable, mined block.
///
/// The only ways to get one are mining a [`Candidate`] or decoding a stored
/// record, so a `Block` in hand has either passed proof of work or must be
/// checked with [`ProofOfWork::validate`] before it is trusted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    timestamp: u64,
    payload: Vec<u8>,
    prev_hash: Option<Hash>,
    hash: Hash,
    nonce: u64,
}

impl Block {
    /// Mine a block on top of `prev_hash`. Blocks until a nonce is found or
    /// `cancel` fires.
    pub fn new(
        payload: impl Into<Vec<u8>>,
        prev_hash: Option<Hash>,
        pow: &ProofOfWork,
        cancel: &CancelToken,
    ) -> Result<Self> {
        pow.mine(Candidate::new(payload, prev_hash)?, cancel)
    }

    pub fn genesis(pow: &ProofOfWork, cancel: &CancelToken) -> Result<Self> {
        Self::new(GENESIS_PAYLOAD, None, pow, cancel)
    }

    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn prev_hash(&self) -> Option<&Hash> {
        self.prev_hash.as_ref()
    }

    pub fn hash(&self) -> &Hash {
        &self.hash
    }

    pub fn nonce(&self) -> u64 {
        self.nonce
    }

    pub fn is_genesis(&self) -> bool {
        self.prev_hash.is_none()
    }

    pub fn hash_hex(&self) -> String {
        hex::encode(self.hash)
    }

    /// Hex of the predecessor hash, empty for genesis.
    pub fn prev_hash_hex(&self) -> String {
        self.prev_hash.map(hex::encode).unwrap_or_default()
    }

    /// Recompute the header digest from the stored fields.
    pub fn compute_hash(&self, target_bits: u32) -> Hash {
        hashing::digest(&hashing::header_preimage(
            self.prev_hash.as_ref(),
            &self.payload,
            self.timestamp,
            target_bits,
            self.nonce,
        ))
    }

    /// The on-disk record stored under [`Block::hash`].
    pub fn to_record(&self) -> Result<Vec<u8>> {
        record_options().serialize(self).map_err(ChainError::Encode)
    }

    pub fn from_record(bytes: &[u8]) -> std::result::Result<Self, bincode::Error> {
        record_options().deserialize(bytes)
    }
}

#[cfg(test)]
impl Block {
    pub(crate) fn with_nonce(mut self, nonce: u64) -> Self {
        self.nonce = nonce;
        self
    }

    pub(crate) fn with_payload(mut self, payload: &[u8]) -> Self {
        self.payload = payload.to_vec();
        self
    }
}
