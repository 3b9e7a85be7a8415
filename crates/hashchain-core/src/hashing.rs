//! Header serialization and the SHA-256 digest.
//!
//! The preimage of a block hash is
//!
//! ```text
//! len(prev_hash) u64 BE | prev_hash | len(payload) u64 BE | payload |
//! timestamp u64 BE | target_bits u64 BE | nonce u64 BE
//! ```
//!
//! The length prefixes keep the two variable-length fields from bleeding into
//! each other. The nonce comes last so a miner can hash the prefix once and
//! only feed the nonce per attempt (see [`header_prefix`]).

use crate::{constants::HASH_BITS, Hash};
use sha2::{Digest, Sha256};

const U64_LEN: usize = 8;

fn prev_bytes(prev_hash: Option<&Hash>) -> &[u8] {
    match prev_hash {
        Some(h) => &h[..],
        None => &[],
    }
}

/// Everything that goes into the block hash except the nonce.
pub fn header_prefix(
    prev_hash: Option<&Hash>,
    payload: &[u8],
    timestamp: u64,
    target_bits: u32,
) -> Vec<u8> {
    let prev = prev_bytes(prev_hash);
    let mut bytes = Vec::with_capacity(U64_LEN * 5 + prev.len() + payload.len());
    bytes.extend_from_slice(&(prev.len() as u64).to_be_bytes());
    bytes.extend_from_slice(prev);
    bytes.extend_from_slice(&(payload.len() as u64).to_be_bytes());
    bytes.extend_from_slice(payload);
    bytes.extend_from_slice(&timestamp.to_be_bytes());
    bytes.extend_from_slice(&u64::from(target_bits).to_be_bytes());
    bytes
}

pub fn header_preimage(
    prev_hash: Option<&Hash>,
    payload: &[u8],
    timestamp: u64,
    target_bits: u32,
    nonce: u64,
) -> Vec<u8> {
    let mut bytes = header_prefix(prev_hash, payload, timestamp, target_bits);
    bytes.extend_from_slice(&nonce.to_be_bytes());
    bytes
}

pub fn digest(bytes: &[u8]) -> Hash {
    Sha256::digest(bytes).into()
}

/// Finish a prefix state with `nonce`. The state is cloned, not consumed.
pub(crate) fn digest_with_nonce(prefix: &Sha256, nonce: u64) -> Hash {
    let mut hasher = prefix.clone();
    hasher.update(nonce.to_be_bytes());
    hasher.finalize().into()
}

pub(crate) fn prefix_state(prefix: &[u8]) -> Sha256 {
    let mut hasher = Sha256::new();
    hasher.update(prefix);
    hasher
}

pub fn count_leading_zero_bits(hash: &Hash) -> u32 {
    let mut total = 0u32;
    for b in hash {
        if *b == 0 {
            total += 8;
        } else {
            total += b.leading_zeros();
            break;
        }
    }
    total
}

/// `hash`, read as a big-endian integer, is below `2^(256 - target_bits)`.
///
/// That holds exactly when the top `target_bits` bits are zero, so no bignum
/// is needed.
pub fn meets_target(hash: &Hash, target_bits: u32) -> bool {
    target_bits <= HASH_BITS && count_leading_zero_bits(hash) >= target_bits
}
