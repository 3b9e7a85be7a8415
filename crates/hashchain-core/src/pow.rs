//! Proof of work: an ascending nonce search until the header digest falls
//! below `2^(256 - target_bits)`.

use crate::{
    block::{Block, Candidate},
    constants::{CANCEL_CHECK_INTERVAL, HASH_BITS, TARGET_BITS},
    error::{ChainError, Result},
    hashing::{self, meets_target},
    mine, Hash,
};
use serde::{Deserialize, Serialize};
use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};
use tracing::{info, warn};

/// Cooperative cancellation for a mining search.
///
/// Clones share the same flag. A deadline, when set, counts as cancellation
/// once it has passed.
#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
            deadline: Some(deadline),
        }
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self::with_deadline(Instant::now() + timeout)
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed) || self.deadline.is_some_and(|d| Instant::now() >= d)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SearchStrategy {
    #[default]
    Sequential,
    /// Split the nonce range across the rayon pool. Finds the same nonce.
    Parallel,
}

/// Winning nonce and digest of a search.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Solution {
    pub nonce: u64,
    pub hash: Hash,
    /// Nonces tried. For a parallel search this is `nonce + 1`, the count a
    /// sequential search would have needed.
    pub attempts: u64,
    pub elapsed: Duration,
}

impl Solution {
    pub fn hash_rate(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.attempts as f64 / secs
        } else {
            self.attempts as f64
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ProofOfWork {
    target_bits: u32,
    strategy: SearchStrategy,
}

impl Default for ProofOfWork {
    fn default() -> Self {
        Self::new(TARGET_BITS)
    }
}

impl ProofOfWork {
    pub fn new(target_bits: u32) -> Self {
        Self {
            target_bits,
            strategy: SearchStrategy::Sequential,
        }
    }

    pub fn with_strategy(mut self, strategy: SearchStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn target_bits(&self) -> u32 {
        self.target_bits
    }

    pub fn strategy(&self) -> SearchStrategy {
        self.strategy
    }

    /// Search for the smallest nonce meeting the target. A target wider than
    /// the hash can never be met and is rejected before any hashing.
    pub fn run(&self, candidate: &Candidate, cancel: &CancelToken) -> Result<Solution> {
        if self.target_bits > HASH_BITS {
            return Err(ChainError::InvalidTarget(self.target_bits));
        }
        let result = match self.strategy {
            SearchStrategy::Sequential => self.search(candidate, cancel),
            SearchStrategy::Parallel => {
                mine::search_parallel(&candidate.prefix(self.target_bits), self.target_bits, cancel)
            }
        };
        match &result {
            Ok(solution) => info!(
                nonce = solution.nonce,
                hash = %hex::encode(solution.hash),
                attempts = solution.attempts,
                hash_rate = solution.hash_rate(),
                "mined block"
            ),
            Err(ChainError::Aborted { attempts }) => {
                warn!(attempts, "mining aborted before a nonce was found")
            }
            Err(_) => {}
        }
        result
    }

    /// Run the search and seal the candidate with the winning nonce.
    pub fn mine(&self, candidate: Candidate, cancel: &CancelToken) -> Result<Block> {
        let solution = self.run(&candidate, cancel)?;
        Ok(candidate.seal(&solution))
    }

    fn search(&self, candidate: &Candidate, cancel: &CancelToken) -> Result<Solution> {
        let start = Instant::now();
        let prefix = hashing::prefix_state(&candidate.prefix(self.target_bits));

        for nonce in 0..=u64::MAX {
            if nonce % CANCEL_CHECK_INTERVAL == 0 && nonce > 0 && cancel.is_cancelled() {
                return Err(ChainError::Aborted { attempts: nonce });
            }
            let hash = hashing::digest_with_nonce(&prefix, nonce);
            if meets_target(&hash, self.target_bits) {
                return Ok(Solution {
                    nonce,
                    hash,
                    attempts: nonce.saturating_add(1),
                    elapsed: start.elapsed(),
                });
            }
        }
        Err(ChainError::Unsolvable)
    }

    /// Recompute the block's digest with its own nonce; true iff it matches
    /// the stored hash and meets this target.
    pub fn validate(&self, block: &Block) -> bool {
        let hash = block.compute_hash(self.target_bits);
        hash == *block.hash() && meets_target(&hash, self.target_bits)
    }
}
