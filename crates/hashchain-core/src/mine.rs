use crate::{
    constants::CANCEL_CHECK_INTERVAL,
    error::{ChainError, Result},
    hashing::{digest_with_nonce, meets_target, prefix_state},
    pow::{CancelToken, Solution},
    Hash,
};
use rayon::prelude::*;
use std::time::Instant;
use tracing::debug;

/// Nonces handed to the pool per round. Cancellation is checked between rounds.
const BATCH_SIZE: u64 = CANCEL_CHECK_INTERVAL * 16;

/// Searches nonces in parallel for a header digest below the target.
///
/// The range is walked in ascending batches and each batch is split across the
/// rayon pool; `find_map_first` keeps the lowest match of a batch, so the
/// result is the nonce a sequential ascending search would find.
pub(crate) fn search_parallel(
    header_prefix: &[u8],
    target_bits: u32,
    cancel: &CancelToken,
) -> Result<Solution> {
    let start = Instant::now();
    // Hash the fixed part once; each attempt clones this state.
    let prefix = prefix_state(header_prefix);
    debug!(
        threads = rayon::current_num_threads(),
        target_bits, "parallel nonce search"
    );

    let mut first = 0u64;
    loop {
        if first > 0 && cancel.is_cancelled() {
            return Err(ChainError::Aborted { attempts: first });
        }
        let last = first.saturating_add(BATCH_SIZE - 1);

        let found: Option<(u64, Hash)> = (first..=last).into_par_iter().find_map_first(|nonce| {
            let hash = digest_with_nonce(&prefix, nonce);
            meets_target(&hash, target_bits).then_some((nonce, hash))
        });

        if let Some((nonce, hash)) = found {
            return Ok(Solution {
                nonce,
                hash,
                attempts: nonce.saturating_add(1),
                elapsed: start.elapsed(),
            });
        }
        if last == u64::MAX {
            return Err(ChainError::Unsolvable);
        }
        first = last + 1;
    }
}
