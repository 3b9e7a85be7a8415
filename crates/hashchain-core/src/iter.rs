use crate::{
    block::Block,
    chain::ChainStore,
    error::{ChainError, Result},
    pow::ProofOfWork,
    Hash,
};
use std::sync::Arc;
use tracing::debug;

/// Walks a chain from a starting hash back to genesis, one stored block per
/// step.
///
/// Every block read is checked against its key and the proof of work before
/// it is yielded. The first error is yielded once and ends the walk; a fresh
/// iterator is needed to start over.
pub struct ChainIter<S: ChainStore> {
    store: Arc<S>,
    cursor: Option<Hash>,
    pow: ProofOfWork,
}

impl<S: ChainStore> ChainIter<S> {
    pub fn new(store: Arc<S>, start: Option<Hash>, pow: ProofOfWork) -> Self {
        Self {
            store,
            cursor: start,
            pow,
        }
    }

    /// Hash of the block the next step will read, `None` once genesis has
    /// been yielded.
    pub fn cursor(&self) -> Option<&Hash> {
        self.cursor.as_ref()
    }

    pub fn has_more(&self) -> bool {
        self.cursor.is_some()
    }

    fn read(&self, hash: &Hash) -> Result<Block> {
        let block = self
            .store
            .get_block(hash)?
            .ok_or(ChainError::MissingBlock(*hash))?;
        if block.hash() != hash || !self.pow.validate(&block) {
            return Err(ChainError::InvalidBlock(*hash));
        }
        Ok(block)
    }
}

impl<S: ChainStore> Iterator for ChainIter<S> {
    type Item = Result<Block>;

    fn next(&mut self) -> Option<Self::Item> {
        let hash = self.cursor.take()?;
        match self.read(&hash) {
            Ok(block) => {
                debug!(hash = %block.hash_hex(), "iterator step");
                self.cursor = block.prev_hash().copied();
                Some(Ok(block))
            }
            // cursor stays None: the walk ends after reporting.
            Err(err) => Some(Err(err)),
        }
    }
}

impl<S: ChainStore> std::iter::FusedIterator for ChainIter<S> {}
