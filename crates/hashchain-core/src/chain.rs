use crate::{
    block::Block,
    constants::{HASH_BITS, TARGET_BITS},
    error::{ChainError, Result},
    iter::ChainIter,
    pow::{CancelToken, ProofOfWork, SearchStrategy},
    Hash,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Persistence the chain needs from a backend.
///
/// Lives in the core so backends can depend on it without a cycle. Both write
/// methods must be atomic: a block record is never visible without the tip
/// pointing at it, and the tip never points at an absent record.
pub trait ChainStore: Send + Sync {
    /// Hash stored under the reserved tip key, `None` for an empty store.
    fn tip_hash(&self) -> Result<Option<Hash>>;

    /// Decoded record stored under `hash`.
    fn get_block(&self, hash: &Hash) -> Result<Option<Block>>;

    /// Write `genesis` and point the tip at it, unless a tip already exists.
    /// Returns the tip in effect afterwards. Commits only; see [`ChainStore::flush`].
    fn init_genesis(&self, genesis: &Block) -> Result<Hash>;

    /// Write `block` and move the tip to it in one transaction. Fails with
    /// [`ChainError::TipMoved`] when the stored tip is not `block.prev_hash()`.
    /// On `Ok` the block is visible to readers but not necessarily durable.
    fn append_block(&self, block: &Block) -> Result<()>;

    /// Make previous commits durable.
    fn flush(&self) -> Result<()>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainConfig {
    pub target_bits: u32,
    #[serde(default)]
    pub strategy: SearchStrategy,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            target_bits: TARGET_BITS,
            strategy: SearchStrategy::Sequential,
        }
    }
}

impl ChainConfig {
    pub fn proof_of_work(&self) -> Result<ProofOfWork> {
        if self.target_bits > HASH_BITS {
            return Err(ChainError::InvalidTarget(self.target_bits));
        }
        Ok(ProofOfWork::new(self.target_bits).with_strategy(self.strategy))
    }
}

/// Result of walking the whole chain with [`Blockchain::verify`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChainSummary {
    pub length: usize,
    pub tip: Hash,
    pub genesis: Hash,
}

/// Append-only ledger over a [`ChainStore`].
///
/// Appending takes `&mut self`; share a ledger between writers behind a mutex.
/// Iterators only hold the store and may outlive further appends.
pub struct Blockchain<S: ChainStore> {
    store: Arc<S>,
    tip: Hash,
    config: ChainConfig,
    pow: ProofOfWork,
}

impl<S: ChainStore> Blockchain<S> {
    /// Load the chain in `store`, mining and persisting a genesis block first
    /// if the store is empty.
    pub fn open(store: Arc<S>, config: ChainConfig) -> Result<Self> {
        Self::open_with(store, config, &CancelToken::new())
    }

    /// [`Blockchain::open`] with a cancelable genesis search.
    pub fn open_with(store: Arc<S>, config: ChainConfig, cancel: &CancelToken) -> Result<Self> {
        let pow = config.proof_of_work()?;
        let tip = match store.tip_hash()? {
            Some(tip) => {
                debug!(tip = %hex::encode(tip), "loaded existing chain");
                tip
            }
            None => {
                info!(target_bits = pow.target_bits(), "empty store, mining genesis block");
                let genesis = Block::genesis(&pow, cancel)?;
                let tip = store.init_genesis(&genesis)?;
                store.flush()?;
                info!(hash = %hex::encode(tip), "chain initialised");
                tip
            }
        };
        Ok(Self {
            store,
            tip,
            config,
            pow,
        })
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn config(&self) -> &ChainConfig {
        &self.config
    }

    pub fn proof_of_work(&self) -> &ProofOfWork {
        &self.pow
    }

    /// Hash of the most recently appended block.
    pub fn tip(&self) -> Hash {
        self.tip
    }

    /// Mine `payload` on top of the tip and persist it.
    pub fn append(&mut self, payload: impl Into<Vec<u8>>) -> Result<Block> {
        self.append_with(payload, &CancelToken::new())
    }

    /// [`Blockchain::append`] with a cancelable search. An aborted search
    /// returns [`ChainError::Aborted`] and leaves the store untouched.
    ///
    /// A flush failure is returned after the tip has already moved: the block
    /// is committed and this handle stays in step with the store.
    pub fn append_with(
        &mut self,
        payload: impl Into<Vec<u8>>,
        cancel: &CancelToken,
    ) -> Result<Block> {
        let block = Block::new(payload, Some(self.tip), &self.pow, cancel)?;
        if let Err(err) = self.store.append_block(&block) {
            if let ChainError::TipMoved { found, .. } = &err {
                warn!(expected = %hex::encode(self.tip), found = %found, "another writer moved the tip");
            }
            return Err(err);
        }
        self.tip = *block.hash();
        debug!(tip = %block.hash_hex(), "tip advanced");
        self.store.flush()?;
        Ok(block)
    }

    /// Cursor from the current tip back to genesis.
    pub fn iter(&self) -> ChainIter<S> {
        ChainIter::new(Arc::clone(&self.store), Some(self.tip), self.pow)
    }

    /// Walk the whole chain, validating every block, and check it ends in a
    /// single genesis block.
    pub fn verify(&self) -> Result<ChainSummary> {
        let mut length = 0usize;
        let mut genesis = None;
        for block in self.iter() {
            let block = block?;
            length += 1;
            if block.is_genesis() {
                genesis = Some(*block.hash());
            }
        }
        // The iterator only stops without error after a genesis block.
        let genesis = genesis.ok_or(ChainError::MissingBlock(self.tip))?;
        Ok(ChainSummary {
            length,
            tip: self.tip,
            genesis,
        })
    }
}

impl<S: ChainStore> IntoIterator for &Blockchain<S> {
    type Item = Result<Block>;
    type IntoIter = ChainIter<S>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MemStore;

    fn low_target() -> ChainConfig {
        ChainConfig {
            target_bits: 8,
            ..ChainConfig::default()
        }
    }

    #[test]
    fn open_creates_genesis_once() {
        let store = Arc::new(MemStore::default());
        let first = Blockchain::open(store.clone(), low_target()).unwrap();
        assert_eq!(store.len(), 2); // genesis record + tip
        let second = Blockchain::open(store.clone(), low_target()).unwrap();
        assert_eq!(first.tip(), second.tip());
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn append_moves_tip() {
        let store = Arc::new(MemStore::default());
        let mut chain = Blockchain::open(store.clone(), low_target()).unwrap();
        let genesis = chain.tip();
        let block = chain.append(b"hello".to_vec()).unwrap();
        assert_eq!(block.prev_hash(), Some(&genesis));
        assert_eq!(chain.tip(), *block.hash());
        assert_eq!(store.tip_hash().unwrap(), Some(*block.hash()));
        assert!(chain.proof_of_work().validate(&block));
    }

    #[test]
    fn aborted_append_writes_nothing() {
        let store = Arc::new(MemStore::default());
        let mut chain = Blockchain::open(store.clone(), low_target()).unwrap();
        let tip = chain.tip();
        let cancel = CancelToken::new();
        cancel.cancel();

        // Reconfigure to an unreachable target so the search has to abort.
        chain.pow = ProofOfWork::new(200);
        let err = chain.append_with("never", &cancel).unwrap_err();
        assert!(err.is_aborted());
        assert_eq!(chain.tip(), tip);
        assert_eq!(store.tip_hash().unwrap(), Some(tip));
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn failed_flush_keeps_cached_tip_in_step() {
        let store = Arc::new(MemStore::default());
        let mut chain = Blockchain::open(store.clone(), low_target()).unwrap();

        store.fail_flush(true);
        let err = chain.append("committed, not flushed").unwrap_err();
        assert!(matches!(err, ChainError::Storage(_)));
        let committed = store.tip_hash().unwrap().unwrap();
        assert_eq!(chain.tip(), committed);

        store.fail_flush(false);
        let next = chain.append("after the failure").unwrap();
        assert_eq!(next.prev_hash(), Some(&committed));
        assert_eq!(chain.verify().unwrap().length, 3);
    }

    #[test]
    fn failed_flush_on_open_still_leaves_genesis() {
        let store = Arc::new(MemStore::default());
        store.fail_flush(true);
        assert!(matches!(
            Blockchain::open(store.clone(), low_target()),
            Err(ChainError::Storage(_))
        ));
        store.fail_flush(false);
        let genesis = store.tip_hash().unwrap().unwrap();
        let chain = Blockchain::open(store.clone(), low_target()).unwrap();
        assert_eq!(chain.tip(), genesis);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn second_writer_sees_tip_moved() {
        let store = Arc::new(MemStore::default());
        let mut a = Blockchain::open(store.clone(), low_target()).unwrap();
        let mut b = Blockchain::open(store.clone(), low_target()).unwrap();
        let winner = a.append("from a").unwrap();
        let err = b.append("from b").unwrap_err();
        assert!(matches!(err, ChainError::TipMoved { .. }));
        // The losing handle keeps its stale tip; the store keeps the winner.
        assert_eq!(store.tip_hash().unwrap(), Some(*winner.hash()));
        assert_eq!(a.verify().unwrap().length, 2);
    }

    #[test]
    fn open_rejects_bad_target_before_touching_store() {
        let store = Arc::new(MemStore::default());
        let config = ChainConfig {
            target_bits: 300,
            ..ChainConfig::default()
        };
        assert!(matches!(
            Blockchain::open(store.clone(), config),
            Err(ChainError::InvalidTarget(300))
        ));
        assert_eq!(store.len(), 0);
    }

    #[test]
    fn default_config_uses_fixed_target() {
        let config = ChainConfig::default();
        assert_eq!(config.target_bits, 24);
        assert_eq!(config.strategy, SearchStrategy::Sequential);
        let pow = config.proof_of_work().unwrap();
        assert_eq!(pow.target_bits(), TARGET_BITS);
    }

    #[test]
    fn rejects_target_beyond_hash_width() {
        let config = ChainConfig {
            target_bits: 257,
            ..ChainConfig::default()
        };
        assert!(matches!(
            config.proof_of_work(),
            Err(ChainError::InvalidTarget(257))
        ));
    }
}
