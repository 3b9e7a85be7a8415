//! In-memory `ChainStore` for unit tests.

use crate::{
    block::Block,
    chain::ChainStore,
    constants::TIP_KEY,
    error::{ChainError, Result},
    Hash,
};
use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, Ordering},
        Mutex,
    },
};

#[derive(Default)]
pub(crate) struct MemStore {
    entries: Mutex<HashMap<Vec<u8>, Vec<u8>>>,
    fail_flush: AtomicBool,
}

impl MemStore {
    pub(crate) fn remove(&self, hash: &Hash) {
        self.entries.lock().unwrap().remove(&hash[..]);
    }

    pub(crate) fn put_raw(&self, key: &[u8], value: Vec<u8>) {
        self.entries.lock().unwrap().insert(key.to_vec(), value);
    }

    /// Make every later `flush` fail until switched off again.
    pub(crate) fn fail_flush(&self, fail: bool) {
        self.fail_flush.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    fn tip_of(entries: &HashMap<Vec<u8>, Vec<u8>>) -> Option<Hash> {
        entries
            .get(TIP_KEY)
            .and_then(|v| <Hash>::try_from(v.as_slice()).ok())
    }
}

impl ChainStore for MemStore {
    fn tip_hash(&self) -> Result<Option<Hash>> {
        Ok(Self::tip_of(&self.entries.lock().unwrap()))
    }

    fn get_block(&self, hash: &Hash) -> Result<Option<Block>> {
        let entries = self.entries.lock().unwrap();
        entries
            .get(&hash[..])
            .map(|bytes| Block::from_record(bytes).map_err(|e| ChainError::corrupt(hash, e)))
            .transpose()
    }

    fn init_genesis(&self, genesis: &Block) -> Result<Hash> {
        let mut entries = self.entries.lock().unwrap();
        if let Some(tip) = Self::tip_of(&entries) {
            return Ok(tip);
        }
        entries.insert(genesis.hash().to_vec(), genesis.to_record()?);
        entries.insert(TIP_KEY.to_vec(), genesis.hash().to_vec());
        Ok(*genesis.hash())
    }

    fn append_block(&self, block: &Block) -> Result<()> {
        let mut entries = self.entries.lock().unwrap();
        let tip = Self::tip_of(&entries);
        if tip.as_ref() != block.prev_hash() {
            return Err(ChainError::TipMoved {
                expected: block.prev_hash_hex(),
                found: tip.map(hex::encode).unwrap_or_default(),
            });
        }
        entries.insert(block.hash().to_vec(), block.to_record()?);
        entries.insert(TIP_KEY.to_vec(), block.hash().to_vec());
        Ok(())
    }

    fn flush(&self) -> Result<()> {
        if self.fail_flush.load(Ordering::SeqCst) {
            return Err(ChainError::storage(std::io::Error::other("disk full")));
        }
        Ok(())
    }
}
