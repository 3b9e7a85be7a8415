use hashchain_core::{
    constants::{BLOCKS_TREE, TIP_KEY},
    Block, ChainError, ChainStore, Hash, Result,
};
use sled::{
    transaction::{ConflictableTransactionError, TransactionError, TransactionResult},
    Db, Tree,
};
use std::path::Path;
use tracing::{debug, info};

const TREE_BLOCKS: &str = BLOCKS_TREE;

/// `ChainStore` over one sled tree: block records keyed by their hash, plus
/// the tip pointer under `TIP_KEY`.
#[derive(Clone)]
pub struct SledStore {
  db: Db,
  blocks: Tree,
}

fn decode_tip(bytes: &[u8]) -> Result<Hash> {
  Hash::try_from(bytes).map_err(|_| ChainError::CorruptTip(bytes.len()))
}

fn from_tx(err: TransactionError<ChainError>) -> ChainError {
  match err {
    TransactionError::Abort(err) => err,
    TransactionError::Storage(err) => ChainError::storage(err),
  }
}

impl SledStore {
  pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
    let path = path.as_ref();
    let db = sled::open(path).map_err(|e| ChainError::open(path, e))?;
    let blocks = db
      .open_tree(TREE_BLOCKS)
      .map_err(|e| ChainError::open(path, e))?;
    info!(path = %path.display(), "sled store opened");
    Ok(Self { db, blocks })
  }

  /// Number of block records, not counting the tip pointer.
  pub fn block_count(&self) -> Result<usize> {
    let entries = self.blocks.len();
    let has_tip = self
      .blocks
      .contains_key(TIP_KEY)
      .map_err(ChainError::storage)?;
    Ok(if has_tip { entries - 1 } else { entries })
  }

  /// Raw bytes under `key`, bypassing decoding.
  pub fn get_raw(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
    let value = self.blocks.get(key).map_err(ChainError::storage)?;
    Ok(value.map(|v| v.to_vec()))
  }
}

impl ChainStore for SledStore {
  fn tip_hash(&self) -> Result<Option<Hash>> {
    self
      .blocks
      .get(TIP_KEY)
      .map_err(ChainError::storage)?
      .map(|v| decode_tip(&v))
      .transpose()
  }

  fn get_block(&self, hash: &Hash) -> Result<Option<Block>> {
    let Some(bytes) = self.blocks.get(hash).map_err(ChainError::storage)? else {
      debug!(hash = %hex::encode(hash), "block not found");
      return Ok(None);
    };
    Block::from_record(&bytes)
      .map(Some)
      .map_err(|e| ChainError::corrupt(hash, e))
  }

  fn init_genesis(&self, genesis: &Block) -> Result<Hash> {
    let record = genesis.to_record()?;
    let key = &genesis.hash()[..];

    let result: TransactionResult<Hash, ChainError> = self.blocks.transaction(|tx| {
      if let Some(existing) = tx.get(TIP_KEY)? {
        return decode_tip(&existing).map_err(ConflictableTransactionError::Abort);
      }
      tx.insert(key, record.as_slice())?;
      tx.insert(TIP_KEY, key)?;
      Ok(*genesis.hash())
    });
    result.map_err(from_tx)
  }

  fn append_block(&self, block: &Block) -> Result<()> {
    let record = block.to_record()?;
    let key = &block.hash()[..];

    let result: TransactionResult<(), ChainError> = self.blocks.transaction(|tx| {
      let tip = match tx.get(TIP_KEY)? {
        Some(bytes) => Some(decode_tip(&bytes).map_err(ConflictableTransactionError::Abort)?),
        None => None,
      };
      if tip.as_ref() != block.prev_hash() {
        return Err(ConflictableTransactionError::Abort(ChainError::TipMoved {
          expected: block.prev_hash_hex(),
          found: tip.map(hex::encode).unwrap_or_default(),
        }));
      }
      tx.insert(key, record.as_slice())?;
      tx.insert(TIP_KEY, key)?;
      Ok(())
    });
    result.map_err(from_tx)?;
    debug!(hash = %block.hash_hex(), bytes = record.len(), "block written");
    Ok(())
  }

  fn flush(&self) -> Result<()> {
    self.db.flush().map_err(ChainError::storage)?;
    Ok(())
  }
}
