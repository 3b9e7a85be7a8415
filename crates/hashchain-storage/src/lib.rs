pub mod sled_store;

pub use sled_store::SledStore;

use hashchain_core::{Blockchain, ChainConfig, Result};
use std::{path::Path, sync::Arc};

/// Open (or create) the sled database at `path` and load the chain in it,
/// mining a genesis block if the database is new.
pub fn open_chain<P: AsRef<Path>>(path: P, config: ChainConfig) -> Result<Blockchain<SledStore>> {
    let store = Arc::new(SledStore::open(path)?);
    Blockchain::open(store, config)
}
