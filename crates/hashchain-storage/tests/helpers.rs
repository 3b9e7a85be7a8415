#![allow(dead_code)]

use std::{fs, path::PathBuf};

use hashchain_core::{Block, CancelToken, ChainConfig, ProofOfWork};
use hashchain_storage::SledStore;
use tempfile::{tempdir, TempDir};

/// Low enough that tests mine in a few hundred hashes.
pub const TEST_TARGET_BITS: u32 = 8;

pub fn test_config() -> ChainConfig {
    ChainConfig {
        target_bits: TEST_TARGET_BITS,
        ..ChainConfig::default()
    }
}

pub fn test_pow() -> ProofOfWork {
    ProofOfWork::new(TEST_TARGET_BITS)
}

pub fn create_temp_dir() -> (TempDir, PathBuf) {
    // Create a temporary directory for the sled database
    let temp_dir = tempdir().expect("Failed to create temp dir");
    let db_path = temp_dir.path().join("chain-data");
    (temp_dir, db_path)
}

pub fn remove_temp_dir(temp_dir: TempDir) {
    let db_path = temp_dir.path().to_path_buf();
    temp_dir.close().expect("Failed to delete temp dir");
    let _ = fs::remove_dir_all(&db_path);
    // Verify the directory is removed
    assert!(!db_path.exists(), "Database directory should be removed");
}

pub fn create_temp_store() -> (TempDir, SledStore) {
    let (temp_dir, db_path) = create_temp_dir();
    (
        temp_dir,
        SledStore::open(&db_path).expect("Failed to open SledStore"),
    )
}

/// Genesis followed by `count` blocks, each linked to the one before.
pub fn mine_blocks(count: usize) -> Vec<Block> {
    let pow = test_pow();
    let cancel = CancelToken::new();
    let mut blocks = vec![Block::genesis(&pow, &cancel).expect("mine genesis")];
    for i in 0..count {
        let prev = *blocks[i].hash();
        let block = Block::new(format!("block {}", i + 1), Some(prev), &pow, &cancel)
            .expect("mine block");
        blocks.push(block);
    }
    blocks
}

/// Open the raw sled database behind a closed store and hand its block tree
/// to `f`. The store must be dropped first so the file lock is free.
pub fn with_raw_tree<F>(db_path: &PathBuf, f: F)
where
    F: FnOnce(&sled::Tree),
{
    let db = sled::open(db_path).expect("open raw sled");
    let tree = db
        .open_tree(hashchain_core::constants::BLOCKS_TREE)
        .expect("open blocks tree");
    f(&tree);
    db.flush().expect("flush raw sled");
}
