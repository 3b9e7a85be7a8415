pub const BYTE: usize = 8;
pub const HASH_SIZE: usize = 32;
pub const HASH_BITS: u32 = (HASH_SIZE * BYTE) as u32;

/// Leading zero bits a block hash must carry, i.e. `hash < 2^(256 - TARGET_BITS)`.
pub const TARGET_BITS: u32 = 24;

pub const GENESIS_PAYLOAD: &[u8] = b"Genesis Block";

/// Reserved key holding the tip hash. Block hashes are always 32 bytes, so a
/// one-byte key never collides with one.
pub const TIP_KEY: &[u8] = b"l";

pub const BLOCKS_TREE: &str = "blocks";

/// How many nonces the miner tries between cancellation checks.
pub const CANCEL_CHECK_INTERVAL: u64 = 1 << 12;
