//! Core of a single-writer, hash-chained ledger.
//!
//! Blocks are admitted only after a proof-of-work search and are linked to
//! their predecessor by hash. Persistence is behind [`chain::ChainStore`];
//! see the `hashchain-storage` crate for the sled backend.

pub mod block;
pub mod chain;
pub mod constants;
pub mod error;
pub mod hashing;
pub mod iter;
mod mine;
pub mod pow;

#[cfg(test)]
mod testing;

pub type Hash = [u8; constants::HASH_SIZE];

pub use block::{Block, Candidate};
pub use chain::{Blockchain, ChainConfig, ChainStore, ChainSummary};
pub use error::{ChainError, Result};
pub use iter::ChainIter;
pub use pow::{CancelToken, ProofOfWork, SearchStrategy, Solution};
