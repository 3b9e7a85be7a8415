//! Error types shared by the core and the storage backends.

use crate::Hash;
use thiserror::Error;

pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, Error)]
pub enum ChainError {
    #[error("could not open store at {path}")]
    Open {
        path: String,
        #[source]
        source: BoxError,
    },

    #[error("storage operation failed")]
    Storage(#[source] BoxError),

    #[error("tip pointer holds {0} bytes, expected a 32-byte hash")]
    CorruptTip(usize),

    #[error("block {} is missing from storage", hex::encode(.0))]
    MissingBlock(Hash),

    #[error("stored record under key {key} could not be decoded")]
    Corrupt {
        key: String,
        #[source]
        source: bincode::Error,
    },

    #[error("block {} failed validation", hex::encode(.0))]
    InvalidBlock(Hash),

    #[error("block could not be encoded")]
    Encode(#[source] bincode::Error),

    #[error("target of {0} bits is out of range (max 256)")]
    InvalidTarget(u32),

    #[error("tip moved from {expected} to {found} before the new block was written")]
    TipMoved { expected: String, found: String },

    #[error("mining aborted after {attempts} attempts")]
    Aborted { attempts: u64 },

    #[error("nonce space exhausted without meeting the target")]
    Unsolvable,

    #[error("system clock is set before the Unix epoch")]
    Clock(#[source] std::time::SystemTimeError),
}

impl ChainError {
    /// Wrap a backend error (sled, io, ...) as a storage failure.
    pub fn storage<E>(err: E) -> Self
    where
        E: Into<BoxError>,
    {
        ChainError::Storage(err.into())
    }

    pub fn open<E>(path: impl AsRef<std::path::Path>, err: E) -> Self
    where
        E: Into<BoxError>,
    {
        ChainError::Open {
            path: path.as_ref().display().to_string(),
            source: err.into(),
        }
    }

    pub fn corrupt(key: &[u8], source: bincode::Error) -> Self {
        ChainError::Corrupt {
            key: hex::encode(key),
            source,
        }
    }

    /// True for outcomes the caller asked for rather than invariant breaks.
    pub fn is_aborted(&self) -> bool {
        matches!(self, ChainError::Aborted { .. })
    }
}

pub type Result<T> = std::result::Result<T, ChainError>;
