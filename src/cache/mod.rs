//! Embedded-data caching and content hashing.
//!
//! Encoded embedded tables are split into row blocks. Blocks live inline in
//! the plan or in a [`BlockStore`]; decoding goes through a shared
//! [`DecodeCache`] keyed by payload digest and [`DecodeMode`], so clones of
//! the same node decode a payload at most once per mode.
//!
//! # Key Format
//!
//! ```text
//! {digest}-{block index}          -> stored block (base64 JSON rows)
//! ({digest}, metadata | full)     -> decoded table in the decode cache
//! ```

mod block_store;
mod decode;
mod hash;

pub use block_store::{BlockStore, FileBlockStore, MemoryBlockStore};
pub use decode::{encode_rows, encode_table, DecodeCache, DecodeMode, DecodedTable};
pub use hash::{hash_parts, hash_text};

use crate::error::PlanError;

/// Errors that can occur during cache operations.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Base64 decode error: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Block '{0}' not found")]
    MissingBlock(String),

    #[error("Payload digest mismatch: expected {expected}, found {actual}")]
    DigestMismatch { expected: String, actual: String },

    #[error("Stored block needs a block store: {0}")]
    NoStore(String),
}

pub type CacheResult<T> = Result<T, CacheError>;

impl From<CacheError> for PlanError {
    fn from(err: CacheError) -> Self {
        match err {
            CacheError::Io(_) | CacheError::MissingBlock(_) | CacheError::NoStore(_) => {
                PlanError::Storage(err.to_string())
            }
            CacheError::Json(_) | CacheError::Base64(_) | CacheError::DigestMismatch { .. } => {
                PlanError::Decode(err.to_string())
            }
        }
    }
}
