//! Error taxonomy for the vector store core.
//!
//! Mirrors the distinction spec'd for the subsystem: validation errors are
//! recoverable and leave state untouched, persistence errors must leave the
//! collection in its pre-operation state, and `IndexInconsistency` is fatal
//! for the affected collection.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("id already exists: {0}")]
    DuplicateId(String),

    #[error("id not found: {0}")]
    NotFound(String),

    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("vector must not be empty")]
    EmptyVector,

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("collection already exists: {0}")]
    CollectionExists(String),

    #[error("no such collection: {0}")]
    NoSuchCollection(String),

    #[error("invalid collection name: {0}")]
    InvalidName(String),

    #[error("store is corrupt: {0}")]
    CorruptStore(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("index invariant violated: {0}")]
    IndexInconsistency(String),
}

pub type Result<T> = std::result::Result<T, Error>;
