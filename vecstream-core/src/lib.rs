//! VecStream core: an embeddable vector database.
//!
//! Stores high-dimensional vectors keyed by string identifiers, each
//! carrying an arbitrary JSON metadata record, and answers k-nearest-
//! neighbor similarity queries under cosine similarity with optional
//! metadata predicates.
//!
//! # Layout
//!
//! - [`VectorStore`] — in-memory vector + metadata storage.
//! - [`distance`] — cosine/Euclidean kernels and normalization.
//! - [`HnswIndex`] — approximate nearest-neighbor graph.
//! - [`MetadataFilter`] — dot-path predicate evaluation.
//! - [`Collection`] — one indexed, persisted namespace.
//! - [`CollectionManager`] — a directory-rooted registry of collections.
//!
//! # Example
//!
//! ```rust,no_run
//! use vecstream_core::{CollectionManager, HnswParams};
//! use serde_json::json;
//!
//! # fn example() -> vecstream_core::Result<()> {
//! let manager = CollectionManager::new("./my-store")?;
//! let collection = manager.create_collection("docs", None)?;
//!
//! collection.add_vector("doc-1", vec![0.1, 0.2, 0.3], Some(json!({"lang": "en"})))?;
//! let results = collection.search_similar(&[0.1, 0.2, 0.3], 5, None, None, None)?;
//! # let _ = results;
//! # Ok(())
//! # }
//! ```

mod collection;
mod distance;
mod error;
mod hnsw;
mod lock;
mod manager;
mod metadata;
mod paths;
mod persistence;
mod store;

pub use collection::{Collection, CollectionStats};
pub use distance::{cosine_distance, cosine_similarity, euclidean_distance, magnitude, normalized};
pub use error::{Error, Result};
pub use hnsw::{FilteredSearchResult, HnswIndex, HnswParams};
pub use manager::CollectionManager;
pub use metadata::MetadataFilter;
pub use paths::default_db_path;
pub use store::VectorStore;
