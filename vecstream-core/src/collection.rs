//! A `Collection` binds one [`VectorStore`] + one [`HnswIndex`] to a
//! persistence directory and exposes the end-user read/write contract.

use crate::error::{Error, Result};
use crate::hnsw::{FilteredSearchResult, HnswIndex, HnswParams};
use crate::lock::DirLock;
use crate::metadata::MetadataFilter;
use crate::persistence;
use crate::store::VectorStore;
use parking_lot::RwLock;
use serde::Serialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Fraction of ever-removed ids past which `remove_vector` rebuilds the
/// index from the live store to repair graph quality.
const DEFAULT_REBUILD_THRESHOLD: f64 = 0.25;

struct Inner {
    store: VectorStore,
    index: HnswIndex,
    dirty: bool,
    deleted_count: usize,
    created_at: u64,
    _lock: Option<DirLock>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CollectionStats {
    pub name: String,
    pub count: usize,
    pub dimension: Option<usize>,
    pub params: HnswParams,
    pub dirty: bool,
    pub deleted_fraction: f64,
}

pub struct Collection {
    name: String,
    dir: PathBuf,
    inner: RwLock<Inner>,
}

impl Collection {
    /// Creates a brand-new, empty collection at `dir`.
    pub fn create(dir: impl Into<PathBuf>, name: impl Into<String>, params: HnswParams) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        let lock = DirLock::acquire(&dir).ok();
        Ok(Self {
            name: name.into(),
            dir,
            inner: RwLock::new(Inner {
                store: VectorStore::new(),
                index: HnswIndex::new(params),
                dirty: false,
                deleted_count: 0,
                created_at: persistence::now_unix_secs(),
                _lock: lock,
            }),
        })
    }

    /// Opens an existing collection directory, loading persisted state.
    pub fn open(dir: impl Into<PathBuf>, name: impl Into<String>) -> Result<Self> {
        let dir = dir.into();
        let lock = DirLock::acquire(&dir).ok();
        let loaded = persistence::load(&dir)?;
        Ok(Self {
            name: name.into(),
            dir,
            inner: RwLock::new(Inner {
                store: loaded.store,
                index: loaded.index,
                dirty: false,
                deleted_count: 0,
                created_at: loaded.created_at,
                _lock: lock,
            }),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Inserts a new vector. Rolls back the store insert if the index
    /// insert fails, so a failed `add_vector` has no observable effect.
    pub fn add_vector(&self, id: impl Into<String>, vector: Vec<f32>, meta: Option<Value>) -> Result<()> {
        let id = id.into();
        let meta = meta.unwrap_or_else(|| Value::Object(Default::default()));
        let mut g = self.inner.write();
        g.store.add(&id, vector.clone(), meta)?;
        if let Err(e) = g.index.insert(id.clone(), &vector) {
            let _ = g.store.remove(&id);
            return Err(e);
        }
        g.dirty = true;
        Ok(())
    }

    /// All live ids in the collection, ascending.
    pub fn ids(&self) -> Vec<String> {
        self.inner.read().store.ids()
    }

    pub fn get_vector(&self, id: &str) -> Result<Vec<f32>> {
        let g = self.inner.read();
        g.store.get(id).map(|(v, _)| v)
    }

    pub fn get_vector_with_metadata(&self, id: &str) -> Result<(Vec<f32>, Value)> {
        let g = self.inner.read();
        g.store.get(id)
    }

    /// Removes a vector. Two-phase with rollback: if the index removal
    /// fails after the store removal succeeds, the record is restored.
    pub fn remove_vector(&self, id: &str) -> Result<()> {
        let mut g = self.inner.write();
        let (vector, meta) = g.store.get(id)?;
        g.store.remove(id)?;
        if let Err(e) = g.index.remove(id) {
            let _ = g.store.add(id, vector, meta);
            return Err(e);
        }
        g.deleted_count += 1;
        g.dirty = true;

        let total_seen = g.deleted_count + g.store.size();
        let deleted_fraction = if total_seen == 0 {
            0.0
        } else {
            g.deleted_count as f64 / total_seen as f64
        };
        if deleted_fraction > DEFAULT_REBUILD_THRESHOLD && g.store.size() > 0 {
            info!(
                collection = %self.name,
                deleted_fraction,
                "deleted fraction exceeds rebuild threshold, rebuilding index"
            );
            let params = g.index.params().clone();
            let fresh_seed = params.seed.wrapping_add(1);
            let mut entries = Vec::with_capacity(g.store.size());
            for id in g.store.ids() {
                let (v, _) = g.store.get(&id)?;
                entries.push((id, v));
            }
            let rebuilt_params = HnswParams { seed: fresh_seed, ..params };
            g.index = HnswIndex::rebuild(rebuilt_params, entries)?;
            g.deleted_count = 0;
        }
        Ok(())
    }

    /// Cosine k-NN search, optionally metadata-filtered and/or thresholded.
    /// Returns an empty list if the collection is empty or `query` is
    /// zero-length, per contract.
    pub fn search_similar(
        &self,
        query: &[f32],
        k: usize,
        ef: Option<usize>,
        filter: Option<&MetadataFilter>,
        threshold: Option<f32>,
    ) -> Result<Vec<(String, f32)>> {
        let g = self.inner.read();
        if g.store.size() == 0 || query.is_empty() {
            return Ok(Vec::new());
        }
        let dim = g.store.dimension().unwrap();
        if query.len() != dim {
            return Err(Error::DimensionMismatch {
                expected: dim,
                actual: query.len(),
            });
        }
        let ef = ef.unwrap_or(g.index.params().ef_search);

        let mut results: Vec<(String, f32)> = match filter {
            Some(f) => {
                let store = &g.store;
                let predicate = |id: &str| store.get_metadata(id).is_some_and(|m| f.matches(m));
                match g.index.filtered_search(query, k, ef, predicate) {
                    FilteredSearchResult::Ok(hits) => {
                        hits.into_iter().map(|(id, dist)| (id, 1.0 - dist)).collect()
                    }
                    FilteredSearchResult::Insufficient => {
                        debug!(collection = %self.name, "oversample cap reached, falling back to brute-force filtered search");
                        g.store.search_brute(query, k, Some(f))
                    }
                }
            }
            None => g
                .index
                .search(query, k, ef)
                .into_iter()
                .map(|(id, dist)| (id, 1.0 - dist))
                .collect(),
        };

        if let Some(t) = threshold {
            results.retain(|(_, sim)| *sim >= t);
        }
        results.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap().then_with(|| a.0.cmp(&b.0)));
        results.truncate(k);
        Ok(results)
    }

    pub fn stats(&self) -> CollectionStats {
        let g = self.inner.read();
        let total_seen = g.deleted_count + g.store.size();
        let deleted_fraction = if total_seen == 0 {
            0.0
        } else {
            g.deleted_count as f64 / total_seen as f64
        };
        CollectionStats {
            name: self.name.clone(),
            count: g.store.size(),
            dimension: g.store.dimension(),
            params: g.index.params().clone(),
            dirty: g.dirty,
            deleted_fraction,
        }
    }

    pub fn save(&self) -> Result<()> {
        let mut g = self.inner.write();
        persistence::save(&self.dir, &g.store, &g.index, g.created_at)?;
        g.dirty = false;
        Ok(())
    }

    /// Discards in-memory state and reloads from disk. On any persistence
    /// failure the collection is left exactly as it was before the call.
    pub fn reload(&self) -> Result<()> {
        let loaded = persistence::load(&self.dir)?;
        let mut g = self.inner.write();
        g.store = loaded.store;
        g.index = loaded.index;
        g.created_at = loaded.created_at;
        g.dirty = false;
        g.deleted_count = 0;
        Ok(())
    }
}
