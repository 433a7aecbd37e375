//! In-memory mapping from identifier to (vector, metadata), with a
//! precomputed unit-normalized copy per vector to accelerate repeated
//! cosine comparisons.

use crate::distance;
use crate::error::{Error, Result};
use crate::metadata::MetadataFilter;
use rayon::prelude::*;
use serde_json::Value;
use std::collections::HashMap;

struct Record {
    vector: Vec<f32>,
    normalized: Vec<f32>,
    meta: Value,
}

/// Owns vector and metadata storage for one collection. Dimension is fixed
/// by the first successful `add` and enforced on every subsequent one.
#[derive(Default)]
pub struct VectorStore {
    dimension: Option<usize>,
    records: HashMap<String, Record>,
}

impl VectorStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reconstructs a store with a fixed dimension and no records, used
    /// when loading persisted collections before replaying rows.
    pub fn with_dimension(dimension: usize) -> Self {
        Self {
            dimension: Some(dimension),
            records: HashMap::new(),
        }
    }

    pub fn add(&mut self, id: &str, vector: Vec<f32>, meta: Value) -> Result<()> {
        if id.is_empty() {
            return Err(Error::InvalidParameter("id must not be empty".into()));
        }
        if vector.is_empty() {
            return Err(Error::EmptyVector);
        }
        match self.dimension {
            Some(d) if d != vector.len() => {
                return Err(Error::DimensionMismatch {
                    expected: d,
                    actual: vector.len(),
                });
            }
            None => self.dimension = Some(vector.len()),
            _ => {}
        }
        if self.records.contains_key(id) {
            return Err(Error::DuplicateId(id.to_string()));
        }
        let normalized = distance::normalized(&vector);
        self.records.insert(
            id.to_string(),
            Record {
                vector,
                normalized,
                meta,
            },
        );
        Ok(())
    }

    pub fn get(&self, id: &str) -> Result<(Vec<f32>, Value)> {
        self.records
            .get(id)
            .map(|r| (r.vector.clone(), r.meta.clone()))
            .ok_or_else(|| Error::NotFound(id.to_string()))
    }

    pub fn get_metadata(&self, id: &str) -> Option<&Value> {
        self.records.get(id).map(|r| &r.meta)
    }

    pub fn remove(&mut self, id: &str) -> Result<()> {
        self.records
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| Error::NotFound(id.to_string()))
    }

    pub fn size(&self) -> usize {
        self.records.len()
    }

    pub fn dimension(&self) -> Option<usize> {
        self.dimension
    }

    /// All live ids, in stable ascending order.
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.records.keys().cloned().collect();
        ids.sort_unstable();
        ids
    }

    /// Exact cosine k-NN, computed in parallel over all records. Used as the
    /// correctness fallback for filtered search and directly by tests.
    pub fn search_brute(
        &self,
        query: &[f32],
        k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Vec<(String, f32)> {
        if query.is_empty() || self.records.is_empty() {
            return Vec::new();
        }
        let query_norm = distance::normalized(query);
        let mut scored: Vec<(String, f32)> = self
            .records
            .par_iter()
            .filter(|(_, r)| filter.is_none_or(|f| f.matches(&r.meta)))
            .map(|(id, r)| (id.clone(), distance::dot(&query_norm, &r.normalized)))
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap().then_with(|| a.0.cmp(&b.0)));
        scored.truncate(k);
        scored
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn add_fixes_dimension() {
        let mut s = VectorStore::new();
        s.add("a", vec![1.0, 2.0, 3.0, 4.0], json!({})).unwrap();
        assert_eq!(s.dimension(), Some(4));
        let err = s.add("b", vec![1.0, 2.0, 3.0], json!({})).unwrap_err();
        assert!(matches!(err, Error::DimensionMismatch { expected: 4, actual: 3 }));
        assert_eq!(s.size(), 1);
    }

    #[test]
    fn duplicate_id_rejected() {
        let mut s = VectorStore::new();
        s.add("a", vec![1.0], json!({})).unwrap();
        assert!(matches!(s.add("a", vec![2.0], json!({})), Err(Error::DuplicateId(_))));
    }

    #[test]
    fn empty_vector_rejected() {
        let mut s = VectorStore::new();
        assert!(matches!(s.add("a", vec![], json!({})), Err(Error::EmptyVector)));
    }

    #[test]
    fn remove_then_get_not_found() {
        let mut s = VectorStore::new();
        s.add("a", vec![1.0], json!({})).unwrap();
        s.remove("a").unwrap();
        assert!(matches!(s.get("a"), Err(Error::NotFound(_))));
        assert!(matches!(s.remove("a"), Err(Error::NotFound(_))));
    }

    #[test]
    fn brute_force_basic_ordering() {
        let mut s = VectorStore::new();
        s.add("a", vec![1.0, 0.0, 0.0], json!({})).unwrap();
        s.add("b", vec![0.0, 1.0, 0.0], json!({})).unwrap();
        s.add("c", vec![0.9, 0.1, 0.0], json!({})).unwrap();

        let results = s.search_brute(&[1.0, 0.0, 0.0], 3, None);
        let ids: Vec<&str> = results.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(ids, vec!["a", "c", "b"]);
        assert!((results[0].1 - 1.0).abs() < 1e-5);
        assert!((results[2].1 - 0.0).abs() < 1e-5);
    }

    #[test]
    fn brute_force_filter() {
        let mut s = VectorStore::new();
        s.add("a", vec![1.0, 0.0], json!({"cat": "ai", "year": 2023})).unwrap();
        s.add("b", vec![1.0, 0.0], json!({"cat": "ai", "year": 2022})).unwrap();
        s.add("c", vec![1.0, 0.0], json!({"cat": "bio", "year": 2023})).unwrap();

        let filter = MetadataFilter::new().with("cat", json!("ai")).with("year", json!(2023));
        let results = s.search_brute(&[1.0, 0.0], 5, Some(&filter));
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].0, "a");
    }
}
