//! Hierarchical Navigable Small World index.
//!
//! A layered proximity graph over vector identifiers. Distances are computed
//! on L2-normalized copies of inserted vectors (memoized per id), so cosine
//! distance reduces to `1 - dot(a, b)`.

use crate::distance;
use crate::error::{Error, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, HashSet};
use std::io::{Read, Write};

/// Construction/search parameters. `seed` makes level assignment
/// reproducible across runs with identical insertion order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HnswParams {
    pub m: usize,
    pub m_max0: usize,
    pub ef_construction: usize,
    pub ef_search: usize,
    pub ml: f64,
    pub seed: u64,
}

impl HnswParams {
    pub fn new(m: usize, seed: u64) -> Self {
        Self {
            m,
            m_max0: m * 2,
            ef_construction: 200,
            ef_search: 50,
            ml: 1.0 / (m as f64).ln(),
            seed,
        }
    }

    fn m_max(&self, layer: usize) -> usize {
        if layer == 0 { self.m_max0 } else { self.m }
    }
}

impl Default for HnswParams {
    fn default() -> Self {
        Self::new(16, 0)
    }
}

/// Orderable wrapper around `f32` for use as a heap key. Inputs are always
/// finite distances, so `NaN` never arises in practice.
#[derive(Debug, Clone, Copy, PartialEq)]
struct OrdF32(f32);

impl Eq for OrdF32 {}
impl PartialOrd for OrdF32 {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for OrdF32 {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.partial_cmp(&other.0).unwrap_or(Ordering::Equal)
    }
}

/// Outcome of a filter-aware search: either the oversampled candidate pool
/// yielded at least `k` predicate matches, or it didn't even after the
/// oversample cap, and the caller should fall back to a brute-force scan.
pub enum FilteredSearchResult {
    Ok(Vec<(String, f32)>),
    Insufficient,
}

pub struct HnswIndex {
    params: HnswParams,
    rng: StdRng,
    /// Memoized L2-normalized vector per id.
    vectors: HashMap<String, Vec<f32>>,
    levels: HashMap<String, usize>,
    /// neighbors[id][layer] -> ordered neighbor ids, bounded by `m_max(layer)`.
    neighbors: HashMap<String, Vec<Vec<String>>>,
    entry_point: Option<String>,
}

impl HnswIndex {
    pub fn new(params: HnswParams) -> Self {
        let rng = StdRng::seed_from_u64(params.seed);
        Self {
            params,
            rng,
            vectors: HashMap::new(),
            levels: HashMap::new(),
            neighbors: HashMap::new(),
            entry_point: None,
        }
    }

    pub fn params(&self) -> &HnswParams {
        &self.params
    }

    /// Replaces the stored parameters (e.g. to restore `ef_search`, which
    /// `index.bin` doesn't carry, after the rest has been validated against
    /// `config.json`). Does not touch graph state.
    pub(crate) fn with_params(mut self, params: HnswParams) -> Self {
        self.params = params;
        self
    }

    pub fn len(&self) -> usize {
        self.levels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    pub fn entry_point(&self) -> Option<&str> {
        self.entry_point.as_deref()
    }

    fn draw_level(&mut self) -> usize {
        let u: f64 = self.rng.random_range(f64::EPSILON..1.0);
        (-u.ln() * self.params.ml).floor() as usize
    }

    fn dist_to_vec(&self, query_norm: &[f32], id: &str) -> f32 {
        match self.vectors.get(id) {
            Some(v) => 1.0 - distance::dot(query_norm, v),
            None => f32::MAX,
        }
    }

    fn dist_ids(&self, a: &str, b: &str) -> f32 {
        match (self.vectors.get(a), self.vectors.get(b)) {
            (Some(va), Some(vb)) => 1.0 - distance::dot(va, vb),
            _ => f32::MAX,
        }
    }

    /// Dynamic candidate-pool search at a single layer, starting from
    /// `entry_points`. Returns up to `ef` results sorted ascending by
    /// distance (ties broken by ascending id).
    fn search_layer(
        &self,
        query_norm: &[f32],
        entry_points: &[String],
        ef: usize,
        layer: usize,
    ) -> Vec<(String, f32)> {
        let mut visited: HashSet<String> = HashSet::new();
        let mut candidates: BinaryHeap<std::cmp::Reverse<(OrdF32, String)>> = BinaryHeap::new();
        let mut results: BinaryHeap<(OrdF32, String)> = BinaryHeap::new();

        for ep in entry_points {
            if visited.insert(ep.clone()) {
                let d = self.dist_to_vec(query_norm, ep);
                candidates.push(std::cmp::Reverse((OrdF32(d), ep.clone())));
                results.push((OrdF32(d), ep.clone()));
            }
        }

        while let Some(std::cmp::Reverse((OrdF32(d_cur), cur))) = candidates.pop() {
            if results.len() >= ef {
                if let Some((OrdF32(worst), _)) = results.peek() {
                    if d_cur > *worst {
                        break;
                    }
                }
            }

            let Some(layers) = self.neighbors.get(&cur) else {
                continue;
            };
            let Some(layer_neighbors) = layers.get(layer) else {
                continue;
            };

            for n in layer_neighbors {
                if visited.insert(n.clone()) {
                    let d = self.dist_to_vec(query_norm, n);
                    let should_add = results.len() < ef
                        || results.peek().is_some_and(|(OrdF32(worst), _)| d < *worst);
                    if should_add {
                        candidates.push(std::cmp::Reverse((OrdF32(d), n.clone())));
                        results.push((OrdF32(d), n.clone()));
                        if results.len() > ef {
                            results.pop();
                        }
                    }
                }
            }
        }

        let mut out: Vec<(String, f32)> = results.into_iter().map(|(OrdF32(d), id)| (id, d)).collect();
        out.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap().then_with(|| a.0.cmp(&b.0)));
        out
    }

    /// The "diverse" neighbor-selection heuristic: keep candidate `c` only
    /// if it is closer to the owner than to every already-kept neighbor.
    fn select_neighbors_heuristic(&self, candidates: &[(String, f32)], m: usize) -> Vec<String> {
        let mut selected: Vec<String> = Vec::with_capacity(m.min(candidates.len()));
        for (c, d_owner) in candidates {
            if selected.len() >= m {
                break;
            }
            let diverse = selected.iter().all(|n| *d_owner < self.dist_ids(c, n));
            if diverse {
                selected.push(c.clone());
            }
        }
        selected
    }

    fn add_edge(&mut self, from: &str, to: &str, layer: usize) {
        if let Some(layers) = self.neighbors.get_mut(from) {
            if let Some(lst) = layers.get_mut(layer) {
                if !lst.iter().any(|x| x == to) {
                    lst.push(to.to_string());
                }
            }
        }
    }

    /// Trims `owner`'s neighbor list at `layer` to the `m_max` closest
    /// neighbors, removing the discarded edges symmetrically.
    fn trim_neighbors(&mut self, owner: &str, layer: usize, m_max: usize) {
        let Some(current) = self
            .neighbors
            .get(owner)
            .and_then(|layers| layers.get(layer))
            .cloned()
        else {
            return;
        };
        if current.len() <= m_max {
            return;
        }
        let mut scored: Vec<(String, f32)> = current
            .iter()
            .map(|n| (n.clone(), self.dist_ids(owner, n)))
            .collect();
        scored.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap().then_with(|| a.0.cmp(&b.0)));
        let kept: HashSet<&str> = scored.iter().take(m_max).map(|(id, _)| id.as_str()).collect();
        let removed: Vec<String> = current.iter().filter(|n| !kept.contains(n.as_str())).cloned().collect();

        let new_list: Vec<String> = scored.into_iter().take(m_max).map(|(id, _)| id).collect();
        if let Some(layers) = self.neighbors.get_mut(owner) {
            layers[layer] = new_list;
        }
        for r in removed {
            if let Some(layers) = self.neighbors.get_mut(&r) {
                if let Some(lst) = layers.get_mut(layer) {
                    lst.retain(|x| x != owner);
                }
            }
        }
    }

    pub fn insert(&mut self, id: String, vector: &[f32]) -> Result<()> {
        if self.levels.contains_key(&id) {
            return Err(Error::IndexInconsistency(format!(
                "id {id} already present in index"
            )));
        }
        let normalized = distance::normalized(vector);
        let level = self.draw_level();

        if self.entry_point.is_none() {
            self.vectors.insert(id.clone(), normalized);
            self.neighbors.insert(id.clone(), vec![Vec::new(); level + 1]);
            self.levels.insert(id.clone(), level);
            self.entry_point = Some(id);
            return Ok(());
        }

        let ep = self.entry_point.clone().unwrap();
        let ep_level = self.levels[&ep];

        let mut cur = ep.clone();
        for layer in (level + 1..=ep_level).rev() {
            if let Some((best, _)) = self.search_layer(&normalized, &[cur.clone()], 1, layer).first() {
                cur = best.clone();
            }
        }

        self.vectors.insert(id.clone(), normalized.clone());
        self.neighbors.insert(id.clone(), vec![Vec::new(); level + 1]);
        self.levels.insert(id.clone(), level);

        let mut entry_points = vec![cur];
        for layer in (0..=level.min(ep_level)).rev() {
            let candidates = self.search_layer(&normalized, &entry_points, self.params.ef_construction, layer);
            let m_max = self.params.m_max(layer);
            let target_m = self.params.m.min(m_max);
            let selected = self.select_neighbors_heuristic(&candidates, target_m);

            for n in &selected {
                self.add_edge(&id, n, layer);
                self.add_edge(n, &id, layer);
                self.trim_neighbors(n, layer, m_max);
            }

            entry_points = candidates.into_iter().map(|(cid, _)| cid).collect();
        }

        if level > ep_level {
            self.entry_point = Some(id);
        }
        Ok(())
    }

    /// Approximate k-NN search. Returns `(id, distance)` pairs sorted
    /// ascending by distance, ties broken by ascending id.
    pub fn search(&self, query: &[f32], k: usize, ef: usize) -> Vec<(String, f32)> {
        self.candidate_pool(query, ef.max(k))
            .into_iter()
            .take(k)
            .collect()
    }

    /// Descends from the entry point and runs the layer-0 candidate-pool
    /// search, returning up to `ef` unfiltered, unsorted-by-k candidates.
    fn candidate_pool(&self, query: &[f32], ef: usize) -> Vec<(String, f32)> {
        if self.entry_point.is_none() || query.is_empty() {
            return Vec::new();
        }
        let normalized = distance::normalized(query);
        let ep = self.entry_point.clone().unwrap();
        let top_level = self.levels[&ep];

        let mut cur = ep;
        for layer in (1..=top_level).rev() {
            if let Some((best, _)) = self.search_layer(&normalized, &[cur.clone()], 1, layer).first() {
                cur = best.clone();
            }
        }
        self.search_layer(&normalized, &[cur], ef, 0)
    }

    /// Filter-aware search with a doubling oversample (10x, capped at 64x)
    /// applied to the candidate pool before the predicate is evaluated.
    pub fn filtered_search(
        &self,
        query: &[f32],
        k: usize,
        ef: usize,
        predicate: impl Fn(&str) -> bool,
    ) -> FilteredSearchResult {
        if self.entry_point.is_none() || query.is_empty() {
            return FilteredSearchResult::Ok(Vec::new());
        }
        let mut oversample = 10usize;
        loop {
            let ef_eff = ef.max(k.saturating_mul(oversample));
            let pool = self.candidate_pool(query, ef_eff);
            let filtered: Vec<(String, f32)> = pool.into_iter().filter(|(id, _)| predicate(id)).take(k).collect();
            if filtered.len() >= k {
                return FilteredSearchResult::Ok(filtered);
            }
            if oversample >= 64 {
                return FilteredSearchResult::Insufficient;
            }
            oversample = (oversample * 2).min(64);
        }
    }

    pub fn remove(&mut self, id: &str) -> Result<()> {
        let level = self
            .levels
            .remove(id)
            .ok_or_else(|| Error::NotFound(id.to_string()))?;
        let node_neighbors = self.neighbors.remove(id).unwrap_or_default();
        self.vectors.remove(id);

        for (layer, neighbors_at_layer) in node_neighbors.iter().enumerate() {
            for n in neighbors_at_layer {
                if let Some(layers) = self.neighbors.get_mut(n) {
                    if let Some(lst) = layers.get_mut(layer) {
                        lst.retain(|x| x != id);
                    }
                }
            }
        }

        if self.entry_point.as_deref() == Some(id) {
            // Deterministic regardless of HashMap iteration order: highest
            // level wins, smallest id breaks ties.
            self.entry_point = self
                .levels
                .iter()
                .min_by(|(ia, &la), (ib, &lb)| lb.cmp(&la).then_with(|| ia.cmp(ib)))
                .map(|(k, _)| k.clone());
        }
        let _ = level;
        Ok(())
    }

    /// Full reinsertion from scratch under (optionally) a fresh seed, used
    /// to repair graph quality after many removals.
    pub fn rebuild(params: HnswParams, entries: impl IntoIterator<Item = (String, Vec<f32>)>) -> Result<Self> {
        let mut fresh = Self::new(params);
        for (id, vector) in entries {
            fresh.insert(id, &vector)?;
        }
        Ok(fresh)
    }

    /// Serializes the graph to the `index.bin` wire format: magic `VSH1`,
    /// `m`, `m_max0`, `ef_construction`, `seed`, entry point, then per id (in
    /// `id_order`) the level and per-layer neighbor index lists.
    pub fn write_snapshot<W: Write>(&self, w: &mut W, id_order: &[String]) -> Result<()> {
        let index_of: HashMap<&str, u32> = id_order
            .iter()
            .enumerate()
            .map(|(i, id)| (id.as_str(), i as u32))
            .collect();

        w.write_all(b"VSH1")?;
        w.write_all(&(self.params.m as u32).to_le_bytes())?;
        w.write_all(&(self.params.m_max0 as u32).to_le_bytes())?;
        w.write_all(&(self.params.ef_construction as u32).to_le_bytes())?;
        w.write_all(&self.params.seed.to_le_bytes())?;

        match &self.entry_point {
            Some(ep) => {
                let bytes = ep.as_bytes();
                w.write_all(&(bytes.len() as u32).to_le_bytes())?;
                w.write_all(bytes)?;
            }
            None => w.write_all(&0u32.to_le_bytes())?,
        }

        for id in id_order {
            let level = *self.levels.get(id).ok_or_else(|| {
                Error::IndexInconsistency(format!("id {id} missing from HNSW levels"))
            })?;
            w.write_all(&[level as u8])?;
            let layers = self.neighbors.get(id).ok_or_else(|| {
                Error::IndexInconsistency(format!("id {id} missing from HNSW neighbors"))
            })?;
            for layer_neighbors in layers.iter() {
                w.write_all(&(layer_neighbors.len() as u32).to_le_bytes())?;
                for n in layer_neighbors {
                    let idx = *index_of.get(n.as_str()).ok_or_else(|| {
                        Error::IndexInconsistency(format!("neighbor {n} not in id order"))
                    })?;
                    w.write_all(&idx.to_le_bytes())?;
                }
            }
        }
        Ok(())
    }

    /// Deserializes a graph previously written by [`write_snapshot`], given
    /// the same vectors and `id_order` used to build it. Returns
    /// `CorruptStore` on any structural inconsistency so the caller can fall
    /// back to a rebuild.
    pub fn read_snapshot<R: Read>(
        r: &mut R,
        id_order: &[String],
        vectors: &HashMap<String, Vec<f32>>,
    ) -> Result<Self> {
        let mut magic = [0u8; 4];
        r.read_exact(&mut magic)?;
        if &magic != b"VSH1" {
            return Err(Error::CorruptStore("bad index.bin magic".into()));
        }
        let m = read_u32(r)? as usize;
        let m_max0 = read_u32(r)? as usize;
        let ef_construction = read_u32(r)? as usize;
        let seed = read_u64(r)?;

        let ep_len = read_u32(r)? as usize;
        let entry_point = if ep_len == 0 {
            None
        } else {
            let mut buf = vec![0u8; ep_len];
            r.read_exact(&mut buf)?;
            Some(String::from_utf8(buf).map_err(|e| Error::CorruptStore(e.to_string()))?)
        };

        let mut levels = HashMap::new();
        let mut neighbors = HashMap::new();
        for id in id_order {
            let mut level_byte = [0u8; 1];
            r.read_exact(&mut level_byte)?;
            let level = level_byte[0] as usize;
            let mut layers = Vec::with_capacity(level + 1);
            for _ in 0..=level {
                let count = read_u32(r)? as usize;
                let mut layer_neighbors = Vec::with_capacity(count);
                for _ in 0..count {
                    let idx = read_u32(r)? as usize;
                    let neighbor_id = id_order.get(idx).ok_or_else(|| {
                        Error::CorruptStore("neighbor index out of range".into())
                    })?;
                    layer_neighbors.push(neighbor_id.clone());
                }
                layers.push(layer_neighbors);
            }
            levels.insert(id.clone(), level);
            neighbors.insert(id.clone(), layers);
        }

        if levels.len() != vectors.len() {
            return Err(Error::CorruptStore(
                "index.bin id count does not match vectors".into(),
            ));
        }

        let params = HnswParams {
            m,
            m_max0,
            ef_construction,
            ef_search: HnswParams::default().ef_search,
            ml: 1.0 / (m as f64).ln(),
            seed,
        };

        Ok(Self {
            params,
            rng: StdRng::seed_from_u64(seed),
            vectors: vectors.clone(),
            levels,
            neighbors,
            entry_point,
        })
    }
}

fn read_u32<R: Read>(r: &mut R) -> Result<u32> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

fn read_u64<R: Read>(r: &mut R) -> Result<u64> {
    let mut buf = [0u8; 8];
    r.read_exact(&mut buf)?;
    Ok(u64::from_le_bytes(buf))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> HnswParams {
        HnswParams::new(8, 42)
    }

    #[test]
    fn empty_index_search_is_empty() {
        let index = HnswIndex::new(params());
        assert!(index.search(&[1.0, 0.0], 5, 10).is_empty());
    }

    #[test]
    fn insert_and_find_self() {
        let mut index = HnswIndex::new(params());
        index.insert("a".into(), &[1.0, 0.0, 0.0]).unwrap();
        index.insert("b".into(), &[0.0, 1.0, 0.0]).unwrap();
        index.insert("c".into(), &[0.9, 0.1, 0.0]).unwrap();

        let results = index.search(&[1.0, 0.0, 0.0], 3, 50);
        assert_eq!(results[0].0, "a");
        assert!(results.iter().any(|(id, _)| id == "c"));
    }

    #[test]
    fn remove_erases_node_and_reassigns_entry_point() {
        let mut index = HnswIndex::new(params());
        for i in 0..20 {
            let v = vec![i as f32, (i * 2) as f32];
            index.insert(format!("id{i}"), &v).unwrap();
        }
        let ep = index.entry_point().unwrap().to_string();
        index.remove(&ep).unwrap();
        assert_ne!(index.entry_point(), Some(ep.as_str()));
        assert_eq!(index.len(), 19);

        // Invariant: entry point is at the (new) max level.
        let ep_level = index.levels[index.entry_point().unwrap()];
        assert!(index.levels.values().all(|&l| l <= ep_level));
    }

    #[test]
    fn neighbor_lists_never_exceed_m_max() {
        let mut index = HnswIndex::new(HnswParams::new(4, 7));
        for i in 0..200 {
            let v = vec![(i % 11) as f32, (i % 13) as f32, (i % 17) as f32];
            index.insert(format!("id{i}"), &v).unwrap();
        }
        for (id, layers) in &index.neighbors {
            let level = index.levels[id];
            for (layer, lst) in layers.iter().enumerate() {
                assert!(lst.len() <= index.params.m_max(layer));
                assert!(layer <= level);
            }
        }
    }

    #[test]
    fn edges_are_symmetric() {
        let mut index = HnswIndex::new(HnswParams::new(6, 3));
        for i in 0..50 {
            let v = vec![(i % 5) as f32, (i % 3) as f32];
            index.insert(format!("id{i}"), &v).unwrap();
        }
        for (id, layers) in &index.neighbors {
            for (layer, lst) in layers.iter().enumerate() {
                for n in lst {
                    let back = &index.neighbors[n][layer];
                    assert!(back.contains(id), "edge {id}->{n} at layer {layer} not symmetric");
                }
            }
        }
    }

    #[test]
    fn filtered_search_falls_back_when_predicate_too_selective() {
        let mut index = HnswIndex::new(HnswParams::new(8, 11));
        for i in 0..300 {
            let v = vec![(i % 23) as f32, (i % 29) as f32];
            index.insert(format!("id{i}"), &v).unwrap();
        }
        match index.filtered_search(&[1.0, 1.0], 5, 50, |id| id == "id3") {
            FilteredSearchResult::Ok(_) => panic!("expected insufficient matches"),
            FilteredSearchResult::Insufficient => {}
        }
    }

    #[test]
    fn snapshot_round_trip() {
        let mut index = HnswIndex::new(HnswParams::new(6, 99));
        for i in 0..30 {
            let v = vec![(i % 7) as f32, (i % 5) as f32];
            index.insert(format!("id{i}"), &v).unwrap();
        }
        let mut id_order = index.levels.keys().cloned().collect::<Vec<_>>();
        id_order.sort();

        let mut buf = Vec::new();
        index.write_snapshot(&mut buf, &id_order).unwrap();

        let loaded = HnswIndex::read_snapshot(&mut &buf[..], &id_order, &index.vectors).unwrap();
        assert_eq!(loaded.entry_point(), index.entry_point());
        assert_eq!(loaded.levels, index.levels);

        let q = vec![1.0, 2.0];
        assert_eq!(index.search(&q, 5, 50), loaded.search(&q, 5, 50));
    }

    #[test]
    fn deterministic_with_fixed_seed() {
        let mut a = HnswIndex::new(HnswParams::new(8, 123));
        let mut b = HnswIndex::new(HnswParams::new(8, 123));
        for i in 0..40 {
            let v = vec![(i % 9) as f32, (i % 4) as f32];
            a.insert(format!("id{i}"), &v).unwrap();
            b.insert(format!("id{i}"), &v).unwrap();
        }
        assert_eq!(a.levels, b.levels);
        assert_eq!(a.neighbors, b.neighbors);
    }
}
