//! On-disk layout for a single collection directory:
//!
//! - `vectors.npy`  — magic `VSV1`, u32 N, u32 D, N*D little-endian f32.
//! - `ids.json`     — JSON array of N strings, row-aligned with `vectors.npy`.
//! - `metadata.json`— JSON object mapping id -> metadata document.
//! - `index.bin`    — optional HNSW graph snapshot (see `hnsw::write_snapshot`).
//! - `config.json`  — `{dimension, size, params, hnsw, created_at, version}`.
//!
//! Every file is written atomically: `{file}.tmp` is written, fsynced, then
//! renamed over the final path.

use crate::distance;
use crate::error::{Error, Result};
use crate::hnsw::{HnswIndex, HnswParams};
use crate::store::VectorStore;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::Path;

const FORMAT_VERSION: u32 = 1;
const VECTORS_MAGIC: &[u8; 4] = b"VSV1";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionConfig {
    pub dimension: usize,
    pub size: usize,
    pub params: HnswParams,
    pub hnsw: bool,
    pub created_at: u64,
    pub version: u32,
}

pub struct LoadedCollection {
    pub store: VectorStore,
    pub index: HnswIndex,
    pub params: HnswParams,
    pub created_at: u64,
}

fn atomic_write(path: &Path, bytes: &[u8]) -> Result<()> {
    let tmp_path = path.with_extension(match path.extension() {
        Some(ext) => format!("{}.tmp", ext.to_string_lossy()),
        None => "tmp".to_string(),
    });
    let mut f = fs::File::create(&tmp_path)?;
    f.write_all(bytes)?;
    f.sync_all()?;
    fs::rename(&tmp_path, path)?;
    Ok(())
}

fn encode_vectors_npy(ids: &[String], store: &VectorStore, dim: usize) -> Result<Vec<u8>> {
    let mut buf = Vec::with_capacity(12 + ids.len() * dim * 4);
    buf.extend_from_slice(VECTORS_MAGIC);
    buf.extend_from_slice(&(ids.len() as u32).to_le_bytes());
    buf.extend_from_slice(&(dim as u32).to_le_bytes());
    for id in ids {
        let (vector, _) = store.get(id)?;
        for x in &vector {
            buf.extend_from_slice(&x.to_le_bytes());
        }
    }
    Ok(buf)
}

fn decode_vectors_npy(bytes: &[u8]) -> Result<(usize, usize, Vec<Vec<f32>>)> {
    if bytes.len() < 12 || &bytes[0..4] != VECTORS_MAGIC {
        return Err(Error::CorruptStore("bad vectors.npy magic".into()));
    }
    let n = u32::from_le_bytes(bytes[4..8].try_into().unwrap()) as usize;
    let d = u32::from_le_bytes(bytes[8..12].try_into().unwrap()) as usize;
    let expected_len = 12 + n * d * 4;
    if bytes.len() != expected_len {
        return Err(Error::CorruptStore("vectors.npy length does not match header".into()));
    }
    let mut rows = Vec::with_capacity(n);
    let mut offset = 12;
    for _ in 0..n {
        let mut row = Vec::with_capacity(d);
        for _ in 0..d {
            let bytes4: [u8; 4] = bytes[offset..offset + 4].try_into().unwrap();
            row.push(f32::from_le_bytes(bytes4));
            offset += 4;
        }
        rows.push(row);
    }
    Ok((n, d, rows))
}

pub fn save(dir: &Path, store: &VectorStore, index: &HnswIndex, created_at: u64) -> Result<()> {
    fs::create_dir_all(dir)?;
    let ids = store.ids();
    let dim = store.dimension().unwrap_or(0);

    atomic_write(&dir.join("vectors.npy"), &encode_vectors_npy(&ids, store, dim)?)?;
    atomic_write(&dir.join("ids.json"), &serde_json::to_vec(&ids)?)?;

    let mut meta_map = serde_json::Map::new();
    for id in &ids {
        if let Some(m) = store.get_metadata(id) {
            meta_map.insert(id.clone(), m.clone());
        }
    }
    atomic_write(
        &dir.join("metadata.json"),
        &serde_json::to_vec(&Value::Object(meta_map))?,
    )?;

    let mut index_bytes = Vec::new();
    index.write_snapshot(&mut index_bytes, &ids)?;
    atomic_write(&dir.join("index.bin"), &index_bytes)?;

    let config = CollectionConfig {
        dimension: dim,
        size: ids.len(),
        params: index.params().clone(),
        hnsw: true,
        created_at,
        version: FORMAT_VERSION,
    };
    atomic_write(&dir.join("config.json"), &serde_json::to_vec_pretty(&config)?)?;

    Ok(())
}

pub fn load(dir: &Path) -> Result<LoadedCollection> {
    let config: CollectionConfig = serde_json::from_slice(&fs::read(dir.join("config.json"))?)?;
    let ids: Vec<String> = serde_json::from_slice(&fs::read(dir.join("ids.json"))?)?;
    let (n, d, rows) = decode_vectors_npy(&fs::read(dir.join("vectors.npy"))?)?;

    if n != ids.len() {
        return Err(Error::CorruptStore(
            "vectors.npy row count does not match ids.json".into(),
        ));
    }
    if config.dimension != 0 && d != config.dimension {
        return Err(Error::CorruptStore(
            "vectors.npy dimension does not match config.json".into(),
        ));
    }

    let metadata: Value = serde_json::from_slice(&fs::read(dir.join("metadata.json"))?)?;
    let metadata_map = metadata.as_object().cloned().unwrap_or_default();

    let mut store = if d == 0 {
        VectorStore::new()
    } else {
        VectorStore::with_dimension(d)
    };
    for (id, vector) in ids.iter().zip(rows) {
        let meta = metadata_map
            .get(id)
            .cloned()
            .unwrap_or_else(|| Value::Object(Default::default()));
        store.add(id, vector, meta)?;
    }

    let index_path = dir.join("index.bin");
    let index = if index_path.exists() {
        match try_load_index(&index_path, &ids, &store, &config.params) {
            Ok(idx) => idx,
            Err(e) => {
                tracing::warn!(error = %e, collection = %dir.display(), "index.bin inconsistent, rebuilding from vectors");
                rebuild_index(&config.params, &store, &ids)?
            }
        }
    } else {
        tracing::warn!(collection = %dir.display(), "index.bin absent, rebuilding from vectors");
        rebuild_index(&config.params, &store, &ids)?
    };

    Ok(LoadedCollection {
        store,
        index,
        params: config.params,
        created_at: config.created_at,
    })
}

fn try_load_index(
    path: &Path,
    ids: &[String],
    store: &VectorStore,
    params: &HnswParams,
) -> Result<HnswIndex> {
    let bytes = fs::read(path)?;
    let mut normalized_map = HashMap::with_capacity(ids.len());
    for id in ids {
        let (vector, _) = store.get(id)?;
        normalized_map.insert(id.clone(), distance::normalized(&vector));
    }
    let index = HnswIndex::read_snapshot(&mut &bytes[..], ids, &normalized_map)?;
    let loaded_params = index.params();
    if loaded_params.m != params.m
        || loaded_params.m_max0 != params.m_max0
        || loaded_params.ef_construction != params.ef_construction
        || loaded_params.seed != params.seed
    {
        return Err(Error::CorruptStore(
            "index.bin parameters do not match config.json".into(),
        ));
    }
    Ok(index.with_params(params.clone()))
}

fn rebuild_index(params: &HnswParams, store: &VectorStore, ids: &[String]) -> Result<HnswIndex> {
    let mut entries = Vec::with_capacity(ids.len());
    for id in ids {
        let (vector, _) = store.get(id)?;
        entries.push((id.clone(), vector));
    }
    HnswIndex::rebuild(params.clone(), entries)
}

pub fn now_unix_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
