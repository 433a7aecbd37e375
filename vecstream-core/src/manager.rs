//! Directory-rooted registry of named [`Collection`]s.

use crate::collection::{Collection, CollectionStats};
use crate::error::{Error, Result};
use crate::hnsw::HnswParams;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

const MAX_NAME_LEN: usize = 64;

fn validate_name(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && name.len() <= MAX_NAME_LEN
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if valid {
        Ok(())
    } else {
        Err(Error::InvalidName(name.to_string()))
    }
}

/// Owns every [`Collection`] rooted at a directory. Create/list/delete on
/// the registry itself are guarded by a single exclusive lock; the
/// collections it hands out each guard their own state independently.
pub struct CollectionManager {
    root: PathBuf,
    collections: RwLock<BTreeMap<String, Arc<Collection>>>,
}

impl CollectionManager {
    /// Scans `root` for existing collection subdirectories and loads each
    /// one found (a directory is recognized as a collection if it has a
    /// valid name and a `config.json`).
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        let mut collections = BTreeMap::new();

        let mut entries: Vec<PathBuf> = std::fs::read_dir(&root)?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.is_dir())
            .collect();
        entries.sort();

        for path in entries {
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if validate_name(name).is_err() || !path.join("config.json").exists() {
                continue;
            }
            info!(collection = name, "discovered existing collection");
            let collection = Collection::open(&path, name)?;
            collections.insert(name.to_string(), Arc::new(collection));
        }

        Ok(Self {
            root,
            collections: RwLock::new(collections),
        })
    }

    pub fn create_collection(&self, name: &str, params: Option<HnswParams>) -> Result<Arc<Collection>> {
        validate_name(name)?;
        let mut g = self.collections.write();
        if g.contains_key(name) {
            return Err(Error::CollectionExists(name.to_string()));
        }
        let dir = self.root.join(name);
        let collection = Arc::new(Collection::create(dir, name, params.unwrap_or_default())?);
        g.insert(name.to_string(), collection.clone());
        Ok(collection)
    }

    pub fn get_collection(&self, name: &str) -> Result<Arc<Collection>> {
        self.collections
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| Error::NoSuchCollection(name.to_string()))
    }

    pub fn list_collections(&self) -> Vec<String> {
        self.collections.read().keys().cloned().collect()
    }

    pub fn delete_collection(&self, name: &str) -> Result<()> {
        let mut g = self.collections.write();
        if !g.contains_key(name) {
            return Err(Error::NoSuchCollection(name.to_string()));
        }
        let dir = self.root.join(name);
        g.remove(name);
        if dir.exists() {
            std::fs::remove_dir_all(&dir)?;
        }
        Ok(())
    }

    pub fn get_collection_stats(&self, name: &str) -> Result<CollectionStats> {
        Ok(self.get_collection(name)?.stats())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_list_delete_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let manager = CollectionManager::new(dir.path()).unwrap();

        manager.create_collection("docs", None).unwrap();
        manager.create_collection("images", None).unwrap();
        assert_eq!(manager.list_collections(), vec!["docs", "images"]);

        assert!(matches!(
            manager.create_collection("docs", None),
            Err(Error::CollectionExists(_))
        ));

        manager.delete_collection("docs").unwrap();
        assert_eq!(manager.list_collections(), vec!["images"]);
        assert!(matches!(
            manager.get_collection("docs"),
            Err(Error::NoSuchCollection(_))
        ));
    }

    #[test]
    fn invalid_names_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let manager = CollectionManager::new(dir.path()).unwrap();
        assert!(matches!(
            manager.create_collection("has spaces", None),
            Err(Error::InvalidName(_))
        ));
        assert!(matches!(
            manager.create_collection("", None),
            Err(Error::InvalidName(_))
        ));
    }

    #[test]
    fn rediscovers_collections_on_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let manager = CollectionManager::new(dir.path()).unwrap();
            let c = manager.create_collection("docs", None).unwrap();
            c.add_vector("a", vec![1.0, 2.0], None).unwrap();
            c.save().unwrap();
        }
        let manager = CollectionManager::new(dir.path()).unwrap();
        assert_eq!(manager.list_collections(), vec!["docs"]);
        let c = manager.get_collection("docs").unwrap();
        assert_eq!(c.stats().count, 1);
    }
}
