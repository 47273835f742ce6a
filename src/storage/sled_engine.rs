//! Sled-based storage engine
//! One sled database per container, one sled tree per collection

use super::{Container, EntryStream, KeyRange, StorageEngine, UpgradeFn};
use crate::error::{Result, StorageError};
use async_trait::async_trait;
use sled::Db;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock, Weak};

/// Tree holding engine metadata, kept apart from every collection
const META_TREE: &str = "__read_tracker_meta";
const VERSION_KEY: &[u8] = b"version";
/// Prefix of the trees sled creates for itself
const SLED_RESERVED_PREFIX: &str = "__sled__";

/// Durable storage engine backed by sled
pub struct SledEngine {
    root: PathBuf,
    /// sled locks its directory, so concurrent opens of a container share one
    /// `Db`. Held weakly: the lock is released with the last open container.
    dbs: Mutex<HashMap<String, Weak<Db>>>,
}

impl SledEngine {
    /// Engine rooted at the default data directory
    pub fn new() -> anyhow::Result<Self> {
        Ok(Self::open_at(Self::default_root()?))
    }

    /// Engine storing containers under `root`
    pub fn open_at(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            dbs: Mutex::new(HashMap::new()),
        }
    }

    /// Get the default data directory (READ_TRACKER_DATA_DIR overrides it)
    pub fn default_root() -> anyhow::Result<PathBuf> {
        if let Ok(dir) = std::env::var("READ_TRACKER_DATA_DIR") {
            if !dir.is_empty() {
                return Ok(PathBuf::from(dir));
            }
        }

        let mut path =
            dirs::config_dir().ok_or_else(|| anyhow::anyhow!("No config directory found"))?;
        path.push("read-tracker");
        Ok(path)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn db(&self, name: &str) -> Result<Arc<Db>> {
        let open_err = |reason: String| StorageError::Open {
            container: name.to_string(),
            reason,
        };

        let mut dbs = self.dbs.lock().map_err(|e| open_err(e.to_string()))?;
        if let Some(db) = dbs.get(name).and_then(Weak::upgrade) {
            return Ok(db);
        }
        dbs.retain(|_, db| db.strong_count() > 0);

        std::fs::create_dir_all(&self.root).map_err(|e| open_err(e.to_string()))?;
        let db = sled::open(self.root.join(name)).map_err(|e| open_err(e.to_string()))?;
        let db = Arc::new(db);
        dbs.insert(name.to_string(), Arc::downgrade(&db));
        Ok(db)
    }
}

fn is_reserved(collection: &str) -> bool {
    collection == META_TREE || collection.starts_with(SLED_RESERVED_PREFIX)
}

fn stored_version(meta: &sled::Tree) -> Result<u32> {
    match meta
        .get(VERSION_KEY)
        .map_err(|e| StorageError::operation("open", e))?
    {
        Some(bytes) => {
            let raw: [u8; 4] = bytes[..].try_into().map_err(|_| {
                StorageError::Codec(format!("corrupt container version ({} bytes)", bytes.len()))
            })?;
            Ok(u32::from_be_bytes(raw))
        }
        None => Ok(0),
    }
}

#[async_trait]
impl StorageEngine for SledEngine {
    async fn open(
        &self,
        name: &str,
        version: u32,
        upgrade: UpgradeFn<'_>,
    ) -> Result<Arc<dyn Container>> {
        if version == 0 {
            return Err(StorageError::InvalidVersion(version));
        }

        let db = self.db(name)?;
        let meta = db
            .open_tree(META_TREE)
            .map_err(|e| StorageError::operation("open", e))?;
        let stored = stored_version(&meta)?;
        if version < stored {
            return Err(StorageError::VersionConflict {
                container: name.to_string(),
                requested: version,
                stored,
            });
        }

        let container = SledContainer {
            name: name.to_string(),
            version,
            db,
            trees: RwLock::new(HashMap::new()),
        };

        if version > stored {
            tracing::info!(
                container = name,
                from = stored,
                to = version,
                "Upgrading container"
            );
            upgrade(&container, stored)?;
            meta.insert(VERSION_KEY, &version.to_be_bytes()[..])
                .map_err(|e| StorageError::operation("upgrade", e))?;
            container
                .db
                .flush_async()
                .await
                .map_err(|e| StorageError::operation("upgrade", e))?;
        }

        Ok(Arc::new(container))
    }
}

/// An open sled container
pub struct SledContainer {
    name: String,
    version: u32,
    db: Arc<Db>,
    trees: RwLock<HashMap<String, sled::Tree>>,
}

impl SledContainer {
    /// Resolve a collection without implicitly creating it
    fn tree(&self, collection: &str) -> Result<sled::Tree> {
        if let Ok(trees) = self.trees.read() {
            if let Some(tree) = trees.get(collection) {
                return Ok(tree.clone());
            }
        }

        if is_reserved(collection) {
            return Err(StorageError::InvalidCollection(collection.to_string()));
        }
        if !self.has_collection(collection)? {
            return Err(StorageError::MissingCollection(collection.to_string()));
        }
        let tree = self
            .db
            .open_tree(collection)
            .map_err(|e| StorageError::operation("open_tree", e))?;
        if let Ok(mut trees) = self.trees.write() {
            trees.insert(collection.to_string(), tree.clone());
        }
        Ok(tree)
    }
}

#[async_trait]
impl Container for SledContainer {
    fn name(&self) -> &str {
        &self.name
    }

    fn version(&self) -> u32 {
        self.version
    }

    fn has_collection(&self, collection: &str) -> Result<bool> {
        if is_reserved(collection) {
            return Ok(false);
        }
        Ok(self
            .db
            .tree_names()
            .iter()
            .any(|name| &name[..] == collection.as_bytes()))
    }

    fn create_collection(&self, collection: &str) -> Result<()> {
        if is_reserved(collection) {
            return Err(StorageError::InvalidCollection(collection.to_string()));
        }
        self.db
            .open_tree(collection)
            .map_err(|e| StorageError::operation("create_collection", e))?;
        Ok(())
    }

    async fn get(&self, collection: &str, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let tree = self.tree(collection)?;
        let value = tree
            .get(key)
            .map_err(|e| StorageError::operation("get", e))?;
        Ok(value.map(|v| v.to_vec()))
    }

    async fn put(&self, collection: &str, key: &[u8], value: Vec<u8>) -> Result<()> {
        let tree = self.tree(collection)?;
        tree.insert(key, value)
            .map_err(|e| StorageError::operation("put", e))?;
        tree.flush_async()
            .await
            .map_err(|e| StorageError::operation("flush", e))?;
        Ok(())
    }

    fn cursor(&self, collection: &str, range: KeyRange) -> Result<EntryStream> {
        let tree = self.tree(collection)?;
        let iter = match range {
            KeyRange::All => tree.iter(),
            KeyRange::Inclusive(range) => {
                if range.start() > range.end() {
                    return Ok(Box::pin(futures::stream::empty()));
                }
                tree.range(range)
            }
        };

        let entries = iter.map(|entry| {
            entry
                .map(|(k, v)| (k.to_vec(), v.to_vec()))
                .map_err(|e| StorageError::operation("cursor", e))
        });
        Ok(Box::pin(futures::stream::iter(entries)))
    }
}
