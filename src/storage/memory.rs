//! In-process storage engine
//! Ordered maps behind locks. Used for tests and for trackers that do not
//! need to outlive the process.

use super::{Container, Entry, EntryStream, KeyRange, StorageEngine, UpgradeFn};
use crate::error::{Result, StorageError};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};

type Records = Arc<RwLock<BTreeMap<Vec<u8>, Vec<u8>>>>;

/// Data shared by every connection to the same container
#[derive(Default)]
struct ContainerData {
    version: Mutex<u32>,
    collections: RwLock<HashMap<String, Records>>,
}

/// In-memory storage engine
#[derive(Default)]
pub struct MemoryEngine {
    containers: Mutex<HashMap<String, Arc<ContainerData>>>,
    unavailable: AtomicBool,
    opens: AtomicUsize,
}

impl MemoryEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent open fail, as if storage were unavailable
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Number of open attempts the engine has seen
    pub fn open_count(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StorageEngine for MemoryEngine {
    async fn open(
        &self,
        name: &str,
        version: u32,
        upgrade: UpgradeFn<'_>,
    ) -> Result<Arc<dyn Container>> {
        self.opens.fetch_add(1, Ordering::SeqCst);

        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StorageError::Open {
                container: name.to_string(),
                reason: "storage unavailable".to_string(),
            });
        }
        if version == 0 {
            return Err(StorageError::InvalidVersion(version));
        }

        let data = {
            let mut containers = self
                .containers
                .lock()
                .map_err(|e| StorageError::operation("open", e))?;
            containers.entry(name.to_string()).or_default().clone()
        };

        let connection = MemoryContainer {
            name: name.to_string(),
            version,
            data,
        };

        let mut stored = connection
            .data
            .version
            .lock()
            .map_err(|e| StorageError::operation("open", e))?;
        if version < *stored {
            return Err(StorageError::VersionConflict {
                container: name.to_string(),
                requested: version,
                stored: *stored,
            });
        }
        if version > *stored {
            upgrade(&connection, *stored)?;
            *stored = version;
        }
        drop(stored);

        Ok(Arc::new(connection))
    }
}

/// A connection to an in-memory container
pub struct MemoryContainer {
    name: String,
    version: u32,
    data: Arc<ContainerData>,
}

impl MemoryContainer {
    fn records(&self, collection: &str) -> Result<Records> {
        let collections = self
            .data
            .collections
            .read()
            .map_err(|e| StorageError::operation("collection", e))?;
        collections
            .get(collection)
            .cloned()
            .ok_or_else(|| StorageError::MissingCollection(collection.to_string()))
    }
}

#[async_trait]
impl Container for MemoryContainer {
    fn name(&self) -> &str {
        &self.name
    }

    fn version(&self) -> u32 {
        self.version
    }

    fn has_collection(&self, collection: &str) -> Result<bool> {
        let collections = self
            .data
            .collections
            .read()
            .map_err(|e| StorageError::operation("has_collection", e))?;
        Ok(collections.contains_key(collection))
    }

    fn create_collection(&self, collection: &str) -> Result<()> {
        let mut collections = self
            .data
            .collections
            .write()
            .map_err(|e| StorageError::operation("create_collection", e))?;
        collections.entry(collection.to_string()).or_default();
        Ok(())
    }

    async fn get(&self, collection: &str, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let records = self.records(collection)?;
        let records = records
            .read()
            .map_err(|e| StorageError::operation("get", e))?;
        Ok(records.get(key).cloned())
    }

    async fn put(&self, collection: &str, key: &[u8], value: Vec<u8>) -> Result<()> {
        let records = self.records(collection)?;
        let mut records = records
            .write()
            .map_err(|e| StorageError::operation("put", e))?;
        records.insert(key.to_vec(), value);
        Ok(())
    }

    fn cursor(&self, collection: &str, range: KeyRange) -> Result<EntryStream> {
        let cursor = MemoryCursor {
            records: self.records(collection)?,
            range,
            last: None,
            done: false,
        };

        Ok(Box::pin(futures::stream::unfold(cursor, |mut cursor| async move {
            if cursor.done {
                return None;
            }
            match cursor.advance() {
                Ok(Some(entry)) => Some((Ok(entry), cursor)),
                Ok(None) => None,
                Err(e) => {
                    // Stop after reporting the failure
                    cursor.done = true;
                    Some((Err(e), cursor))
                }
            }
        })))
    }
}

/// Cursor that re-seeks past the last yielded key on every advance, so it
/// holds no lock between pulls and sees writes made after it was opened
struct MemoryCursor {
    records: Records,
    range: KeyRange,
    last: Option<Vec<u8>>,
    done: bool,
}

impl MemoryCursor {
    fn advance(&mut self) -> Result<Option<Entry>> {
        let (start, end) = match &self.range {
            KeyRange::All => (Bound::Unbounded, Bound::Unbounded),
            KeyRange::Inclusive(range) => {
                if range.start() > range.end() {
                    return Ok(None);
                }
                (
                    Bound::Included(range.start().clone()),
                    Bound::Included(range.end().clone()),
                )
            }
        };
        let start = match self.last.clone() {
            Some(last) => Bound::Excluded(last),
            None => start,
        };

        let records = self
            .records
            .read()
            .map_err(|e| StorageError::operation("cursor", e))?;
        let next = records
            .range::<Vec<u8>, _>((start, end))
            .next()
            .map(|(k, v)| (k.clone(), v.clone()));
        drop(records);

        if let Some((key, _)) = &next {
            self.last = Some(key.clone());
        }
        Ok(next)
    }
}
