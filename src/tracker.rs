//! Read tracker
//! Records which paths have been read, and when, in the configured collection

use crate::codec;
use crate::config::{TrackerConfig, TrackerConfigPatch};
use crate::error::Result;
use crate::host::HostEnvironment;
use crate::storage::{KeyRange, StorageEngine, StorageHandle};
use crate::utils::current_timestamp_millis;
use futures::stream::BoxStream;
use futures::{StreamExt, TryFutureExt};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Weak};

/// A read path and the time (Unix ms) it was last marked as read
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadRecord {
    pub path: String,
    pub timestamp: u64,
}

impl ReadRecord {
    fn decode(key: &[u8], value: &[u8]) -> Result<Self> {
        Ok(Self {
            path: codec::decode_key(key)?,
            timestamp: codec::decode_timestamp(value)?,
        })
    }
}

/// Lazy, single-pass sequence of records in ascending path order
pub type RecordStream = BoxStream<'static, Result<ReadRecord>>;

struct TrackerInner {
    storage: StorageHandle,
    host: Arc<dyn HostEnvironment>,
}

/// Handle to a read tracker. Clones share the same storage handle.
#[derive(Clone)]
pub struct ReadTracker {
    inner: Arc<TrackerInner>,
}

/// Non-owning tracker reference for background listeners
#[derive(Clone)]
pub(crate) struct WeakReadTracker(Weak<TrackerInner>);

impl WeakReadTracker {
    pub(crate) fn upgrade(&self) -> Option<ReadTracker> {
        self.0.upgrade().map(|inner| ReadTracker { inner })
    }
}

impl ReadTracker {
    /// Create a tracker. Unset or empty config fields use the defaults.
    /// Storage is not touched until the first operation.
    pub fn new(
        engine: Arc<dyn StorageEngine>,
        host: Arc<dyn HostEnvironment>,
        config: TrackerConfigPatch,
    ) -> Self {
        Self {
            inner: Arc::new(TrackerInner {
                storage: StorageHandle::new(engine, TrackerConfig::from_patch(&config)),
                host,
            }),
        }
    }

    pub fn config(&self) -> TrackerConfig {
        self.inner.storage.config()
    }

    /// Merge `patch` over the current config. Existing records are not
    /// migrated; the next operation opens the newly configured container.
    pub fn set_config(&self, patch: TrackerConfigPatch) -> TrackerConfig {
        self.inner.storage.reconfigure(&patch)
    }

    pub(crate) fn host(&self) -> &Arc<dyn HostEnvironment> {
        &self.inner.host
    }

    pub(crate) fn downgrade(&self) -> WeakReadTracker {
        WeakReadTracker(Arc::downgrade(&self.inner))
    }

    fn resolve_path(&self, path: Option<&str>) -> String {
        match path {
            Some(path) if !path.is_empty() => path.to_string(),
            _ => self.inner.host.current_path(),
        }
    }

    /// When `path` (default: the current path) was last marked as read
    pub async fn is_read(&self, path: Option<&str>) -> Result<Option<u64>> {
        let path = self.resolve_path(path);
        let open = self.inner.storage.open().await?;

        let value = open
            .container
            .get(&open.collection, &codec::encode_key(&path))
            .await?;
        value.map(|v| codec::decode_timestamp(&v)).transpose()
    }

    /// Record `path` (default: the current path) as read now, replacing any
    /// earlier timestamp
    pub async fn mark_as_read(&self, path: Option<&str>) -> Result<()> {
        let path = self.resolve_path(path);
        let timestamp = current_timestamp_millis();
        let open = self.inner.storage.open().await?;

        open.container
            .put(
                &open.collection,
                &codec::encode_key(&path),
                codec::encode_timestamp(timestamp)?,
            )
            .await?;
        tracing::debug!(path = %path, timestamp, "Marked as read");
        Ok(())
    }

    /// Every record, in path order
    pub fn get_all(&self) -> RecordStream {
        self.scan(KeyRange::All)
    }

    /// Every record whose path starts with `prefix`, including `prefix` itself
    pub fn get_all_by_path(&self, prefix: &str) -> RecordStream {
        self.scan(codec::prefix_range(prefix).into())
    }

    /// Open a fresh cursor over `range`. Storage is opened on first poll.
    fn scan(&self, range: KeyRange) -> RecordStream {
        let tracker = self.clone();
        async move {
            let open = tracker.inner.storage.open().await?;
            open.container.cursor(&open.collection, range)
        }
        .try_flatten_stream()
        .map(|entry| entry.and_then(|(key, value)| ReadRecord::decode(&key, &value)))
        .boxed()
    }
}
