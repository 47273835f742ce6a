//! Storage layer
//! The durable key-value capability the tracker consumes, two engines that
//! provide it, and the lazily-opened handle shared by the tracker

pub mod handle;
pub mod memory;
pub mod sled_engine;

pub use handle::StorageHandle;
pub use memory::MemoryEngine;
pub use sled_engine::SledEngine;

use crate::error::Result;
use async_trait::async_trait;
use futures::stream::BoxStream;
use std::ops::RangeInclusive;
use std::sync::Arc;

/// A raw `(key, value)` pair read from a collection
pub type Entry = (Vec<u8>, Vec<u8>);

/// Forward-only cursor over a collection, in ascending key order
pub type EntryStream = BoxStream<'static, Result<Entry>>;

/// Schema upgrade callback, invoked with the freshly opened container and the
/// version it was stored at (0 for a new container)
pub type UpgradeFn<'a> = &'a (dyn Fn(&dyn Container, u32) -> Result<()> + Send + Sync);

/// Key range a cursor is bounded to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyRange {
    All,
    Inclusive(RangeInclusive<Vec<u8>>),
}

impl From<RangeInclusive<Vec<u8>>> for KeyRange {
    fn from(range: RangeInclusive<Vec<u8>>) -> Self {
        KeyRange::Inclusive(range)
    }
}

/// An open, versioned container of named, ordered collections
#[async_trait]
pub trait Container: Send + Sync {
    /// Container name
    fn name(&self) -> &str;

    /// Version the container was opened at
    fn version(&self) -> u32;

    fn has_collection(&self, collection: &str) -> Result<bool>;

    /// Create a collection. Only meaningful during an upgrade.
    fn create_collection(&self, collection: &str) -> Result<()>;

    async fn get(&self, collection: &str, key: &[u8]) -> Result<Option<Vec<u8>>>;

    /// Store a value, overwriting any existing one
    async fn put(&self, collection: &str, key: &[u8], value: Vec<u8>) -> Result<()>;

    /// Open a read-only cursor bounded by `range`
    fn cursor(&self, collection: &str, range: KeyRange) -> Result<EntryStream>;
}

/// Opens named, versioned containers
#[async_trait]
pub trait StorageEngine: Send + Sync {
    /// Open (or create) a container.
    ///
    /// When the stored version is lower than `version`, `upgrade` runs before
    /// the new version is persisted. Opening below the stored version fails
    /// with `VersionConflict`.
    async fn open(
        &self,
        name: &str,
        version: u32,
        upgrade: UpgradeFn<'_>,
    ) -> Result<Arc<dyn Container>>;
}
