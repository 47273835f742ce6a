//! Storage handle
//! Lazily opens the configured container once and shares it with every caller

use super::{Container, StorageEngine};
use crate::config::{TrackerConfig, TrackerConfigPatch};
use crate::error::Result;
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::OnceCell;

/// An open container together with the collection the tracker uses in it
#[derive(Clone)]
pub struct OpenContainer {
    pub container: Arc<dyn Container>,
    pub collection: String,
}

/// Outcome of the one-time open, success or failure
type OpenCell = Arc<OnceCell<Result<OpenContainer>>>;

struct HandleState {
    config: TrackerConfig,
    cell: OpenCell,
}

/// Memoized, reconfigurable access to the tracker's container
pub struct StorageHandle {
    engine: Arc<dyn StorageEngine>,
    state: RwLock<HandleState>,
}

impl StorageHandle {
    pub fn new(engine: Arc<dyn StorageEngine>, config: TrackerConfig) -> Self {
        Self {
            engine,
            state: RwLock::new(HandleState {
                config,
                cell: Arc::new(OnceCell::new()),
            }),
        }
    }

    /// Current effective configuration
    pub fn config(&self) -> TrackerConfig {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .config
            .clone()
    }

    /// Merge `patch` over the current configuration and drop the memoized
    /// container. The next `open` targets the new configuration; the previous
    /// container closes once in-flight operations release it.
    pub fn reconfigure(&self, patch: &TrackerConfigPatch) -> TrackerConfig {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        state.config.merge(patch);
        state.cell = Arc::new(OnceCell::new());

        tracing::info!(
            container = %state.config.container_name,
            version = state.config.container_version,
            collection = %state.config.collection_name,
            "Tracker reconfigured"
        );
        state.config.clone()
    }

    /// Open the container, or return the memoized result of an earlier open.
    /// A failed open is memoized too, until the next reconfiguration.
    pub async fn open(&self) -> Result<OpenContainer> {
        let (cell, config) = {
            let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
            (state.cell.clone(), state.config.clone())
        };

        let engine = self.engine.clone();
        cell.get_or_init(|| async move { open_container(engine.as_ref(), &config).await })
            .await
            .clone()
    }
}

async fn open_container(engine: &dyn StorageEngine, config: &TrackerConfig) -> Result<OpenContainer> {
    let collection = config.collection_name.clone();
    let upgrade = |container: &dyn Container, old_version: u32| -> Result<()> {
        if !container.has_collection(&collection)? {
            tracing::info!(
                container = container.name(),
                collection = %collection,
                old_version,
                "Creating collection"
            );
            container.create_collection(&collection)?;
        }
        Ok(())
    };

    let container = engine
        .open(&config.container_name, config.container_version, &upgrade)
        .await
        .map_err(|e| {
            tracing::warn!(container = %config.container_name, "Failed to open container: {}", e);
            e
        })?;

    tracing::debug!(
        container = container.name(),
        version = container.version(),
        "Container open"
    );
    Ok(OpenContainer {
        container,
        collection,
    })
}
