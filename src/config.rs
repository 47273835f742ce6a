//! Tracker configuration
//!
//! Supports:
//! - Built-in defaults
//! - Partial overrides (constructor and reconfiguration)
//! - TOML configuration file
//! - Environment variable overrides

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

pub const DEFAULT_CONTAINER_NAME: &str = "read-tracker";
pub const DEFAULT_CONTAINER_VERSION: u32 = 1;
pub const DEFAULT_COLLECTION_NAME: &str = "read_paths";

/// Which container and collection the tracker stores records in
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    pub container_name: String,
    pub container_version: u32,
    pub collection_name: String,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            container_name: DEFAULT_CONTAINER_NAME.to_string(),
            container_version: DEFAULT_CONTAINER_VERSION,
            collection_name: DEFAULT_COLLECTION_NAME.to_string(),
        }
    }
}

/// Partial configuration. Unset, empty or zero fields leave the base value alone.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackerConfigPatch {
    #[serde(default)]
    pub container_name: Option<String>,
    #[serde(default)]
    pub container_version: Option<u32>,
    #[serde(default)]
    pub collection_name: Option<String>,
}

impl TrackerConfigPatch {
    pub fn container_name(mut self, name: impl Into<String>) -> Self {
        self.container_name = Some(name.into());
        self
    }

    pub fn container_version(mut self, version: u32) -> Self {
        self.container_version = Some(version);
        self
    }

    pub fn collection_name(mut self, name: impl Into<String>) -> Self {
        self.collection_name = Some(name.into());
        self
    }
}

impl From<TrackerConfig> for TrackerConfigPatch {
    fn from(config: TrackerConfig) -> Self {
        Self {
            container_name: Some(config.container_name),
            container_version: Some(config.container_version),
            collection_name: Some(config.collection_name),
        }
    }
}

impl TrackerConfig {
    /// Build a config from defaults with the set fields of `patch` applied
    pub fn from_patch(patch: &TrackerConfigPatch) -> Self {
        let mut config = Self::default();
        config.merge(patch);
        config
    }

    /// Apply the set, non-empty fields of `patch` over this config
    pub fn merge(&mut self, patch: &TrackerConfigPatch) {
        if let Some(name) = patch.container_name.as_deref().filter(|s| !s.is_empty()) {
            self.container_name = name.to_string();
        }
        if let Some(version) = patch.container_version.filter(|v| *v > 0) {
            self.container_version = version;
        }
        if let Some(name) = patch.collection_name.as_deref().filter(|s| !s.is_empty()) {
            self.collection_name = name.to_string();
        }
    }

    /// Load config from a TOML file, falling back to defaults when the file is
    /// missing, then apply environment overrides
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let config = if path.exists() {
            let contents = fs::read_to_string(path)?;
            let config: TrackerConfig = toml::from_str(&contents)?;
            tracing::info!("Loaded tracker config from {:?}", path);
            config
        } else {
            tracing::debug!("No tracker config at {:?}, using defaults", path);
            Self::default()
        };

        Ok(apply_env_overrides(config))
    }
}

/// Environment variable overrides
/// READ_TRACKER_CONTAINER, READ_TRACKER_VERSION, READ_TRACKER_COLLECTION
pub fn apply_env_overrides(mut config: TrackerConfig) -> TrackerConfig {
    let patch = TrackerConfigPatch {
        container_name: std::env::var("READ_TRACKER_CONTAINER").ok(),
        container_version: std::env::var("READ_TRACKER_VERSION")
            .ok()
            .and_then(|v| match v.parse() {
                Ok(version) => Some(version),
                Err(e) => {
                    tracing::warn!("Ignoring READ_TRACKER_VERSION={}: {}", v, e);
                    None
                }
            }),
        collection_name: std::env::var("READ_TRACKER_COLLECTION").ok(),
    };
    config.merge(&patch);
    config
}
