//! Error types for the tracker and its storage engines

/// Storage error types
///
/// Cloneable so a failed container open can be cached and handed to every
/// caller that shares the storage handle.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StorageError {
    #[error("Failed to open container '{container}': {reason}")]
    Open { container: String, reason: String },

    #[error("Container '{container}' is at version {stored}, cannot open at version {requested}")]
    VersionConflict {
        container: String,
        requested: u32,
        stored: u32,
    },

    #[error("Invalid container version: {0}")]
    InvalidVersion(u32),

    #[error("Collection not found: {0}")]
    MissingCollection(String),

    #[error("Collection name is reserved by the storage engine: {0}")]
    InvalidCollection(String),

    #[error("Storage operation '{op}' failed: {reason}")]
    Operation { op: &'static str, reason: String },

    #[error("Codec error: {0}")]
    Codec(String),
}

impl StorageError {
    pub(crate) fn operation(op: &'static str, err: impl std::fmt::Display) -> Self {
        StorageError::Operation {
            op,
            reason: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Codec(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, StorageError>;
