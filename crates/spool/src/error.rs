//! Storage error types.

use std::path::{Path, PathBuf};

/// Result alias for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("no space available: {required} bytes requested, directory limit is {limit} bytes")]
    NoSpaceAvailable { required: u64, limit: u64 },

    #[error("event of {size} bytes exceeds the write limit of {limit} bytes")]
    OversizedEvent { size: u64, limit: u64 },

    #[error("invalid storage configuration: {0}")]
    InvalidConfig(String),

    #[error("I/O error while {op} `{}`: {source}", path.display())]
    Io {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("storage actor has stopped")]
    ActorStopped,
}

impl StorageError {
    pub fn io(op: &'static str, path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            op,
            path: path.to_path_buf(),
            source,
        }
    }

    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Whether the error means the event was dropped rather than the storage failing.
    pub fn is_dropped_event(&self) -> bool {
        matches!(
            self,
            Self::NoSpaceAvailable { .. } | Self::OversizedEvent { .. }
        )
    }
}
