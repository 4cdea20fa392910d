//! Error types for bindeval-state

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur in the remote-store and cache layer
#[derive(Error, Debug)]
pub enum StorageError {
    /// Local filesystem failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Remote store rejected or failed a request
    #[error("Remote request failed: {0}")]
    Remote(String),

    /// Remote store is misconfigured (endpoint, bucket, credentials)
    #[error("Remote store misconfigured: {0}")]
    Config(String),

    /// Folder does not exist on the remote
    #[error("Folder not found on remote: {folder}")]
    FolderNotFound { folder: String },

    /// Design id cannot be used as a cache key
    #[error("Invalid design id for cache key: {0:?}")]
    InvalidDesignId(String),

    /// Cache index record could not be decoded
    #[error("Corrupt cache entry at {}: {reason}", path.display())]
    CorruptEntry { path: PathBuf, reason: String },

    /// Serialization error
    #[error("Serialization failed: {0}")]
    Serialization(String),

    /// Remote listing response could not be parsed
    #[error("Malformed listing response: {0}")]
    Listing(String),
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}

impl From<reqwest::Error> for StorageError {
    fn from(err: reqwest::Error) -> Self {
        StorageError::Remote(err.to_string())
    }
}

impl From<quick_xml::DeError> for StorageError {
    fn from(err: quick_xml::DeError) -> Self {
        StorageError::Listing(err.to_string())
    }
}
