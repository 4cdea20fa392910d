//! Storage trait definitions for bindeval
//!
//! These traits define the two storage seams of the evaluation pipeline:
//! - `RemoteStore`: where upstream design batches (work units) live
//! - `PredictionCache`: durable record of completed prediction jobs
//!
//! All traits are async and backend-agnostic. In-memory fakes are provided
//! for testing via the `fakes` module.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StorageError;

/// Result type for storage operations
pub type StorageResult<T> = std::result::Result<T, StorageError>;

// ---------------------------------------------------------------------------
// RemoteStore: upstream batch storage
// ---------------------------------------------------------------------------

/// Summary of a completed folder fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedFolder {
    /// Local directory now holding the folder's files.
    pub path: PathBuf,
    /// Number of files written.
    pub files: usize,
}

/// Remote object store holding one folder per work unit.
///
/// Guarantees:
/// - `list_folders` returns folder names sorted and de-duplicated.
/// - `fetch_folder` only exposes `dest` once every file has been written;
///   a partially failed fetch leaves `dest` absent.
/// - `move_folder` is best-effort per object: objects that fail to move are
///   logged and left in place.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// List first-level folder names below `prefix` (e.g. `"batches/"`).
    async fn list_folders(&self, prefix: &str) -> StorageResult<Vec<String>>;

    /// Download every object below `prefix/folder/` into `dest`.
    async fn fetch_folder(
        &self,
        prefix: &str,
        folder: &str,
        dest: &Path,
    ) -> StorageResult<FetchedFolder>;

    /// Move top-level `folder` below `archive_prefix/`. Returns objects moved.
    async fn move_folder(&self, folder: &str, archive_prefix: &str) -> StorageResult<usize>;
}

/// Normalise a listing prefix to `""` or `"name/"`.
pub fn listing_prefix(prefix: &str) -> String {
    let prefix = prefix.trim_matches('/');
    if prefix.is_empty() {
        String::new()
    } else {
        format!("{prefix}/")
    }
}

/// Join a listing prefix and a folder name into an object key prefix.
pub fn folder_key(prefix: &str, folder: &str) -> String {
    format!("{}{folder}/", listing_prefix(prefix))
}

// ---------------------------------------------------------------------------
// PredictionCache: completed prediction jobs
// ---------------------------------------------------------------------------

/// Durable record that a design's prediction job has completed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub design_id: String,
    /// Location of the engine's result archive.
    pub archive: PathBuf,
    /// SHA-256 hex digest of the job input that produced the archive.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_digest: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recorded_at: Option<DateTime<Utc>>,
}

impl CacheEntry {
    pub fn new(design_id: impl Into<String>, archive: impl Into<PathBuf>) -> Self {
        Self {
            design_id: design_id.into(),
            archive: archive.into(),
            input_digest: None,
            recorded_at: None,
        }
    }

    pub fn with_digest(mut self, digest: impl Into<String>) -> Self {
        self.input_digest = Some(digest.into());
        self
    }
}

/// Result of trying to claim a design for submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimOutcome {
    /// This caller owns the submission and must `release` when done.
    Acquired,
    /// Another submitter holds a live claim on the design.
    Held,
}

/// Durable prediction cache keyed by design id.
///
/// Guarantees:
/// - `lookup` returns `Some` only when the archive is present.
/// - `record` never overwrites: a second record for the same design returns
///   `Ok(false)` and leaves the first entry intact.
/// - `claim` is an atomic create-if-absent; at most one caller holds a live
///   claim for a design at a time.
#[async_trait]
pub trait PredictionCache: Send + Sync {
    /// Look up a completed job for `design_id`.
    async fn lookup(&self, design_id: &str) -> StorageResult<Option<CacheEntry>>;

    /// Claim `design_id` for submission.
    async fn claim(&self, design_id: &str) -> StorageResult<ClaimOutcome>;

    /// Drop a claim taken with `claim`. Releasing an unclaimed id is a no-op.
    async fn release(&self, design_id: &str) -> StorageResult<()>;

    /// Record a completed job. Returns `false` if an entry already existed.
    async fn record(&self, entry: &CacheEntry) -> StorageResult<bool>;
}
