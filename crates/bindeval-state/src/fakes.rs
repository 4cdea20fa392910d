//! In-memory fakes for storage traits (testing only)
//!
//! Provides `MemoryRemoteStore` and `MemoryPredictionCache` that satisfy the
//! trait contracts without network access or a results directory.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;

use crate::error::StorageError;
use crate::staging::StagedDir;
use crate::storage_traits::*;

// ---------------------------------------------------------------------------
// MemoryRemoteStore
// ---------------------------------------------------------------------------

/// In-memory object store backed by a `BTreeMap<key, bytes>`.
///
/// Counts `list_folders` and `fetch_folder` calls so tests can assert that a
/// run performed no remote traffic.
#[derive(Debug, Default)]
pub struct MemoryRemoteStore {
    objects: Mutex<BTreeMap<String, Vec<u8>>>,
    list_calls: AtomicUsize,
    fetch_calls: AtomicUsize,
    failing: Mutex<HashSet<String>>,
}

impl MemoryRemoteStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an object under `key` (e.g. `"batches/2501_a/Accepted/d1.pdb"`).
    pub fn put_object(&self, key: impl Into<String>, data: impl Into<Vec<u8>>) {
        self.objects.lock().unwrap().insert(key.into(), data.into());
    }

    /// Make every fetch of `folder` fail with a remote error.
    pub fn fail_fetch(&self, folder: impl Into<String>) {
        self.failing.lock().unwrap().insert(folder.into());
    }

    pub fn keys(&self) -> Vec<String> {
        self.objects.lock().unwrap().keys().cloned().collect()
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn fetch_calls(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RemoteStore for MemoryRemoteStore {
    async fn list_folders(&self, prefix: &str) -> StorageResult<Vec<String>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        let base = listing_prefix(prefix);
        let objects = self.objects.lock().unwrap();
        let folders: BTreeSet<String> = objects
            .keys()
            .filter_map(|key| key.strip_prefix(base.as_str()))
            .filter_map(|rest| rest.split_once('/'))
            .map(|(folder, _)| folder.to_string())
            .filter(|folder| !folder.is_empty())
            .collect();
        Ok(folders.into_iter().collect())
    }

    async fn fetch_folder(
        &self,
        prefix: &str,
        folder: &str,
        dest: &Path,
    ) -> StorageResult<FetchedFolder> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.lock().unwrap().contains(folder) {
            return Err(StorageError::Remote(format!("injected failure for {folder}")));
        }

        let key_prefix = folder_key(prefix, folder);
        let files: Vec<(String, Vec<u8>)> = {
            let objects = self.objects.lock().unwrap();
            objects
                .iter()
                .filter_map(|(k, v)| {
                    k.strip_prefix(&key_prefix)
                        .filter(|rel| !rel.is_empty() && !rel.ends_with('/'))
                        .map(|rel| (rel.to_string(), v.clone()))
                })
                .collect()
        };
        if files.is_empty() {
            return Err(StorageError::FolderNotFound {
                folder: folder.to_string(),
            });
        }

        let mut staged = StagedDir::new(dest)?;
        for (rel, data) in &files {
            staged.write(rel, data).await?;
        }
        let (path, files) = staged.commit()?;
        Ok(FetchedFolder { path, files })
    }

    async fn move_folder(&self, folder: &str, archive_prefix: &str) -> StorageResult<usize> {
        let source = folder_key("", folder);
        let mut objects = self.objects.lock().unwrap();
        let keys: Vec<String> = objects
            .keys()
            .filter(|k| k.starts_with(&source))
            .cloned()
            .collect();
        for key in &keys {
            if let Some(data) = objects.remove(key) {
                objects.insert(format!("{}/{key}", archive_prefix.trim_matches('/')), data);
            }
        }
        Ok(keys.len())
    }
}

// ---------------------------------------------------------------------------
// MemoryPredictionCache
// ---------------------------------------------------------------------------

/// In-memory prediction cache. Archives are assumed present.
#[derive(Debug, Default)]
pub struct MemoryPredictionCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
    claims: Mutex<HashSet<String>>,
}

impl MemoryPredictionCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl PredictionCache for MemoryPredictionCache {
    async fn lookup(&self, design_id: &str) -> StorageResult<Option<CacheEntry>> {
        Ok(self.entries.lock().unwrap().get(design_id).cloned())
    }

    async fn claim(&self, design_id: &str) -> StorageResult<ClaimOutcome> {
        let mut claims = self.claims.lock().unwrap();
        if claims.insert(design_id.to_string()) {
            Ok(ClaimOutcome::Acquired)
        } else {
            Ok(ClaimOutcome::Held)
        }
    }

    async fn release(&self, design_id: &str) -> StorageResult<()> {
        self.claims.lock().unwrap().remove(design_id);
        Ok(())
    }

    async fn record(&self, entry: &CacheEntry) -> StorageResult<bool> {
        let mut entries = self.entries.lock().unwrap();
        if entries.contains_key(&entry.design_id) {
            return Ok(false);
        }
        let mut entry = entry.clone();
        entry.recorded_at.get_or_insert_with(Utc::now);
        entries.insert(entry.design_id.clone(), entry);
        Ok(true)
    }
}
