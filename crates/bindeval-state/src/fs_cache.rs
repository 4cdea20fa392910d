//! Filesystem prediction cache over the engine's results directory.

use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use chrono::Utc;
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::error::StorageError;
use crate::storage_traits::*;

/// Suffix the prediction engine gives its result archives.
pub const ARCHIVE_SUFFIX: &str = ".result.zip";

const INDEX_DIR: &str = ".cache";

/// Filesystem-backed prediction cache.
///
/// Layout:
/// - `<results>/**/<design>.result.zip`: archives written by the engine
/// - `<results>/.cache/entries/<design>.json`: index records (never overwritten)
/// - `<results>/.cache/claims/<design>.claim`: submission claims
///
/// An archive found by name without an index record still counts as a cache
/// hit; existence is the signal, not content.
pub struct FsPredictionCache {
    results_dir: PathBuf,
    entries_dir: PathBuf,
    claims_dir: PathBuf,
    stale_after: Duration,
}

impl FsPredictionCache {
    /// Create a cache over `results_dir`. Creates the index directories if needed.
    pub fn new(results_dir: impl AsRef<Path>, stale_after: Duration) -> Result<Self, StorageError> {
        let results_dir = results_dir.as_ref().to_path_buf();
        let entries_dir = results_dir.join(INDEX_DIR).join("entries");
        let claims_dir = results_dir.join(INDEX_DIR).join("claims");
        fs::create_dir_all(&entries_dir)?;
        fs::create_dir_all(&claims_dir)?;
        Ok(Self {
            results_dir,
            entries_dir,
            claims_dir,
            stale_after,
        })
    }

    pub fn results_dir(&self) -> &Path {
        &self.results_dir
    }

    fn entry_path(&self, design_id: &str) -> PathBuf {
        self.entries_dir.join(format!("{design_id}.json"))
    }

    fn claim_path(&self, design_id: &str) -> PathBuf {
        self.claims_dir.join(format!("{design_id}.claim"))
    }
}

fn read_entry(path: &Path) -> StorageResult<Option<CacheEntry>> {
    let raw = match fs::read(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    serde_json::from_slice(&raw)
        .map(Some)
        .map_err(|e| StorageError::CorruptEntry {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
}

fn lookup_blocking(
    entry_path: &Path,
    results_dir: &Path,
    design_id: &str,
) -> StorageResult<Option<CacheEntry>> {
    if let Some(entry) = read_entry(entry_path)? {
        if entry.archive.is_file() {
            return Ok(Some(entry));
        }
        warn!(design_id = %design_id, archive = %entry.archive.display(),
            "cache index points at a missing archive; searching results dir");
    }
    let found = find_archive(results_dir, design_id)?;
    Ok(found.map(|archive| CacheEntry::new(design_id, archive)))
}

fn try_create_claim(path: &Path) -> std::io::Result<()> {
    let mut file = fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)?;
    writeln!(file, "pid={} at={}", std::process::id(), Utc::now().to_rfc3339())?;
    Ok(())
}

fn claim_is_stale(path: &Path, stale_after: Duration) -> bool {
    fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .and_then(|t| SystemTime::now().duration_since(t).ok())
        .is_some_and(|age| age >= stale_after)
}

fn claim_blocking(path: &Path, stale_after: Duration) -> std::io::Result<ClaimOutcome> {
    match try_create_claim(path) {
        Ok(()) => return Ok(ClaimOutcome::Acquired),
        Err(e) if e.kind() == ErrorKind::AlreadyExists => {}
        Err(e) => return Err(e),
    }
    if !claim_is_stale(path, stale_after) {
        return Ok(ClaimOutcome::Held);
    }
    debug!(claim = %path.display(), "reclaiming stale submission claim");
    match fs::remove_file(path) {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => return Err(e),
    }
    // another process may win the race after the removal
    match try_create_claim(path) {
        Ok(()) => Ok(ClaimOutcome::Acquired),
        Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(ClaimOutcome::Held),
        Err(e) => Err(e),
    }
}

fn record_blocking(entries_dir: &Path, dest: &Path, body: &[u8]) -> std::io::Result<bool> {
    let mut tmp = NamedTempFile::new_in(entries_dir)?;
    tmp.write_all(body)?;
    match tmp.persist_noclobber(dest) {
        Ok(_) => Ok(true),
        Err(e) if e.error.kind() == ErrorKind::AlreadyExists => Ok(false),
        Err(e) => Err(e.error),
    }
}

/// Run filesystem work off the async executor.
async fn blocking<T, F>(f: F) -> StorageResult<T>
where
    F: FnOnce() -> StorageResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| StorageError::Io(std::io::Error::other(e)))?
}

/// Design ids become file names; reject anything that could escape a directory.
pub fn check_design_id(design_id: &str) -> Result<(), StorageError> {
    let bad = design_id.is_empty()
        || design_id == "."
        || design_id == ".."
        || design_id.contains(['/', '\\', '\0']);
    if bad {
        return Err(StorageError::InvalidDesignId(design_id.to_string()));
    }
    Ok(())
}

/// First `<design>.result.zip` below `root`, skipping the index directory.
/// Directory entries are visited in sorted order so the answer is stable.
pub fn find_archive(root: &Path, design_id: &str) -> std::io::Result<Option<PathBuf>> {
    let wanted = format!("{design_id}{ARCHIVE_SUFFIX}");
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        let mut entries = match fs::read_dir(&dir) {
            Ok(rd) => rd.collect::<std::io::Result<Vec<_>>>()?,
            Err(e) if e.kind() == ErrorKind::NotFound => continue,
            Err(e) => return Err(e),
        };
        entries.sort_by_key(|e| e.file_name());
        let mut subdirs = Vec::new();
        for entry in entries {
            let name = entry.file_name();
            let file_type = entry.file_type()?;
            if file_type.is_dir() {
                if name != INDEX_DIR {
                    subdirs.push(entry.path());
                }
            } else if name.to_string_lossy() == wanted {
                return Ok(Some(entry.path()));
            }
        }
        // reverse so the smallest name is popped first
        stack.extend(subdirs.into_iter().rev());
    }
    Ok(None)
}

#[async_trait]
impl PredictionCache for FsPredictionCache {
    async fn lookup(&self, design_id: &str) -> StorageResult<Option<CacheEntry>> {
        check_design_id(design_id)?;
        let entry_path = self.entry_path(design_id);
        let root = self.results_dir.clone();
        let id = design_id.to_string();
        blocking(move || lookup_blocking(&entry_path, &root, &id)).await
    }

    async fn claim(&self, design_id: &str) -> StorageResult<ClaimOutcome> {
        check_design_id(design_id)?;
        let path = self.claim_path(design_id);
        let stale_after = self.stale_after;
        blocking(move || Ok(claim_blocking(&path, stale_after)?)).await
    }

    async fn release(&self, design_id: &str) -> StorageResult<()> {
        check_design_id(design_id)?;
        let path = self.claim_path(design_id);
        blocking(move || match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        })
        .await
    }

    async fn record(&self, entry: &CacheEntry) -> StorageResult<bool> {
        check_design_id(&entry.design_id)?;
        let mut entry = entry.clone();
        entry.recorded_at.get_or_insert_with(Utc::now);
        let body = serde_json::to_vec_pretty(&entry)?;
        let entries_dir = self.entries_dir.clone();
        let dest = self.entry_path(&entry.design_id);
        blocking(move || Ok(record_blocking(&entries_dir, &dest, &body)?)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_cache() -> (tempfile::TempDir, FsPredictionCache) {
        let dir = tempfile::tempdir().unwrap();
        let cache = FsPredictionCache::new(dir.path(), Duration::from_secs(3600)).unwrap();
        (dir, cache)
    }

    fn touch_archive(dir: &Path, rel: &str) -> PathBuf {
        let path = dir.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, b"PK").unwrap();
        path
    }

    #[tokio::test]
    async fn test_lookup_miss_on_empty_results() {
        let (_dir, cache) = make_cache();
        assert!(cache.lookup("d1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_lookup_finds_archive_by_naming_convention() {
        let (dir, cache) = make_cache();
        let archive = touch_archive(dir.path(), "d1/nested/d1.result.zip");
        let entry = cache.lookup("d1").await.unwrap().unwrap();
        assert_eq!(entry.archive, archive);
        assert!(entry.input_digest.is_none());
    }

    #[tokio::test]
    async fn test_lookup_does_not_match_prefix_of_other_design() {
        let (dir, cache) = make_cache();
        touch_archive(dir.path(), "d10.result.zip");
        assert!(cache.lookup("d1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_record_never_overwrites() {
        let (dir, cache) = make_cache();
        let first = touch_archive(dir.path(), "a/d1.result.zip");
        let second = touch_archive(dir.path(), "b/d1.result.zip");

        assert!(cache
            .record(&CacheEntry::new("d1", &first).with_digest("aa"))
            .await
            .unwrap());
        assert!(!cache.record(&CacheEntry::new("d1", &second)).await.unwrap());

        let entry = cache.lookup("d1").await.unwrap().unwrap();
        assert_eq!(entry.archive, first);
        assert_eq!(entry.input_digest.as_deref(), Some("aa"));
        assert!(entry.recorded_at.is_some());
    }

    #[tokio::test]
    async fn test_index_with_missing_archive_falls_back_to_search() {
        let (dir, cache) = make_cache();
        let gone = dir.path().join("gone/d1.result.zip");
        cache.record(&CacheEntry::new("d1", &gone)).await.unwrap();
        assert!(cache.lookup("d1").await.unwrap().is_none());

        let moved = touch_archive(dir.path(), "moved/d1.result.zip");
        assert_eq!(cache.lookup("d1").await.unwrap().unwrap().archive, moved);
    }

    #[tokio::test]
    async fn test_claim_is_exclusive_until_released() {
        let (_dir, cache) = make_cache();
        assert_eq!(cache.claim("d1").await.unwrap(), ClaimOutcome::Acquired);
        assert_eq!(cache.claim("d1").await.unwrap(), ClaimOutcome::Held);
        cache.release("d1").await.unwrap();
        assert_eq!(cache.claim("d1").await.unwrap(), ClaimOutcome::Acquired);
    }

    #[tokio::test]
    async fn test_stale_claim_is_reclaimed() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FsPredictionCache::new(dir.path(), Duration::ZERO).unwrap();
        assert_eq!(cache.claim("d1").await.unwrap(), ClaimOutcome::Acquired);
        assert_eq!(cache.claim("d1").await.unwrap(), ClaimOutcome::Acquired);
    }

    #[tokio::test]
    async fn test_rejects_path_like_design_ids() {
        let (_dir, cache) = make_cache();
        assert!(matches!(
            cache.lookup("../etc").await,
            Err(StorageError::InvalidDesignId(_))
        ));
        assert!(cache.claim("").await.is_err());
    }
}
