//! Trait contract tests for RemoteStore and PredictionCache.
//!
//! These tests verify the behavioral contracts of the storage traits
//! against the in-memory fakes and the filesystem backends. Any conforming
//! implementation must pass these.

use std::time::Duration;

use bindeval_state::fakes::{MemoryPredictionCache, MemoryRemoteStore};
use bindeval_state::storage_traits::*;
use bindeval_state::{DirRemoteStore, FsPredictionCache, StorageError};

// ===========================================================================
// RemoteStore contract tests
// ===========================================================================

fn seeded_memory_remote() -> MemoryRemoteStore {
    let store = MemoryRemoteStore::new();
    store.put_object("batches/2502_b/final_design_stats.csv", "Design\nd2\n");
    store.put_object("batches/2501_a/final_design_stats.csv", "Design\nd1\n");
    store.put_object("batches/2501_a/Accepted/d1.pdb", "END\n");
    store.put_object("batches/2501_a/Accepted/", "");
    store.put_object("other/2503_c/x.csv", "x");
    store
}

#[tokio::test]
async fn test_remote_list_is_sorted_and_scoped_to_prefix() {
    let store = seeded_memory_remote();
    let folders = store.list_folders("batches/").await.unwrap();

    assert_eq!(folders, vec!["2501_a", "2502_b"]);
    assert_eq!(store.list_calls(), 1);
}

#[tokio::test]
async fn test_remote_list_top_level() {
    let store = seeded_memory_remote();
    let folders = store.list_folders("").await.unwrap();

    assert_eq!(folders, vec!["batches", "other"]);
}

#[tokio::test]
async fn test_remote_fetch_writes_all_files_and_skips_markers() {
    let store = seeded_memory_remote();
    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("2501_a");
    let fetched = store.fetch_folder("batches", "2501_a", &dest).await.unwrap();

    assert_eq!(fetched.files, 2);
    assert!(dest.join("Accepted/d1.pdb").is_file());
    assert!(dest.join("final_design_stats.csv").is_file());
}

#[tokio::test]
async fn test_remote_fetch_failure_leaves_no_partial_copy() {
    let store = seeded_memory_remote();
    store.fail_fetch("2501_a");
    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("2501_a");

    assert!(store.fetch_folder("batches", "2501_a", &dest).await.is_err());
    assert!(!dest.exists());
}

#[tokio::test]
async fn test_remote_fetch_unknown_folder_is_not_found() {
    let store = seeded_memory_remote();
    let dir = tempfile::tempdir().unwrap();
    let err = store
        .fetch_folder("batches", "missing", &dir.path().join("m"))
        .await
        .unwrap_err();

    assert!(matches!(err, StorageError::FolderNotFound { .. }));
}

#[tokio::test]
async fn test_remote_move_folder_rekeys_under_archive() {
    let store = MemoryRemoteStore::new();
    store.put_object("2412_old/a.csv", "a");
    store.put_object("2412_old/Accepted/b.pdb", "b");
    store.put_object("2503_new/c.csv", "c");

    let moved = store.move_folder("2412_old", "archive").await.unwrap();

    assert_eq!(moved, 2);
    assert_eq!(
        store.keys(),
        vec![
            "2503_new/c.csv",
            "archive/2412_old/Accepted/b.pdb",
            "archive/2412_old/a.csv",
        ]
    );
}

#[tokio::test]
async fn test_dir_remote_matches_memory_listing() {
    let dir = tempfile::tempdir().unwrap();
    for folder in ["2502_b", "2501_a"] {
        let path = dir.path().join("batches").join(folder);
        std::fs::create_dir_all(&path).unwrap();
        std::fs::write(path.join("final_design_stats.csv"), "Design\n").unwrap();
    }
    let store = DirRemoteStore::new(dir.path());

    let folders = store.list_folders("batches/").await.unwrap();
    assert_eq!(folders, seeded_memory_remote().list_folders("batches/").await.unwrap());
}

#[tokio::test]
async fn test_dir_remote_missing_root_is_config_error() {
    let dir = tempfile::tempdir().unwrap();
    let store = DirRemoteStore::new(dir.path().join("nope"));
    let err = store.list_folders("").await.unwrap_err();

    assert!(matches!(err, StorageError::Config(_)));
}

// ===========================================================================
// PredictionCache contract tests
// ===========================================================================

async fn check_record_is_create_if_absent(cache: &dyn PredictionCache, archive: &std::path::Path) {
    assert!(cache.lookup("d1").await.unwrap().is_none());
    assert!(cache
        .record(&CacheEntry::new("d1", archive).with_digest("abc"))
        .await
        .unwrap());
    assert!(!cache
        .record(&CacheEntry::new("d1", "/elsewhere/d1.result.zip"))
        .await
        .unwrap());

    let entry = cache.lookup("d1").await.unwrap().unwrap();
    assert_eq!(entry.archive, archive);
    assert_eq!(entry.input_digest.as_deref(), Some("abc"));
}

async fn check_claims_are_exclusive(cache: &dyn PredictionCache) {
    assert_eq!(cache.claim("d2").await.unwrap(), ClaimOutcome::Acquired);
    assert_eq!(cache.claim("d2").await.unwrap(), ClaimOutcome::Held);
    assert_eq!(cache.claim("d3").await.unwrap(), ClaimOutcome::Acquired);
    cache.release("d2").await.unwrap();
    cache.release("d2").await.unwrap();
    assert_eq!(cache.claim("d2").await.unwrap(), ClaimOutcome::Acquired);
}

#[tokio::test]
async fn test_memory_cache_record_is_create_if_absent() {
    let cache = MemoryPredictionCache::new();
    check_record_is_create_if_absent(&cache, std::path::Path::new("/r/d1.result.zip")).await;
    assert_eq!(cache.len(), 1);
}

#[tokio::test]
async fn test_fs_cache_record_is_create_if_absent() {
    let dir = tempfile::tempdir().unwrap();
    let archive = dir.path().join("d1.result.zip");
    std::fs::write(&archive, b"PK").unwrap();
    let cache = FsPredictionCache::new(dir.path(), Duration::from_secs(600)).unwrap();
    check_record_is_create_if_absent(&cache, &archive).await;
}

#[tokio::test]
async fn test_memory_cache_claims_are_exclusive() {
    check_claims_are_exclusive(&MemoryPredictionCache::new()).await;
}

#[tokio::test]
async fn test_fs_cache_claims_are_exclusive() {
    let dir = tempfile::tempdir().unwrap();
    let cache = FsPredictionCache::new(dir.path(), Duration::from_secs(600)).unwrap();
    check_claims_are_exclusive(&cache).await;
}

#[tokio::test]
async fn test_fs_cache_claims_survive_a_second_handle() {
    let dir = tempfile::tempdir().unwrap();
    let a = FsPredictionCache::new(dir.path(), Duration::from_secs(600)).unwrap();
    let b = FsPredictionCache::new(dir.path(), Duration::from_secs(600)).unwrap();

    assert_eq!(a.claim("d9").await.unwrap(), ClaimOutcome::Acquired);
    assert_eq!(b.claim("d9").await.unwrap(), ClaimOutcome::Held);
}
