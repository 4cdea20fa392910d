//! bindeval-state: storage layer for the binder evaluation pipeline
//!
//! ## Layer 0 - Data/Persistence
//!
//! Focus: where work units come from and which prediction jobs have already
//! completed. Nothing in this crate knows about designs, scores or ledgers.
//!
//! ## Key Components
//!
//! - `RemoteStore`: folder listing, fetch and archival over a remote bucket
//!   (`DirRemoteStore`, `S3LikeRemoteStore`)
//! - `PredictionCache`: durable design → result-archive map with claims
//!   (`FsPredictionCache`)

mod dir_remote;
mod error;
pub mod fakes;
mod fs_cache;
mod s3_remote;
mod staging;
pub mod storage_traits;

pub use dir_remote::DirRemoteStore;
pub use error::StorageError;
pub use fs_cache::{check_design_id, find_archive, FsPredictionCache, ARCHIVE_SUFFIX};
pub use s3_remote::{RetryPolicy, S3LikeRemoteStore};
pub use storage_traits::{
    folder_key, listing_prefix, CacheEntry, ClaimOutcome, FetchedFolder, PredictionCache,
    RemoteStore, StorageResult,
};
