//! Remote store backed by a mounted or synced directory tree.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::error::StorageError;
use crate::staging::StagedDir;
use crate::storage_traits::*;

/// Treats `root` as the bucket: first-level directories below a prefix are
/// folders and files are objects.
#[derive(Debug, Clone)]
pub struct DirRemoteStore {
    root: PathBuf,
}

impl DirRemoteStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn folder_path(&self, prefix: &str, folder: &str) -> PathBuf {
        self.root.join(folder_key(prefix, folder).trim_end_matches('/'))
    }
}

/// All regular files below `dir`, as (relative slash path, absolute path), sorted.
fn walk_files(dir: &Path) -> std::io::Result<Vec<(String, PathBuf)>> {
    let mut out = Vec::new();
    let mut stack = vec![dir.to_path_buf()];
    while let Some(current) = stack.pop() {
        for entry in std::fs::read_dir(&current)? {
            let entry = entry?;
            let path = entry.path();
            let file_type = entry.file_type()?;
            if file_type.is_dir() {
                stack.push(path);
            } else if file_type.is_file() {
                if let Ok(rel) = path.strip_prefix(dir) {
                    let rel = rel
                        .components()
                        .map(|c| c.as_os_str().to_string_lossy())
                        .collect::<Vec<_>>()
                        .join("/");
                    out.push((rel, path));
                }
            }
        }
    }
    out.sort();
    Ok(out)
}

#[async_trait]
impl RemoteStore for DirRemoteStore {
    async fn list_folders(&self, prefix: &str) -> StorageResult<Vec<String>> {
        let base = self.root.join(listing_prefix(prefix));
        if !base.is_dir() {
            return Err(StorageError::Config(format!(
                "remote directory does not exist: {}",
                base.display()
            )));
        }
        let mut folders = Vec::new();
        let mut entries = tokio::fs::read_dir(&base).await?;
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_dir() {
                let name = entry.file_name().to_string_lossy().into_owned();
                if !name.starts_with('.') {
                    folders.push(name);
                }
            }
        }
        folders.sort();
        folders.dedup();
        Ok(folders)
    }

    async fn fetch_folder(
        &self,
        prefix: &str,
        folder: &str,
        dest: &Path,
    ) -> StorageResult<FetchedFolder> {
        let source = self.folder_path(prefix, folder);
        if !source.is_dir() {
            return Err(StorageError::FolderNotFound {
                folder: folder.to_string(),
            });
        }
        let files = walk_files(&source)?;
        let mut staged = StagedDir::new(dest)?;
        for (rel, path) in &files {
            let data = tokio::fs::read(path).await?;
            staged.write(rel, &data).await?;
        }
        let (path, files) = staged.commit()?;
        debug!(folder = %folder, files, "fetched folder from directory remote");
        Ok(FetchedFolder { path, files })
    }

    async fn move_folder(&self, folder: &str, archive_prefix: &str) -> StorageResult<usize> {
        let source = self.folder_path("", folder);
        if !source.is_dir() {
            return Err(StorageError::FolderNotFound {
                folder: folder.to_string(),
            });
        }
        let archive_root = self.root.join(archive_prefix.trim_matches('/'));
        let target = archive_root.join(folder);
        let files = walk_files(&source)?;
        tokio::fs::create_dir_all(&archive_root).await?;
        if target.exists() {
            warn!(folder = %folder, "archive target already exists; leaving folder in place");
            return Err(StorageError::Remote(format!(
                "archive target exists: {}",
                target.display()
            )));
        }
        tokio::fs::rename(&source, &target).await?;
        Ok(files.len())
    }
}
