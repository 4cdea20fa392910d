//! Staged directory writes shared by the remote-store backends.
//!
//! A fetch writes into a hidden sibling of the destination and renames it
//! into place on `commit`, so an existing non-empty destination always holds
//! a complete copy.

use std::io;
use std::path::{Component, Path, PathBuf};

use tempfile::TempDir;

pub(crate) struct StagedDir {
    staging: TempDir,
    dest: PathBuf,
    files: usize,
}

impl StagedDir {
    pub(crate) fn new(dest: &Path) -> io::Result<Self> {
        let parent = match dest.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&parent)?;
        let staging = tempfile::Builder::new()
            .prefix(".fetch-")
            .tempdir_in(&parent)?;
        Ok(Self {
            staging,
            dest: dest.to_path_buf(),
            files: 0,
        })
    }

    /// Write one file at `relative` (slash-separated object key suffix).
    pub(crate) async fn write(&mut self, relative: &str, bytes: &[u8]) -> io::Result<()> {
        let target = self.staging.path().join(safe_relative(relative)?);
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&target, bytes).await?;
        self.files += 1;
        Ok(())
    }

    /// Move the staged tree to its destination. An existing empty
    /// destination directory is replaced; a non-empty one is an error.
    pub(crate) fn commit(self) -> io::Result<(PathBuf, usize)> {
        if self.dest.is_dir() {
            std::fs::remove_dir(&self.dest)?;
        }
        let staged = self.staging.into_path();
        if let Err(e) = std::fs::rename(&staged, &self.dest) {
            let _ = std::fs::remove_dir_all(&staged);
            return Err(e);
        }
        Ok((self.dest, self.files))
    }
}

fn safe_relative(relative: &str) -> io::Result<PathBuf> {
    let path = Path::new(relative);
    let ok = path
        .components()
        .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
    if !ok || relative.is_empty() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("refusing to write outside staging dir: {relative}"),
        ));
    }
    Ok(path.to_path_buf())
}
