//! Sink writing to a directory tree.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt};

use super::Sink;
use crate::entry::EntryRef;
use crate::error::{FsErrorCode, Result};
use crate::filesystem::{AccessMode, FileSystem, LocalFileSystem};
use crate::path::ROOT;

/// Writes each entry to `root/path/name`, creating missing parent
/// directories. Entries with absolute paths are written where they point.
#[derive(Clone)]
pub struct FileSink {
    root: PathBuf,
    fs: Arc<dyn FileSystem>,
}

impl FileSink {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            fs: Arc::new(LocalFileSystem),
        }
    }

    pub fn with_fs(mut self, fs: Arc<dyn FileSystem>) -> Self {
        self.fs = fs;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn directory_of(&self, entry: &EntryRef) -> PathBuf {
        if entry.path() == ROOT {
            self.root.clone()
        } else {
            self.root.join(entry.path())
        }
    }
}

/// Ensure `dir` exists: a writable directory is accepted as is; a missing
/// one is created after its parent. A concurrent creation (`EEXIST`) is
/// not an error.
fn create_parent_directory(fs: Arc<dyn FileSystem>, dir: PathBuf) -> BoxFuture<'static, Result<()>> {
    async move {
        match fs.access(&dir, AccessMode::Write).await {
            Ok(()) => Ok(()),
            Err(err) if err.fs_code_of() == Some(FsErrorCode::NotFound) => {
                if let Some(parent) = dir.parent() {
                    if !parent.as_os_str().is_empty() {
                        create_parent_directory(fs.clone(), parent.to_path_buf()).await?;
                    }
                }
                match fs.mkdir(&dir).await {
                    Err(err) if err.fs_code_of() != Some(FsErrorCode::AlreadyExists) => Err(err),
                    _ => Ok(()),
                }
            }
            Err(err) => Err(err),
        }
    }
    .boxed()
}

#[async_trait]
impl Sink for FileSink {
    async fn write(&self, entry: EntryRef) -> Result<()> {
        let dir = self.directory_of(&entry);
        create_parent_directory(self.fs.clone(), dir.clone()).await?;
        let content = entry.content()?.unwrap_or_default();
        let target = dir.join(entry.name());
        log::debug!("Writing {}", target.display());
        self.fs.write(&target, &content).await
    }
}
