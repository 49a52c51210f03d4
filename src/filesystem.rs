//! File system adapters
//!
//! The pipeline never touches the OS directly. Sources and sinks go through
//! the asynchronous [`FileSystem`] trait, whose errors carry a POSIX-style
//! [`FsErrorCode`]. Two adapters are provided:
//!
//! - [`LocalFileSystem`]: the real file system, via `tokio::fs`.
//! - [`MemoryFileSystem`]: an in-memory tree for tests and previews.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Component, Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use glob::Pattern;

use crate::error::{Error, FsErrorCode, Result};

/// What [`FileSystem::access`] checks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    Exists,
    Read,
    Write,
}

/// The subset of file metadata the pipeline needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileStat {
    pub is_directory: bool,
}

/// Asynchronous file primitives.
#[async_trait]
pub trait FileSystem: Send + Sync {
    /// Read a file as UTF-8 text.
    async fn read(&self, path: &Path) -> Result<String>;

    /// Create or replace a file. The parent directory must exist.
    async fn write(&self, path: &Path, content: &str) -> Result<()>;

    async fn stat(&self, path: &Path) -> Result<FileStat>;

    /// Names of the direct children of a directory, sorted.
    async fn readdir(&self, path: &Path) -> Result<Vec<String>>;

    async fn access(&self, path: &Path, mode: AccessMode) -> Result<()>;

    /// Create one directory. The parent must exist.
    async fn mkdir(&self, path: &Path) -> Result<()>;
}

fn display(path: &Path) -> String {
    path.display().to_string()
}

/// The real file system.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFileSystem;

#[async_trait]
impl FileSystem for LocalFileSystem {
    async fn read(&self, path: &Path) -> Result<String> {
        tokio::fs::read_to_string(path)
            .await
            .map_err(|e| Error::fs("read", display(path), e))
    }

    async fn write(&self, path: &Path, content: &str) -> Result<()> {
        tokio::fs::write(path, content)
            .await
            .map_err(|e| Error::fs("write", display(path), e))
    }

    async fn stat(&self, path: &Path) -> Result<FileStat> {
        let meta = tokio::fs::metadata(path)
            .await
            .map_err(|e| Error::fs("stat", display(path), e))?;
        Ok(FileStat {
            is_directory: meta.is_dir(),
        })
    }

    async fn readdir(&self, path: &Path) -> Result<Vec<String>> {
        let mut dir = tokio::fs::read_dir(path)
            .await
            .map_err(|e| Error::fs("readdir", display(path), e))?;
        let mut names = Vec::new();
        while let Some(child) = dir
            .next_entry()
            .await
            .map_err(|e| Error::fs("readdir", display(path), e))?
        {
            names.push(child.file_name().to_string_lossy().into_owned());
        }
        names.sort();
        Ok(names)
    }

    async fn access(&self, path: &Path, mode: AccessMode) -> Result<()> {
        let meta = tokio::fs::metadata(path)
            .await
            .map_err(|e| Error::fs("access", display(path), e))?;
        match mode {
            AccessMode::Exists => Ok(()),
            AccessMode::Read if meta.is_dir() => tokio::fs::read_dir(path)
                .await
                .map(|_| ())
                .map_err(|e| Error::fs("access", display(path), e)),
            AccessMode::Read => tokio::fs::File::open(path)
                .await
                .map(|_| ())
                .map_err(|e| Error::fs("access", display(path), e)),
            AccessMode::Write if meta.permissions().readonly() => Err(Error::fs_code(
                "access",
                display(path),
                FsErrorCode::PermissionDenied,
            )),
            AccessMode::Write => Ok(()),
        }
    }

    async fn mkdir(&self, path: &Path) -> Result<()> {
        tokio::fs::create_dir(path)
            .await
            .map_err(|e| Error::fs("mkdir", display(path), e))
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    files: BTreeMap<PathBuf, String>,
    dirs: BTreeSet<PathBuf>,
    readonly: BTreeSet<PathBuf>,
}

impl MemoryState {
    fn is_dir(&self, key: &Path) -> bool {
        key.as_os_str().is_empty()
            || self.dirs.contains(key)
            || self.files.keys().any(|f| f.starts_with(key) && f != key)
            || self.dirs.iter().any(|d| d.starts_with(key) && d != key)
    }

    fn parent_exists(&self, key: &Path) -> bool {
        match key.parent() {
            Some(parent) => self.is_dir(parent),
            None => true,
        }
    }
}

/// In-memory file system. Paths are relative to a virtual root; leading `/`
/// and `.` components are ignored. Directories exist either explicitly
/// (via [`FileSystem::mkdir`]) or implicitly as ancestors of stored files.
#[derive(Debug, Default)]
pub struct MemoryFileSystem {
    state: Mutex<MemoryState>,
}

/// Normalize a path into a key of the in-memory tree.
fn key_of(path: &Path) -> PathBuf {
    let mut key = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => key.push(part),
            Component::ParentDir => {
                key.pop();
            }
            _ => {}
        }
    }
    key
}

impl MemoryFileSystem {
    /// Create a new empty filesystem
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, MemoryState>> {
        self.state.lock().map_err(|_| Error::poisoned("memory filesystem"))
    }

    /// Add or replace a file, creating its ancestors implicitly.
    pub fn add_file_string<P: AsRef<Path>>(&self, path: P, content: &str) -> Result<()> {
        self.lock()?
            .files
            .insert(key_of(path.as_ref()), content.to_string());
        Ok(())
    }

    /// Builder-style [`add_file_string`](Self::add_file_string).
    pub fn with_file<P: AsRef<Path>>(self, path: P, content: &str) -> Result<Self> {
        self.add_file_string(path, content)?;
        Ok(self)
    }

    /// Make writes to `path` fail with `EACCES`.
    pub fn set_readonly<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        self.lock()?.readonly.insert(key_of(path.as_ref()));
        Ok(())
    }

    /// Content of a file, if present.
    pub fn get<P: AsRef<Path>>(&self, path: P) -> Option<String> {
        let state = self.state.lock().ok()?;
        state.files.get(&key_of(path.as_ref())).cloned()
    }

    /// Check if a file exists
    pub fn exists<P: AsRef<Path>>(&self, path: P) -> bool {
        self.get(path).is_some()
    }

    /// List all files, sorted.
    pub fn list_files(&self) -> Vec<PathBuf> {
        self.state
            .lock()
            .map(|s| s.files.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// List files matching a glob pattern
    pub fn list_files_glob(&self, pattern: &str) -> Result<Vec<PathBuf>> {
        let pattern = Pattern::new(pattern).map_err(Error::Glob)?;
        Ok(self
            .list_files()
            .into_iter()
            .filter(|path| path.to_str().map(|p| pattern.matches(p)).unwrap_or(false))
            .collect())
    }

    /// Get the number of files
    pub fn len(&self) -> usize {
        self.state.lock().map(|s| s.files.len()).unwrap_or(0)
    }

    /// Check if filesystem is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl FileSystem for MemoryFileSystem {
    async fn read(&self, path: &Path) -> Result<String> {
        let key = key_of(path);
        let state = self.lock()?;
        if let Some(content) = state.files.get(&key) {
            return Ok(content.clone());
        }
        let code = if state.is_dir(&key) {
            FsErrorCode::IsADirectory
        } else {
            FsErrorCode::NotFound
        };
        Err(Error::fs_code("read", display(path), code))
    }

    async fn write(&self, path: &Path, content: &str) -> Result<()> {
        let key = key_of(path);
        let mut state = self.lock()?;
        if state.readonly.iter().any(|r| key.starts_with(r)) {
            return Err(Error::fs_code("write", display(path), FsErrorCode::PermissionDenied));
        }
        if !state.parent_exists(&key) {
            return Err(Error::fs_code("write", display(path), FsErrorCode::NotFound));
        }
        if !state.files.contains_key(&key) && state.is_dir(&key) {
            return Err(Error::fs_code("write", display(path), FsErrorCode::IsADirectory));
        }
        state.files.insert(key, content.to_string());
        Ok(())
    }

    async fn stat(&self, path: &Path) -> Result<FileStat> {
        let key = key_of(path);
        let state = self.lock()?;
        if state.files.contains_key(&key) {
            Ok(FileStat {
                is_directory: false,
            })
        } else if state.is_dir(&key) {
            Ok(FileStat { is_directory: true })
        } else {
            Err(Error::fs_code("stat", display(path), FsErrorCode::NotFound))
        }
    }

    async fn readdir(&self, path: &Path) -> Result<Vec<String>> {
        let key = key_of(path);
        let state = self.lock()?;
        if state.files.contains_key(&key) {
            return Err(Error::fs_code("readdir", display(path), FsErrorCode::NotADirectory));
        }
        if !state.is_dir(&key) {
            return Err(Error::fs_code("readdir", display(path), FsErrorCode::NotFound));
        }
        let children: BTreeSet<String> = state
            .files
            .keys()
            .chain(state.dirs.iter())
            .filter_map(|p| p.strip_prefix(&key).ok())
            .filter_map(|rest| rest.components().next())
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        Ok(children.into_iter().collect())
    }

    async fn access(&self, path: &Path, mode: AccessMode) -> Result<()> {
        let key = key_of(path);
        let state = self.lock()?;
        if !state.files.contains_key(&key) && !state.is_dir(&key) {
            return Err(Error::fs_code("access", display(path), FsErrorCode::NotFound));
        }
        if mode == AccessMode::Write && state.readonly.iter().any(|r| key.starts_with(r)) {
            return Err(Error::fs_code("access", display(path), FsErrorCode::PermissionDenied));
        }
        Ok(())
    }

    async fn mkdir(&self, path: &Path) -> Result<()> {
        let key = key_of(path);
        let mut state = self.lock()?;
        if state.files.contains_key(&key) || state.is_dir(&key) {
            return Err(Error::fs_code("mkdir", display(path), FsErrorCode::AlreadyExists));
        }
        if !state.parent_exists(&key) {
            return Err(Error::fs_code("mkdir", display(path), FsErrorCode::NotFound));
        }
        state.dirs.insert(key);
        Ok(())
    }
}
