//! Directory-backed source.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::channel::mpsc::{self, UnboundedSender};
use futures::future::{self, BoxFuture, FutureExt};

use super::{drive, EntryStream, Source};
use crate::compiler::{default_compiler, Compiler};
use crate::entry::{CompilableEntry, EntryRef};
use crate::error::{Error, Result};
use crate::filesystem::{AccessMode, FileSystem, LocalFileSystem};

/// Reads a directory tree. Each file becomes a [`CompilableEntry`] whose
/// path is its directory relative to the root.
#[derive(Clone)]
pub struct FileSource {
    root: PathBuf,
    fs: Arc<dyn FileSystem>,
    compiler: Arc<dyn Compiler>,
}

impl FileSource {
    /// A source over `root` on the local file system, using the default
    /// compiler.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            fs: Arc::new(LocalFileSystem),
            compiler: default_compiler(),
        }
    }

    pub fn with_fs(mut self, fs: Arc<dyn FileSystem>) -> Self {
        self.fs = fs;
        self
    }

    pub fn with_compiler(mut self, compiler: Arc<dyn Compiler>) -> Self {
        self.compiler = compiler;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[derive(Clone)]
struct Walker {
    root: PathBuf,
    fs: Arc<dyn FileSystem>,
    compiler: Arc<dyn Compiler>,
    tx: UnboundedSender<Result<EntryRef>>,
}

impl Walker {
    async fn start(self) -> Result<()> {
        self.fs.access(&self.root, AccessMode::Read).await?;
        let stat = self.fs.stat(&self.root).await?;
        if !stat.is_directory {
            return Err(Error::SourceRootNotDirectory {
                path: self.root.display().to_string(),
            });
        }
        log::debug!("Reading source tree {}", self.root.display());
        self.visit_dir(PathBuf::new()).await
    }

    fn visit(self, relative: PathBuf) -> BoxFuture<'static, Result<()>> {
        async move {
            let full = self.root.join(&relative);
            if self.fs.stat(&full).await?.is_directory {
                self.visit_dir(relative).await
            } else {
                self.emit_file(relative).await
            }
        }
        .boxed()
    }

    async fn visit_dir(self, relative: PathBuf) -> Result<()> {
        let names = self.fs.readdir(&self.root.join(&relative)).await?;
        let children = names
            .into_iter()
            .map(|name| self.clone().visit(relative.join(name)));
        future::try_join_all(children).await.map(|_| ())
    }

    async fn emit_file(self, relative: PathBuf) -> Result<()> {
        let content = self.fs.read(&self.root.join(&relative)).await?;
        let dir = relative
            .parent()
            .map(|p| p.to_string_lossy().replace('\\', "/"))
            .unwrap_or_default();
        let name = relative
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let entry = CompilableEntry::compile(&dir, name, Some(content), self.compiler.clone()).await?;
        // A closed receiver means the consumer stopped reading.
        let _ = self.tx.unbounded_send(Ok(Arc::new(entry)));
        Ok(())
    }
}

impl Source for FileSource {
    fn read(&self) -> EntryStream {
        let (tx, rx) = mpsc::unbounded();
        let walker = Walker {
            root: self.root.clone(),
            fs: self.fs.clone(),
            compiler: self.compiler.clone(),
            tx,
        };
        drive(walker.start(), rx)
    }
}
