//! Sinks
//!
//! A [`Sink`] commits rendered entries. Its lifecycle during an install is
//! `init`, then `write` once per surviving entry, then `done`. If the
//! install fails, [`Sink::error`] decides the outcome: returning the error
//! propagates it (the default), returning `Ok(())` swallows it.
//!
//! - [`MemorySink`]: collects contents keyed by destination.
//! - [`FileSink`]: writes under a root directory.
//! - [`DryRunSink`]: logs what would be written.

mod file;

pub use file::FileSink;

use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::entry::EntryRef;
use crate::error::{Error, Result};

/// Consumer of rendered entries.
#[async_trait]
pub trait Sink: Send + Sync {
    async fn init(&self) -> Result<()> {
        Ok(())
    }

    async fn write(&self, entry: EntryRef) -> Result<()>;

    async fn done(&self) -> Result<()> {
        Ok(())
    }

    /// Called once when an install fails.
    fn error(&self, err: Error) -> Result<()> {
        Err(err)
    }
}

/// Collects written contents in memory, keyed by `path/name`.
#[derive(Debug, Default)]
pub struct MemorySink {
    files: Mutex<BTreeMap<String, String>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything written so far.
    pub fn files(&self) -> BTreeMap<String, String> {
        self.files.lock().map(|f| f.clone()).unwrap_or_default()
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.files.lock().ok()?.get(key).cloned()
    }

    pub fn len(&self) -> usize {
        self.files.lock().map(|f| f.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl Sink for MemorySink {
    async fn write(&self, entry: EntryRef) -> Result<()> {
        let content = entry.content()?.unwrap_or_default();
        self.files
            .lock()
            .map_err(|_| Error::poisoned("memory sink"))?
            .insert(entry.key(), content);
        Ok(())
    }
}

/// Reads every entry's content but writes nothing. Each would-be write is
/// logged at info level and its key recorded.
#[derive(Debug, Default)]
pub struct DryRunSink {
    written: Mutex<Vec<String>>,
}

impl DryRunSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keys that would have been written, in write order.
    pub fn written(&self) -> Vec<String> {
        self.written.lock().map(|w| w.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Sink for DryRunSink {
    async fn write(&self, entry: EntryRef) -> Result<()> {
        let size = entry.content()?.map(|c| c.len()).unwrap_or(0);
        let key = entry.key();
        log::info!("Would write {} ({} bytes)", key, size);
        self.written
            .lock()
            .map_err(|_| Error::poisoned("dry-run sink"))?
            .push(key);
        Ok(())
    }

    async fn done(&self) -> Result<()> {
        log::info!("Dry run: {} file(s) not written", self.written().len());
        Ok(())
    }
}
