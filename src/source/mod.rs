//! Entry sources
//!
//! A [`Source`] turns some backing store into a lazy stream of entries.
//! Every call to [`Source::read`] starts a fresh traversal; nothing happens
//! until the stream is polled.
//!
//! - [`FileSource`]: a directory tree read through a
//!   [`FileSystem`](crate::filesystem::FileSystem). Sibling entries are read
//!   concurrently.
//! - [`MemorySource`]: a nested in-memory map, for programmatic fixtures.
//!
//! A traversal that fails yields the first error and then ends; results of
//! work still in flight at that point are discarded.

mod file;
mod memory;

pub use file::FileSource;
pub use memory::{MemoryMap, MemoryNode, MemorySource};

use futures::channel::mpsc::UnboundedReceiver;
use futures::future::{self, Future, FutureExt};
use futures::stream::{self, BoxStream, StreamExt};

use crate::entry::EntryRef;
use crate::error::Result;

/// A stream of entries that may fail part way.
pub type EntryStream = BoxStream<'static, Result<EntryRef>>;

/// Produces a lazy entry stream.
pub trait Source: Send + Sync {
    fn read(&self) -> EntryStream;
}

impl<S: Source + ?Sized> Source for std::sync::Arc<S> {
    fn read(&self) -> EntryStream {
        (**self).read()
    }
}

/// Merge a set of sources into one stream, in the order given.
pub fn chain(sources: Vec<Box<dyn Source>>) -> EntryStream {
    stream::iter(sources.into_iter().map(|s| s.read()))
        .flatten()
        .boxed()
}

/// A stream over an entry list, for tests and generators that build entries
/// directly.
pub fn from_entries(entries: Vec<EntryRef>) -> EntryStream {
    stream::iter(entries.into_iter().map(Ok)).boxed()
}

/// Run `worker` alongside the receiving end of its channel.
///
/// Entries arrive as the worker sends them. The worker's own error, if any,
/// is forwarded once, and the combined stream ends after the first error.
pub(crate) fn drive<F>(worker: F, rx: UnboundedReceiver<Result<EntryRef>>) -> EntryStream
where
    F: Future<Output = Result<()>> + Send + 'static,
{
    let failures = worker
        .into_stream()
        .filter_map(|outcome| future::ready(outcome.err().map(Err)));
    stream::select(rx, failures)
        .scan(false, |failed, item: Result<EntryRef>| {
            if *failed {
                return future::ready(None);
            }
            *failed = item.is_err();
            future::ready(Some(item))
        })
        .boxed()
}
