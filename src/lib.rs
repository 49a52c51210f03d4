//! # Schematics
//!
//! A file-scaffolding engine: given a tree of template files and a set of
//! named variables, it produces a transformed tree of output files
//! (rendered templates, renamed paths, merged duplicates) and commits them
//! to a destination. The `schematics` command-line tool is a thin layer
//! over this library.
//!
//! ## Quick Example
//!
//! ```
//! use std::sync::Arc;
//! use schematics::compiler::TemplateCompiler;
//! use schematics::context;
//! use schematics::entry::Entry;
//! use schematics::source::{MemoryMap, MemorySource, Source};
//! use futures::StreamExt;
//!
//! let source = MemorySource::new(MemoryMap::new().file("hello.txt", "hello <%= str %>"))
//!     .with_compiler(Arc::new(TemplateCompiler::default()));
//!
//! futures::executor::block_on(async {
//!     let entry = source.read().next().await.unwrap().unwrap();
//!     let rendered = entry.transform(context! { "str" => "world" }).await.unwrap().unwrap();
//!     assert_eq!(rendered.content().unwrap().as_deref(), Some("hello world"));
//! });
//! ```
//!
//! ## Core Concepts
//!
//! - **Entries (`entry`)**: one file-to-be. Wrappers move, transform,
//!   concatenate or JSON-merge entries without mutating them.
//! - **Compilers (`compiler`)**: turn a raw entry into a render function of
//!   a [`Context`](context::Context).
//! - **Sources (`source`)**: lazy entry streams from a directory tree or an
//!   in-memory map.
//! - **Operators (`operators`)**: stream transforms such as deduplication,
//!   duplicate merging, path remapping and template rendering.
//! - **Schematics (`schematic`)**: the install state machine with its six
//!   lifecycle hooks (`events`).
//! - **Sinks (`sink`)**: where rendered entries are committed.
//! - **Library (`library`)**: named registry of generators with
//!   constructor injection.
//! - **Collections (`collection`)**: `collection.json` manifests describing
//!   template directories.
//!
//! ## Execution Flow
//!
//! [`Library::install`](library::Library::install) creates the named
//! schematic, binds its context, and runs:
//!
//! 1.  `sink.init()` and `before_install`
//! 2.  `build()`, deduplicated by destination
//! 3.  per entry: transform, then write (each step wrapped in hooks)
//! 4.  `after_install` and `sink.done()`

pub mod collection;
pub mod compiler;
pub mod context;
pub mod defaults;
pub mod entry;
pub mod error;
pub mod events;
pub mod filesystem;
pub mod library;
pub mod merge;
pub mod operators;
pub mod path;
pub mod schematic;
pub mod sink;
pub mod source;
pub mod suggestions;
pub mod template;

#[doc(hidden)]
pub use inventory;

#[cfg(test)]
mod path_proptest;
