//! In-memory source built from a nested map.

use std::fmt;
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use serde_json::Value;

use super::{EntryStream, Source};
use crate::compiler::{Compiler, IdentityCompiler};
use crate::entry::{CompilableEntry, EntryRef};
use crate::error::{Error, Result};
use crate::path;

type ComputeFn = dyn Fn(&str) -> String + Send + Sync;

/// One node of a [`MemoryMap`].
#[derive(Clone)]
pub enum MemoryNode {
    /// Literal file content.
    Content(String),
    /// Content computed at read time from the node's full key.
    Computed(Arc<ComputeFn>),
    /// A nested directory.
    Dir(MemoryMap),
}

impl fmt::Debug for MemoryNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MemoryNode::Content(c) => f.debug_tuple("Content").field(c).finish(),
            MemoryNode::Computed(_) => f.write_str("Computed(..)"),
            MemoryNode::Dir(m) => f.debug_tuple("Dir").field(m).finish(),
        }
    }
}

/// Ordered nested map of files. Keys may contain `/`, in which case the
/// part before the last slash is a sub-directory: `dir/file2` under `blue`
/// yields an entry at `blue/dir` named `file2`.
#[derive(Debug, Clone, Default)]
pub struct MemoryMap {
    nodes: Vec<(String, MemoryNode)>,
}

impl MemoryMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn file(mut self, key: impl Into<String>, content: impl Into<String>) -> Self {
        self.nodes.push((key.into(), MemoryNode::Content(content.into())));
        self
    }

    pub fn computed<F>(mut self, key: impl Into<String>, compute: F) -> Self
    where
        F: Fn(&str) -> String + Send + Sync + 'static,
    {
        self.nodes
            .push((key.into(), MemoryNode::Computed(Arc::new(compute))));
        self
    }

    pub fn dir(mut self, key: impl Into<String>, children: MemoryMap) -> Self {
        self.nodes.push((key.into(), MemoryNode::Dir(children)));
        self
    }

    /// Build a map from a JSON object whose leaves are strings.
    pub fn from_json(value: &Value) -> Result<Self> {
        let object = value.as_object().ok_or_else(|| Error::ConfigParse {
            message: format!("memory map must be an object, got {}", value),
            hint: None,
        })?;
        let mut map = MemoryMap::new();
        for (key, child) in object {
            map = match child {
                Value::String(content) => map.file(key.clone(), content.clone()),
                Value::Object(_) => map.dir(key.clone(), MemoryMap::from_json(child)?),
                other => {
                    return Err(Error::ConfigParse {
                        message: format!(
                            "memory map value for '{}' must be a string or object, got {}",
                            key, other
                        ),
                        hint: None,
                    })
                }
            };
        }
        Ok(map)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Flatten into `(dir, name, content)` leaves in depth-first order.
    fn leaves(&self, parent: &str, out: &mut Vec<(String, String, String)>) {
        for (key, node) in &self.nodes {
            let (sub, name) = path::split(key);
            let dir = if sub == path::ROOT {
                path::normalize(parent)
            } else {
                path::normalize(&path::join(parent, &sub))
            };
            match node {
                MemoryNode::Content(content) => out.push((dir, name, content.clone())),
                MemoryNode::Computed(compute) => {
                    let content = compute(&path::join(&dir, &name));
                    out.push((dir, name, content));
                }
                MemoryNode::Dir(children) => children.leaves(&path::join(&dir, &name), out),
            }
        }
    }
}

/// Reads a [`MemoryMap`]. Entries are compiled in map order.
#[derive(Clone)]
pub struct MemorySource {
    map: MemoryMap,
    compiler: Arc<dyn Compiler>,
}

impl MemorySource {
    /// A source whose entries render to their literal content.
    pub fn new(map: MemoryMap) -> Self {
        Self {
            map,
            compiler: Arc::new(IdentityCompiler),
        }
    }

    pub fn with_compiler(mut self, compiler: Arc<dyn Compiler>) -> Self {
        self.compiler = compiler;
        self
    }
}

impl Source for MemorySource {
    fn read(&self) -> EntryStream {
        let map = self.map.clone();
        let compiler = self.compiler.clone();
        stream::once(async move {
            let mut leaves = Vec::new();
            map.leaves(path::ROOT, &mut leaves);
            stream::iter(leaves)
        })
        .flatten()
        .then(move |(dir, name, content)| {
            let compiler = compiler.clone();
            async move {
                let entry = CompilableEntry::compile(&dir, name, Some(content), compiler).await?;
                Ok::<_, Error>(Arc::new(entry) as EntryRef)
            }
        })
        .scan(false, |failed, item: Result<EntryRef>| {
            if *failed {
                return futures::future::ready(None);
            }
            *failed = item.is_err();
            futures::future::ready(Some(item))
        })
        .boxed()
    }
}
