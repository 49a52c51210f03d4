//! # Entries
//!
//! An [`Entry`] is one file-to-be: a destination directory, a file name and
//! content. Entries are immutable. [`Entry::transform`] renders an entry
//! against a [`Context`] and returns a *new* entry (or `None` when the entry
//! should be dropped), leaving the receiver untouched.
//!
//! Wrapper types compose entries into a small expression tree that is only
//! evaluated when transformed:
//!
//! - [`StaticEntry`]: literal path, name and content.
//! - [`CompilableEntry`]: a template compiled eagerly by a
//!   [`Compiler`](crate::compiler::Compiler), rendered lazily.
//! - [`MoveEntry`]: overrides the destination of a parent entry.
//! - [`TransformEntry`]: applies a function after the parent is rendered.
//! - [`ConcatEntry`]: concatenates two entries with the same destination.
//! - [`MergeJsonEntry`]: deep-merges two JSON entries with the same destination.
//!
//! The pair `(path, name)` is the entry's identity; [`Entry::key`] joins it
//! into a single destination key.

use std::fmt;
use std::sync::Arc;

use futures::future::{self, BoxFuture, FutureExt};

use crate::compiler::{Compiler, RenderFn};
use crate::context::Context;
use crate::error::{Error, Result};
use crate::merge::merge_json_documents;
use crate::path;

/// Shared handle to an entry.
pub type EntryRef = Arc<dyn Entry>;

/// The deferred result of rendering an entry. `None` means the entry was
/// intentionally dropped.
pub type TransformFuture = BoxFuture<'static, Result<Option<EntryRef>>>;

/// A synchronous post-render transformer used by [`TransformEntry`].
pub type TransformerFn = Arc<dyn Fn(EntryRef, &Context) -> Result<EntryRef> + Send + Sync>;

/// A file-to-be.
pub trait Entry: fmt::Debug + Send + Sync {
    /// Base file name.
    fn name(&self) -> &str;

    /// Destination directory, normalized; `/` is the template root.
    fn path(&self) -> &str;

    /// The current content. For template-backed entries this is the raw
    /// template until the entry is transformed.
    fn content(&self) -> Result<Option<String>>;

    /// Render this entry against `ctx`.
    fn transform(self: Arc<Self>, ctx: Context) -> TransformFuture;

    /// The destination key, `path/name` (or just `name` at the root).
    fn key(&self) -> String {
        path::join(self.path(), self.name())
    }
}

/// Whether two entries share a destination.
pub fn same_identity(a: &dyn Entry, b: &dyn Entry) -> bool {
    a.path() == b.path() && a.name() == b.name()
}

fn ensure_same_identity(a: &dyn Entry, b: &dyn Entry) -> Result<()> {
    if same_identity(a, b) {
        Ok(())
    } else {
        Err(Error::IdentityConflict {
            left: a.key(),
            right: b.key(),
        })
    }
}

fn done(entry: Option<EntryRef>) -> TransformFuture {
    future::ready(Ok(entry)).boxed()
}

/// An entry with literal content. Transforming it returns itself.
#[derive(Debug, Clone)]
pub struct StaticEntry {
    path: String,
    name: String,
    content: Option<String>,
}

impl StaticEntry {
    pub fn new(path: &str, name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            path: path::normalize(path),
            name: name.into(),
            content: Some(content.into()),
        }
    }

    /// An entry with no content yet.
    pub fn empty(path: &str, name: impl Into<String>) -> Self {
        Self {
            path: path::normalize(path),
            name: name.into(),
            content: None,
        }
    }

    pub fn into_ref(self) -> EntryRef {
        Arc::new(self)
    }
}

impl Entry for StaticEntry {
    fn name(&self) -> &str {
        &self.name
    }

    fn path(&self) -> &str {
        &self.path
    }

    fn content(&self) -> Result<Option<String>> {
        Ok(self.content.clone())
    }

    fn transform(self: Arc<Self>, _ctx: Context) -> TransformFuture {
        done(Some(self))
    }
}

/// An entry whose template is compiled as soon as it is set and rendered
/// when the entry is transformed.
pub struct CompilableEntry {
    path: String,
    name: String,
    template: Option<String>,
    compiled: Option<RenderFn>,
}

impl CompilableEntry {
    /// Create an entry and compile `template` with `compiler`.
    pub async fn compile(
        path: &str,
        name: impl Into<String>,
        template: Option<String>,
        compiler: Arc<dyn Compiler>,
    ) -> Result<Self> {
        let mut entry = Self {
            path: path::normalize(path),
            name: name.into(),
            template,
            compiled: None,
        };
        entry.compiled = entry.compile_template(compiler).await?;
        Ok(entry)
    }

    /// Returns a copy of this entry holding `template`. An empty or absent
    /// template clears the compiled render function.
    pub async fn with_template(
        &self,
        template: Option<String>,
        compiler: Arc<dyn Compiler>,
    ) -> Result<Self> {
        Self::compile(&self.path, self.name.clone(), template, compiler).await
    }

    /// Whether a render function is attached.
    pub fn is_compiled(&self) -> bool {
        self.compiled.is_some()
    }

    async fn compile_template(&self, compiler: Arc<dyn Compiler>) -> Result<Option<RenderFn>> {
        match self.template.as_deref() {
            None | Some("") => Ok(None),
            Some(text) => {
                let raw = StaticEntry::new(&self.path, self.name.clone(), text).into_ref();
                compiler.compile(raw).await.map(Some)
            }
        }
    }
}

impl fmt::Debug for CompilableEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompilableEntry")
            .field("path", &self.path)
            .field("name", &self.name)
            .field("compiled", &self.compiled.is_some())
            .finish()
    }
}

impl Entry for CompilableEntry {
    fn name(&self) -> &str {
        &self.name
    }

    fn path(&self) -> &str {
        &self.path
    }

    fn content(&self) -> Result<Option<String>> {
        Ok(self.template.clone())
    }

    fn transform(self: Arc<Self>, ctx: Context) -> TransformFuture {
        if let Some(render) = self.compiled.clone() {
            return render(ctx);
        }
        done(Some(self))
    }
}

/// Overrides the destination of a parent entry. Content and rendering pass
/// through, and the override survives transformation.
#[derive(Debug, Clone)]
pub struct MoveEntry {
    parent: EntryRef,
    path: String,
    name: String,
}

impl MoveEntry {
    /// Move `parent` to `path`/`name`; `None` keeps the parent's value.
    pub fn new(parent: EntryRef, path: Option<&str>, name: Option<&str>) -> Self {
        let path = path::normalize(path.unwrap_or(parent.path()));
        let name = name.unwrap_or(parent.name()).to_string();
        Self { parent, path, name }
    }

    pub fn parent(&self) -> &EntryRef {
        &self.parent
    }
}

impl Entry for MoveEntry {
    fn name(&self) -> &str {
        &self.name
    }

    fn path(&self) -> &str {
        &self.path
    }

    fn content(&self) -> Result<Option<String>> {
        self.parent.content()
    }

    fn transform(self: Arc<Self>, ctx: Context) -> TransformFuture {
        let parent = self.parent.clone().transform(ctx);
        async move {
            Ok::<_, Error>(parent.await?.map(|transformed| {
                Arc::new(MoveEntry {
                    parent: transformed,
                    path: self.path.clone(),
                    name: self.name.clone(),
                }) as EntryRef
            }))
        }
        .boxed()
    }
}

/// Applies a transformer after the parent entry is rendered.
#[derive(Clone)]
pub struct TransformEntry {
    parent: EntryRef,
    transformer: TransformerFn,
}

impl TransformEntry {
    pub fn new<F>(parent: EntryRef, transformer: F) -> Self
    where
        F: Fn(EntryRef, &Context) -> Result<EntryRef> + Send + Sync + 'static,
    {
        Self {
            parent,
            transformer: Arc::new(transformer),
        }
    }
}

impl fmt::Debug for TransformEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransformEntry")
            .field("parent", &self.parent)
            .finish_non_exhaustive()
    }
}

impl Entry for TransformEntry {
    fn name(&self) -> &str {
        self.parent.name()
    }

    fn path(&self) -> &str {
        self.parent.path()
    }

    fn content(&self) -> Result<Option<String>> {
        self.parent.content()
    }

    fn transform(self: Arc<Self>, ctx: Context) -> TransformFuture {
        let parent = self.parent.clone().transform(ctx.clone());
        let transformer = self.transformer.clone();
        async move {
            match parent.await? {
                Some(entry) => transformer(entry, &ctx).map(Some),
                None => Ok::<_, Error>(None),
            }
        }
        .boxed()
    }
}

/// Concatenation of two entries with the same destination.
#[derive(Debug, Clone)]
pub struct ConcatEntry {
    first: EntryRef,
    second: EntryRef,
}

impl ConcatEntry {
    /// Fails with [`Error::IdentityConflict`] if the destinations differ.
    pub fn new(first: EntryRef, second: EntryRef) -> Result<Self> {
        ensure_same_identity(first.as_ref(), second.as_ref())?;
        Ok(Self { first, second })
    }
}

impl Entry for ConcatEntry {
    fn name(&self) -> &str {
        self.first.name()
    }

    fn path(&self) -> &str {
        self.first.path()
    }

    fn content(&self) -> Result<Option<String>> {
        let mut out = self.first.content()?.unwrap_or_default();
        out.push_str(&self.second.content()?.unwrap_or_default());
        Ok(Some(out))
    }

    fn transform(self: Arc<Self>, ctx: Context) -> TransformFuture {
        let pair = future::try_join(
            self.first.clone().transform(ctx.clone()),
            self.second.clone().transform(ctx),
        );
        async move {
            Ok::<_, Error>(match pair.await? {
                (Some(a), Some(b)) => Some(Arc::new(ConcatEntry::new(a, b)?) as EntryRef),
                (a, b) => a.or(b),
            })
        }
        .boxed()
    }
}

/// Default indent for merged JSON output.
pub const DEFAULT_JSON_INDENT: usize = 2;

/// Deep merge of two JSON entries with the same destination. The second
/// entry's values win on conflicting keys.
#[derive(Debug, Clone)]
pub struct MergeJsonEntry {
    first: EntryRef,
    second: EntryRef,
    indent: usize,
}

impl MergeJsonEntry {
    /// Fails with [`Error::IdentityConflict`] if the destinations differ.
    /// Invalid JSON is only reported when the content is read.
    pub fn new(first: EntryRef, second: EntryRef, indent: usize) -> Result<Self> {
        ensure_same_identity(first.as_ref(), second.as_ref())?;
        Ok(Self {
            first,
            second,
            indent,
        })
    }
}

impl Entry for MergeJsonEntry {
    fn name(&self) -> &str {
        self.first.name()
    }

    fn path(&self) -> &str {
        self.first.path()
    }

    fn content(&self) -> Result<Option<String>> {
        let first = self.first.content()?.unwrap_or_default();
        let second = self.second.content()?.unwrap_or_default();
        merge_json_documents(&first, &second, self.indent)
            .map(Some)
            .map_err(|err| match err {
                Error::Merge { operation, message } => Error::Merge {
                    operation,
                    message: format!("{}: {}", self.key(), message),
                },
                other => other,
            })
    }

    fn transform(self: Arc<Self>, ctx: Context) -> TransformFuture {
        let pair = future::try_join(
            self.first.clone().transform(ctx.clone()),
            self.second.clone().transform(ctx),
        );
        let indent = self.indent;
        async move {
            Ok::<_, Error>(match pair.await? {
                (Some(a), Some(b)) => Some(Arc::new(MergeJsonEntry::new(a, b, indent)?) as EntryRef),
                (a, b) => a.or(b),
            })
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::{FunctionCompiler, IdentityCompiler};
    use crate::context;

    fn stat(path: &str, name: &str, content: &str) -> EntryRef {
        StaticEntry::new(path, name, content).into_ref()
    }

    #[test]
    fn test_static_entry_normalizes_path() {
        let e = StaticEntry::new("", "a.txt", "x");
        assert_eq!(e.path(), "/");
        assert_eq!(e.key(), "a.txt");
        let e = StaticEntry::new("src/", "a.txt", "x");
        assert_eq!(e.key(), "src/a.txt");
    }

    #[tokio::test]
    async fn test_static_entry_transform_is_identity() {
        let e = stat("/", "a", "x");
        let out = e.clone().transform(Context::new()).await.unwrap().unwrap();
        assert!(Arc::ptr_eq(&e, &out));
    }

    #[tokio::test]
    async fn test_compilable_entry_content_is_template_until_transform() {
        let compiler: Arc<dyn Compiler> = Arc::new(FunctionCompiler::new(|entry, ctx| {
            let name = ctx.display_value("who").unwrap_or_default();
            let content = entry.content()?.unwrap_or_default().replace("WHO", &name);
            Ok(Some(StaticEntry::new(entry.path(), entry.name(), content).into_ref()))
        }));
        let entry = CompilableEntry::compile("/", "f", Some("hi WHO".into()), compiler)
            .await
            .unwrap();
        assert!(entry.is_compiled());
        assert_eq!(entry.content().unwrap().as_deref(), Some("hi WHO"));

        let entry: EntryRef = Arc::new(entry);
        let out = entry
            .clone()
            .transform(context! { "who" => "you" })
            .await
            .unwrap()
            .unwrap();
        assert_eq!(out.content().unwrap().as_deref(), Some("hi you"));
        // Receiver is untouched and rendering is repeatable.
        assert_eq!(entry.content().unwrap().as_deref(), Some("hi WHO"));
        let again = entry.transform(context! { "who" => "me" }).await.unwrap().unwrap();
        assert_eq!(again.content().unwrap().as_deref(), Some("hi me"));
    }

    #[tokio::test]
    async fn test_compilable_entry_empty_template_clears_compiled() {
        let compiler: Arc<dyn Compiler> = Arc::new(IdentityCompiler);
        let entry = CompilableEntry::compile("/", "f", Some("x".into()), compiler.clone())
            .await
            .unwrap();
        assert!(entry.is_compiled());
        let cleared = entry.with_template(Some(String::new()), compiler.clone()).await.unwrap();
        assert!(!cleared.is_compiled());
        let absent = entry.with_template(None, compiler).await.unwrap();
        assert!(!absent.is_compiled());
        assert_eq!(absent.content().unwrap(), None);
    }

    #[tokio::test]
    async fn test_move_entry_preserves_override_across_transform() {
        let moved: EntryRef = Arc::new(MoveEntry::new(stat("a", "x", "1"), Some("b"), Some("y")));
        assert_eq!(moved.key(), "b/y");
        assert_eq!(moved.content().unwrap().as_deref(), Some("1"));
        let out = moved.transform(Context::new()).await.unwrap().unwrap();
        assert_eq!(out.key(), "b/y");
    }

    #[tokio::test]
    async fn test_transform_entry_applies_after_parent() {
        let e: EntryRef = Arc::new(TransformEntry::new(stat("/", "f", "abc"), |entry, _| {
            let upper = entry.content()?.unwrap_or_default().to_uppercase();
            Ok(StaticEntry::new(entry.path(), entry.name(), upper).into_ref())
        }));
        assert_eq!(e.content().unwrap().as_deref(), Some("abc"));
        let out = e.transform(Context::new()).await.unwrap().unwrap();
        assert_eq!(out.content().unwrap().as_deref(), Some("ABC"));
    }

    #[test]
    fn test_concat_entry_content() {
        let c = ConcatEntry::new(stat("blue", "file1", "X1"), stat("blue", "file1", "X2")).unwrap();
        assert_eq!(c.content().unwrap().as_deref(), Some("X1X2"));
        assert_eq!(c.key(), "blue/file1");
    }

    #[test]
    fn test_concat_entry_identity_mismatch() {
        let err = ConcatEntry::new(stat("blue", "file1", "X1"), stat("blue", "file2", "X2")).unwrap_err();
        assert!(matches!(err, Error::IdentityConflict { .. }));
    }

    #[test]
    fn test_merge_json_entry_second_wins() {
        let m = MergeJsonEntry::new(
            stat("/", "package.json", r#"{"name":"a","deps":{"x":"1"}}"#),
            stat("/", "package.json", r#"{"name":"b","deps":{"y":"2"}}"#),
            0,
        )
        .unwrap();
        assert_eq!(
            m.content().unwrap().as_deref(),
            Some(r#"{"name":"b","deps":{"x":"1","y":"2"}}"#)
        );
    }

    #[test]
    fn test_merge_json_entry_invalid_json_fails_on_read() {
        let m = MergeJsonEntry::new(stat("/", "a.json", "{}"), stat("/", "a.json", "nope"), 2).unwrap();
        assert!(matches!(m.content().unwrap_err(), Error::Merge { .. }));
    }

    #[test]
    fn test_merge_json_entry_identity_mismatch() {
        let err = MergeJsonEntry::new(stat("/", "a.json", "{}"), stat("x", "a.json", "{}"), 2).unwrap_err();
        assert!(matches!(err, Error::IdentityConflict { .. }));
    }
}
