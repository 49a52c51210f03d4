//! # Compilers
//!
//! A [`Compiler`] turns a raw entry into a render function
//! `(Context) -> Entry`. Compiling is structural and content-based, and
//! happens once; rendering is context-based and may happen many times.
//!
//! ## Available compilers
//!
//! - [`IdentityCompiler`]: renders to the raw entry unchanged.
//! - [`FunctionCompiler`]: delegates to a closure.
//! - [`TemplateCompiler`]: renders the content with a [`Renderer`].
//! - [`PathChangeCompiler`]: substitutes `__key__` tokens in path and name.
//! - [`FilterCompiler`]: drops dot-files and entries under dot-directories.
//! - [`MergeCompiler`]: runs several compilers in sequence.
//!
//! [`default_compiler`] is path substitution followed by templating.

use std::sync::Arc;

use futures::future::{self, BoxFuture, FutureExt};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::context::Context;
use crate::entry::{Entry, EntryRef, MoveEntry, StaticEntry, TransformFuture};
use crate::error::{Error, Result};
use crate::path;
use crate::template::{Renderer, TemplateRenderer};

/// A deferred render function produced by a compiler.
pub type RenderFn = Arc<dyn Fn(Context) -> TransformFuture + Send + Sync>;

/// The deferred result of compiling an entry.
pub type CompileFuture = BoxFuture<'static, Result<RenderFn>>;

/// Default token for path substitution: `__key__`.
pub const DEFAULT_PATH_TOKEN: &str = "__(.*?)__";

/// Turns a raw entry into a render function.
pub trait Compiler: Send + Sync {
    fn compile(&self, entry: EntryRef) -> CompileFuture;
}

fn ready_render(render: RenderFn) -> CompileFuture {
    future::ready(Ok(render)).boxed()
}

/// Renders every entry to itself.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityCompiler;

impl Compiler for IdentityCompiler {
    fn compile(&self, entry: EntryRef) -> CompileFuture {
        ready_render(Arc::new(move |_ctx: Context| future::ready(Ok::<_, Error>(Some(entry.clone()))).boxed()))
    }
}

type CompileClosure = dyn Fn(EntryRef, &Context) -> Result<Option<EntryRef>> + Send + Sync;

/// Renders by calling a closure. Returning `None` drops the entry.
#[derive(Clone)]
pub struct FunctionCompiler {
    func: Arc<CompileClosure>,
}

impl FunctionCompiler {
    pub fn new<F>(func: F) -> Self
    where
        F: Fn(EntryRef, &Context) -> Result<Option<EntryRef>> + Send + Sync + 'static,
    {
        Self {
            func: Arc::new(func),
        }
    }
}

impl Compiler for FunctionCompiler {
    fn compile(&self, entry: EntryRef) -> CompileFuture {
        let func = self.func.clone();
        ready_render(Arc::new(move |ctx: Context| {
            future::ready(func(entry.clone(), &ctx)).boxed()
        }))
    }
}

/// Renders entry content with a [`Renderer`]. Path and name are untouched.
#[derive(Clone)]
pub struct TemplateCompiler {
    renderer: Arc<dyn Renderer>,
}

impl Default for TemplateCompiler {
    fn default() -> Self {
        Self::new(Arc::new(TemplateRenderer::default()))
    }
}

impl TemplateCompiler {
    pub fn new(renderer: Arc<dyn Renderer>) -> Self {
        Self { renderer }
    }
}

impl Compiler for TemplateCompiler {
    fn compile(&self, entry: EntryRef) -> CompileFuture {
        let text = match entry.content() {
            Ok(Some(text)) => text,
            Ok(None) => return IdentityCompiler.compile(entry),
            Err(err) => return future::ready(Err(err)).boxed(),
        };
        let key = entry.key();
        let compiled = match self.renderer.compile(&text) {
            Ok(compiled) => compiled,
            Err(err) => return future::ready(Err(with_entry(err, &key))).boxed(),
        };
        ready_render(Arc::new(move |ctx: Context| {
            let rendered = compiled.render(&ctx).map(|content| {
                Some(StaticEntry::new(entry.path(), entry.name(), content).into_ref())
            });
            future::ready(rendered.map_err(|err| with_entry(err, &key))).boxed()
        }))
    }
}

fn with_entry(err: Error, key: &str) -> Error {
    match err {
        Error::Template { message, entry: None } => Error::Template {
            message,
            entry: Some(key.to_string()),
        },
        other => other,
    }
}

/// Replaces tokens in the path and name of entries. Content is untouched.
#[derive(Debug, Clone)]
pub struct PathChangeCompiler {
    token: Regex,
    strict: bool,
}

impl Default for PathChangeCompiler {
    fn default() -> Self {
        Self {
            token: default_token(),
            strict: false,
        }
    }
}

static DEFAULT_TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(DEFAULT_PATH_TOKEN).expect("default path token is a valid regex"));
static DOT_SEGMENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\.[^.]|^\.\.[^.]").expect("dot segment pattern is a valid regex"));
static DOT_FILE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\.[^.]").expect("dot file pattern is a valid regex"));

/// The compiled [`DEFAULT_PATH_TOKEN`].
pub(crate) fn default_token() -> Regex {
    DEFAULT_TOKEN.clone()
}

/// Validate that a token pattern has a capture group for the key.
pub(crate) fn token_regex(pattern: &str) -> Result<Regex> {
    let regex = Regex::new(pattern)?;
    if regex.captures_len() < 2 {
        return Err(Error::ConfigParse {
            message: format!("token pattern '{}' has no capture group", pattern),
            hint: Some("Wrap the key part of the token in parentheses, e.g. __(.*?)__".to_string()),
        });
    }
    Ok(regex)
}

impl PathChangeCompiler {
    /// Use a custom token pattern whose first capture group names the key.
    /// With `strict`, unknown keys fail instead of resolving to "".
    pub fn new(pattern: &str, strict: bool) -> Result<Self> {
        Ok(Self {
            token: token_regex(pattern)?,
            strict,
        })
    }

    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }
}

impl Compiler for PathChangeCompiler {
    fn compile(&self, entry: EntryRef) -> CompileFuture {
        let token = self.token.clone();
        let strict = self.strict;
        ready_render(Arc::new(move |ctx: Context| {
            let moved = remap(&token, strict, &entry, &ctx);
            future::ready(moved.map(Some)).boxed()
        }))
    }
}

/// Wrap `entry` in a [`MoveEntry`] with tokens replaced, or return it
/// unchanged if nothing matched.
pub(crate) fn remap(token: &Regex, strict: bool, entry: &EntryRef, ctx: &Context) -> Result<EntryRef> {
    let new_path = path::replace_tokens(token, entry.path(), ctx, strict)?;
    let new_name = path::replace_tokens(token, entry.name(), ctx, strict)?;
    if new_path == entry.path() && new_name == entry.name() {
        return Ok(entry.clone());
    }
    Ok(Arc::new(MoveEntry::new(
        entry.clone(),
        Some(&new_path),
        Some(&new_name),
    )))
}

/// Drops entries whose name, or any directory segment of whose path,
/// matches. The defaults drop dot-files and dot-directories but keep `.`
/// and `..`.
#[derive(Debug, Clone)]
pub struct FilterCompiler {
    path_match: Regex,
    file_match: Regex,
}

impl Default for FilterCompiler {
    fn default() -> Self {
        Self {
            path_match: DOT_SEGMENT.clone(),
            file_match: DOT_FILE.clone(),
        }
    }
}

impl FilterCompiler {
    pub fn new(path_match: &str, file_match: &str) -> Result<Self> {
        Ok(Self {
            path_match: Regex::new(path_match)?,
            file_match: Regex::new(file_match)?,
        })
    }

    /// Whether `entry` is filtered out.
    pub fn rejects(&self, entry: &dyn Entry) -> bool {
        self.file_match.is_match(entry.name())
            || entry.path().split('/').any(|segment| self.path_match.is_match(segment))
    }
}

impl Compiler for FilterCompiler {
    fn compile(&self, entry: EntryRef) -> CompileFuture {
        let kept = if self.rejects(entry.as_ref()) {
            log::debug!("Filtered out {}", entry.key());
            None
        } else {
            Some(entry)
        };
        ready_render(Arc::new(move |_ctx: Context| future::ready(Ok::<_, Error>(kept.clone())).boxed()))
    }
}

/// Runs compilers in order: each stage's rendered entry is compiled by the
/// next stage. A dropped entry or a failed stage ends the chain.
#[derive(Clone, Default)]
pub struct MergeCompiler {
    compilers: Vec<Arc<dyn Compiler>>,
}

impl MergeCompiler {
    pub fn new(compilers: Vec<Arc<dyn Compiler>>) -> Self {
        Self { compilers }
    }

    pub fn then(mut self, compiler: Arc<dyn Compiler>) -> Self {
        self.compilers.push(compiler);
        self
    }
}

impl Compiler for MergeCompiler {
    fn compile(&self, entry: EntryRef) -> CompileFuture {
        let mut stages = self.compilers.clone().into_iter();
        let first = match stages.next() {
            Some(first) => first,
            None => return IdentityCompiler.compile(entry),
        };
        let rest: Arc<Vec<Arc<dyn Compiler>>> = Arc::new(stages.collect());
        let first = first.compile(entry);
        async move {
            let first = first.await?;
            let render: RenderFn = Arc::new(move |ctx: Context| {
                let start = first(ctx.clone());
                let rest = rest.clone();
                async move {
                    let mut current = start.await?;
                    for stage in rest.iter() {
                        let entry = match current {
                            Some(entry) => entry,
                            None => return Ok(None),
                        };
                        let render = stage.compile(entry).await?;
                        current = render(ctx.clone()).await?;
                    }
                    Ok::<_, Error>(current)
                }
                .boxed()
            });
            Ok::<_, Error>(render)
        }
        .boxed()
    }
}

/// Path-token substitution followed by template rendering.
pub fn default_compiler() -> Arc<dyn Compiler> {
    Arc::new(MergeCompiler::new(vec![
        Arc::new(PathChangeCompiler::default()),
        Arc::new(TemplateCompiler::default()),
    ]))
}
