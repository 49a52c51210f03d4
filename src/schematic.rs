//! # Schematic install orchestration
//!
//! A [`Schematic`] wraps one [`Generator`] and drives a single generation
//! run through a small state machine:
//!
//! ```text
//! Unbuilt -> Transformed -> Installing -> Installed
//!    \            \              \
//!     `------------`--------------`-> Failed
//! ```
//!
//! ## Install sequence
//!
//! 1. `sink.init()`
//! 2. `before_install`
//! 3. `generator.build()`, deduplicated by destination (first entry wins)
//! 4. For every surviving entry, concurrently:
//!    `before_transform_entry` -> `transform` -> `after_transform_entry`
//!    -> (stop if the entry was dropped) -> `before_write_entry`
//!    -> `sink.write` -> `after_write_entry`
//! 5. `after_install`
//! 6. `sink.done()`
//!
//! Every hook emission is joined before the sequence continues. The first
//! failure stops new per-entry work, lets work already started finish, and
//! is handed to [`Sink::error`], which decides whether `install` fails.
//! Writes committed before the failure are kept.

use std::collections::HashSet;
use std::fmt;
use std::sync::Mutex;

use futures::future;
use futures::stream::StreamExt;
use serde_json::Value;

use crate::context::{Context, Variable};
use crate::entry::EntryRef;
use crate::error::{Error, Result};
use crate::events::EventEmitter;
use crate::operators::deduplicate;
use crate::sink::Sink;
use crate::source::EntryStream;

/// One generator definition.
///
/// `variables` declares what can be bound from a context. When a name is
/// declared more than once, the first declaration wins, so a generator
/// built on top of another lists its own variables before the inner ones.
pub trait Generator: Send + Sync {
    fn variables(&self) -> Vec<Variable> {
        Vec::new()
    }

    /// Receive the coerced value of a declared variable.
    fn bind(&mut self, _name: &str, _value: &Value) -> Result<()> {
        Ok(())
    }

    /// The raw entry stream of this generator.
    fn build(&self, ctx: &Context) -> EntryStream;
}

/// Where a [`Schematic`] is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallState {
    Unbuilt,
    Transformed,
    Installing,
    Installed,
    Failed,
}

impl InstallState {
    pub fn as_str(&self) -> &'static str {
        match self {
            InstallState::Unbuilt => "unbuilt",
            InstallState::Transformed => "transformed",
            InstallState::Installing => "installing",
            InstallState::Installed => "installed",
            InstallState::Failed => "failed",
        }
    }

    /// Installed and Failed are final.
    pub fn is_terminal(&self) -> bool {
        matches!(self, InstallState::Installed | InstallState::Failed)
    }
}

impl fmt::Display for InstallState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The six lifecycle hook points of an install.
///
/// `after_transform_entry` sees `None` for entries the compiler dropped.
#[derive(Debug, Clone)]
pub struct Hooks {
    pub before_install: EventEmitter<()>,
    pub after_install: EventEmitter<()>,
    pub before_transform_entry: EventEmitter<EntryRef>,
    pub after_transform_entry: EventEmitter<Option<EntryRef>>,
    pub before_write_entry: EventEmitter<EntryRef>,
    pub after_write_entry: EventEmitter<EntryRef>,
}

impl Default for Hooks {
    fn default() -> Self {
        Self {
            before_install: EventEmitter::new("before_install"),
            after_install: EventEmitter::new("after_install"),
            before_transform_entry: EventEmitter::new("before_transform_entry"),
            after_transform_entry: EventEmitter::new("after_transform_entry"),
            before_write_entry: EventEmitter::new("before_write_entry"),
            after_write_entry: EventEmitter::new("after_write_entry"),
        }
    }
}

/// A generator bound to a context, ready to install.
pub struct Schematic {
    generator: Box<dyn Generator>,
    context: Context,
    hooks: Hooks,
    state: InstallState,
}

impl fmt::Debug for Schematic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Schematic")
            .field("context", &self.context)
            .field("state", &self.state)
            .finish()
    }
}

impl Schematic {
    pub fn new<G: Generator + 'static>(generator: G) -> Self {
        Self::from_boxed(Box::new(generator))
    }

    pub fn from_boxed(generator: Box<dyn Generator>) -> Self {
        Self {
            generator,
            context: Context::new(),
            hooks: Hooks::default(),
            state: InstallState::Unbuilt,
        }
    }

    pub fn state(&self) -> InstallState {
        self.state
    }

    /// The bound variables. Rendering sees exactly this context.
    pub fn context(&self) -> &Context {
        &self.context
    }

    pub fn hooks(&self) -> &Hooks {
        &self.hooks
    }

    pub fn generator(&self) -> &dyn Generator {
        self.generator.as_ref()
    }

    /// Declared variables, first declaration per name.
    pub fn variables(&self) -> Vec<Variable> {
        let mut seen = HashSet::new();
        self.generator
            .variables()
            .into_iter()
            .filter(|v| seen.insert(v.name.clone()))
            .collect()
    }

    fn set_state(&mut self, state: InstallState) {
        log::debug!("Schematic state: {} -> {}", self.state, state);
        self.state = state;
    }

    /// Bind `ctx` to the declared variables.
    ///
    /// Values present in `ctx` are coerced to the declared kind; missing
    /// ones fall back to the declared default. Keys nobody declared are
    /// not bound.
    pub fn transform(&mut self, ctx: &Context) -> Result<&mut Self> {
        match self.state {
            InstallState::Unbuilt | InstallState::Transformed => {}
            other => {
                return Err(Error::InvalidState {
                    operation: "transform",
                    state: other.to_string(),
                })
            }
        }
        match self.bind_variables(ctx) {
            Ok(()) => {
                self.set_state(InstallState::Transformed);
                Ok(self)
            }
            Err(err) => {
                self.set_state(InstallState::Failed);
                Err(err)
            }
        }
    }

    fn bind_variables(&mut self, ctx: &Context) -> Result<()> {
        let mut bound = Context::new();
        for variable in self.variables() {
            let value = match ctx.get(&variable.name) {
                Some(value) => variable.kind.coerce(&variable.name, value)?,
                None => match &variable.default {
                    Some(default) => default.clone(),
                    None => continue,
                },
            };
            self.generator.bind(&variable.name, &value)?;
            bound.insert(variable.name.to_string(), value);
        }
        for (key, _) in ctx.iter() {
            if !bound.contains(key) {
                log::debug!("Ignoring undeclared variable '{}'", key);
            }
        }
        self.context = bound;
        Ok(())
    }

    /// Run the install sequence against `sink`.
    ///
    /// An unbuilt schematic is bound with its defaults first. On failure
    /// the schematic ends `Failed` and the result is whatever
    /// [`Sink::error`] returns.
    pub async fn install(&mut self, sink: &dyn Sink) -> Result<()> {
        match self.state {
            InstallState::Unbuilt | InstallState::Transformed => {}
            other => {
                return Err(Error::InvalidState {
                    operation: "install",
                    state: other.to_string(),
                })
            }
        }
        let prepared = if self.state == InstallState::Unbuilt {
            self.bind_variables(&Context::new())
        } else {
            Ok(())
        };
        self.set_state(InstallState::Installing);
        let outcome = match prepared {
            Ok(()) => self.run(sink).await,
            Err(err) => Err(err),
        };
        match outcome {
            Ok(()) => {
                self.set_state(InstallState::Installed);
                Ok(())
            }
            Err(err) => {
                self.set_state(InstallState::Failed);
                log::debug!("Install failed: {}", err);
                sink.error(err)
            }
        }
    }

    async fn run(&self, sink: &dyn Sink) -> Result<()> {
        sink.init().await?;
        self.hooks.before_install.emit(&()).await?;

        let failure: Mutex<Option<Error>> = Mutex::new(None);
        let failed = || failure.lock().map(|f| f.is_some()).unwrap_or(true);

        deduplicate::apply(self.generator.build(&self.context))
            .take_while(|_| future::ready(!failed()))
            .for_each_concurrent(None, |item| {
                let failure = &failure;
                async move {
                    if failed() {
                        return;
                    }
                    let outcome = match item {
                        Ok(entry) => self.install_entry(entry, sink).await,
                        Err(err) => Err(err),
                    };
                    if let Err(err) = outcome {
                        if let Ok(mut slot) = failure.lock() {
                            slot.get_or_insert(err);
                        }
                    }
                }
            })
            .await;

        if let Some(err) = failure.into_inner().map_err(|_| Error::poisoned("install failure"))? {
            return Err(err);
        }

        self.hooks.after_install.emit(&()).await?;
        sink.done().await
    }

    async fn install_entry(&self, entry: EntryRef, sink: &dyn Sink) -> Result<()> {
        let key = entry.key();
        self.hooks.before_transform_entry.emit(&entry).await?;
        let transformed = entry.transform(self.context.clone()).await?;
        self.hooks.after_transform_entry.emit(&transformed).await?;
        let Some(entry) = transformed else {
            log::debug!("Entry {} was dropped during transform", key);
            return Ok(());
        };
        self.hooks.before_write_entry.emit(&entry).await?;
        sink.write(entry.clone()).await?;
        self.hooks.after_write_entry.emit(&entry).await
    }
}
