//! # Library
//!
//! A [`Library`] maps generator names to factories and drives installs.
//!
//! Generators receive their dependencies through an [`Injector`]: a
//! registry of [`Provider`]s keyed by [`Token`]. A provider is a value, a
//! factory, or a type implementing [`Inject`]. Factory results are cached
//! per injector. The library builds its injector lazily and rebuilds it
//! after any change to its providers or parent.
//!
//! ## Global registration
//!
//! [`Library::global`] is a process-wide library populated from every
//! [`register_schematic!`](crate::register_schematic) in the binary:
//!
//! ```rust,ignore
//! schematics::register_schematic!("component", ComponentGenerator);
//! ```

use std::any::{type_name, Any, TypeId};
use std::borrow::Cow;
use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};

use once_cell::sync::Lazy;

use crate::context::Context;
use crate::entry::EntryRef;
use crate::error::{Error, Result};
use crate::events::{HookOutcome, ScopedSubscriptions};
use crate::schematic::{Generator, Hooks, Schematic};
use crate::sink::Sink;
use crate::suggestions;

/// Key of a provider.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Token(Cow<'static, str>);

impl Token {
    /// The default [`Context`] for created schematics.
    pub const CONTEXT: Token = Token::from_static("context");
    /// The default `Arc<dyn Sink>` for installs.
    pub const SINK: Token = Token::from_static("sink");

    pub const fn from_static(name: &'static str) -> Self {
        Token(Cow::Borrowed(name))
    }

    pub fn new(name: impl Into<String>) -> Self {
        Token(Cow::Owned(name.into()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone)]
struct Instance {
    value: Arc<dyn Any + Send + Sync>,
    type_name: &'static str,
}

impl Instance {
    fn new<T: Send + Sync + 'static>(value: T) -> Self {
        Self {
            value: Arc::new(value),
            type_name: type_name::<T>(),
        }
    }
}

type FactoryFn = Arc<dyn Fn(&Resolver<'_>) -> Result<Instance> + Send + Sync>;

fn factory_fn<F>(factory: F) -> FactoryFn
where
    F: Fn(&Resolver<'_>) -> Result<Instance> + Send + Sync + 'static,
{
    Arc::new(factory)
}

#[derive(Clone)]
enum ProviderKind {
    Value(Instance),
    Factory(FactoryFn),
}

/// How a token is satisfied.
#[derive(Clone)]
pub struct Provider(ProviderKind);

impl Provider {
    /// Always resolve to a clone of `value`.
    pub fn value<T: Send + Sync + 'static>(value: T) -> Self {
        Provider(ProviderKind::Value(Instance::new(value)))
    }

    /// Build the value on first use. The result is cached by the injector.
    pub fn factory<T, F>(factory: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn(&Resolver<'_>) -> Result<T> + Send + Sync + 'static,
    {
        Provider(ProviderKind::Factory(factory_fn(move |resolver: &Resolver<'_>| {
            factory(resolver).map(Instance::new)
        })))
    }

    /// Build the value with its [`Inject`] implementation.
    pub fn class<T: Inject + Send + Sync + 'static>() -> Self {
        Self::factory(T::inject)
    }
}

impl fmt::Debug for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            ProviderKind::Value(instance) => write!(f, "Provider::Value({})", instance.type_name),
            ProviderKind::Factory(_) => f.write_str("Provider::Factory"),
        }
    }
}

/// Constructor injection: build `Self` from resolved dependencies.
pub trait Inject: Sized {
    fn inject(resolver: &Resolver<'_>) -> Result<Self>;
}

/// Resolves tokens against their providers, falling back to a parent.
#[derive(Default)]
pub struct Injector {
    providers: HashMap<Token, Provider>,
    parent: Option<Arc<Injector>>,
    singletons: Mutex<HashMap<Token, Instance>>,
}

impl fmt::Debug for Injector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut tokens: Vec<&str> = self.providers.keys().map(Token::as_str).collect();
        tokens.sort_unstable();
        f.debug_struct("Injector")
            .field("tokens", &tokens)
            .field("parent", &self.parent.is_some())
            .finish()
    }
}

impl Injector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn provide(mut self, token: Token, provider: Provider) -> Self {
        self.providers.insert(token, provider);
        self
    }

    pub fn with_parent(mut self, parent: Arc<Injector>) -> Self {
        self.parent = Some(parent);
        self
    }

    /// Whether this injector or one of its ancestors can resolve `token`.
    pub fn has(&self, token: &Token) -> bool {
        self.providers.contains_key(token)
            || self.parent.as_ref().is_some_and(|parent| parent.has(token))
    }

    pub fn get<T: Clone + 'static>(&self, token: &Token) -> Result<T> {
        let path = RefCell::new(Vec::new());
        Resolver::new(self, &path).get(token)
    }

    pub fn get_optional<T: Clone + 'static>(&self, token: &Token) -> Result<Option<T>> {
        let path = RefCell::new(Vec::new());
        Resolver::new(self, &path).get_optional(token)
    }

    fn resolve(&self, token: &Token, path: &RefCell<Vec<Token>>) -> Result<Instance> {
        let Some(provider) = self.providers.get(token) else {
            return match &self.parent {
                Some(parent) => parent.resolve(token, path),
                None => Err(Error::NoProvider {
                    token: token.to_string(),
                }),
            };
        };
        let factory = match &provider.0 {
            ProviderKind::Value(instance) => return Ok(instance.clone()),
            ProviderKind::Factory(factory) => factory,
        };

        let cached = self
            .singletons
            .lock()
            .map_err(|_| Error::poisoned("injector singletons"))?
            .get(token)
            .cloned();
        if let Some(instance) = cached {
            return Ok(instance);
        }

        if path.borrow().contains(token) {
            let mut cycle: Vec<String> = path.borrow().iter().map(Token::to_string).collect();
            cycle.push(token.to_string());
            return Err(Error::CycleDetected {
                cycle: cycle.join(" -> "),
            });
        }
        path.borrow_mut().push(token.clone());
        let built = factory(&Resolver::new(self, path));
        path.borrow_mut().pop();
        let instance = built?;

        let mut singletons = self
            .singletons
            .lock()
            .map_err(|_| Error::poisoned("injector singletons"))?;
        Ok(singletons.entry(token.clone()).or_insert(instance).clone())
    }
}

/// Handle passed to factories and [`Inject`] implementations.
pub struct Resolver<'a> {
    injector: &'a Injector,
    path: &'a RefCell<Vec<Token>>,
}

impl<'a> Resolver<'a> {
    fn new(injector: &'a Injector, path: &'a RefCell<Vec<Token>>) -> Self {
        Self { injector, path }
    }

    /// Resolve `token` as a `T`.
    pub fn get<T: Clone + 'static>(&self, token: &Token) -> Result<T> {
        let instance = self.injector.resolve(token, self.path)?;
        instance
            .value
            .downcast_ref::<T>()
            .cloned()
            .ok_or_else(|| Error::ProviderType {
                token: token.to_string(),
                expected: type_name::<T>(),
                found: instance.type_name,
            })
    }

    /// Like [`get`](Self::get), but `None` when nothing provides `token`.
    pub fn get_optional<T: Clone + 'static>(&self, token: &Token) -> Result<Option<T>> {
        if self.injector.has(token) {
            self.get(token).map(Some)
        } else {
            Ok(None)
        }
    }
}

type BuildFn = Arc<dyn Fn(&Resolver<'_>) -> Result<Box<dyn Generator>> + Send + Sync>;

fn build_injected<G: Generator + Inject + 'static>(resolver: &Resolver<'_>) -> Result<Box<dyn Generator>> {
    Ok(Box::new(G::inject(resolver)?))
}

/// What a registration refers to. Re-registering the same id is a no-op.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FactoryId {
    Type(TypeId),
    Key(String),
}

#[derive(Clone)]
struct SchematicFactory {
    id: FactoryId,
    label: String,
    build: BuildFn,
}

type Callback<T> = Arc<dyn Fn(&T) -> Result<HookOutcome> + Send + Sync>;

/// Caller-supplied handlers attached for the duration of one install.
#[derive(Clone, Default)]
pub struct HookCallbacks {
    before_install: Option<Callback<()>>,
    after_install: Option<Callback<()>>,
    before_transform_entry: Option<Callback<EntryRef>>,
    after_transform_entry: Option<Callback<Option<EntryRef>>>,
    before_write_entry: Option<Callback<EntryRef>>,
    after_write_entry: Option<Callback<EntryRef>>,
}

impl HookCallbacks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn before_install<F>(mut self, f: F) -> Self
    where
        F: Fn(&()) -> Result<HookOutcome> + Send + Sync + 'static,
    {
        self.before_install = Some(Arc::new(f));
        self
    }

    pub fn after_install<F>(mut self, f: F) -> Self
    where
        F: Fn(&()) -> Result<HookOutcome> + Send + Sync + 'static,
    {
        self.after_install = Some(Arc::new(f));
        self
    }

    pub fn before_transform_entry<F>(mut self, f: F) -> Self
    where
        F: Fn(&EntryRef) -> Result<HookOutcome> + Send + Sync + 'static,
    {
        self.before_transform_entry = Some(Arc::new(f));
        self
    }

    pub fn after_transform_entry<F>(mut self, f: F) -> Self
    where
        F: Fn(&Option<EntryRef>) -> Result<HookOutcome> + Send + Sync + 'static,
    {
        self.after_transform_entry = Some(Arc::new(f));
        self
    }

    pub fn before_write_entry<F>(mut self, f: F) -> Self
    where
        F: Fn(&EntryRef) -> Result<HookOutcome> + Send + Sync + 'static,
    {
        self.before_write_entry = Some(Arc::new(f));
        self
    }

    pub fn after_write_entry<F>(mut self, f: F) -> Self
    where
        F: Fn(&EntryRef) -> Result<HookOutcome> + Send + Sync + 'static,
    {
        self.after_write_entry = Some(Arc::new(f));
        self
    }

    /// Subscribe every present callback to `hooks`.
    pub fn attach(&self, hooks: &Hooks) -> ScopedSubscriptions {
        let mut scope = ScopedSubscriptions::new();
        if let Some(cb) = self.before_install.clone() {
            scope.push(hooks.before_install.subscribe_with(move |v: &()| cb(v)));
        }
        if let Some(cb) = self.after_install.clone() {
            scope.push(hooks.after_install.subscribe_with(move |v: &()| cb(v)));
        }
        if let Some(cb) = self.before_transform_entry.clone() {
            scope.push(hooks.before_transform_entry.subscribe_with(move |v: &EntryRef| cb(v)));
        }
        if let Some(cb) = self.after_transform_entry.clone() {
            scope.push(
                hooks
                    .after_transform_entry
                    .subscribe_with(move |v: &Option<EntryRef>| cb(v)),
            );
        }
        if let Some(cb) = self.before_write_entry.clone() {
            scope.push(hooks.before_write_entry.subscribe_with(move |v: &EntryRef| cb(v)));
        }
        if let Some(cb) = self.after_write_entry.clone() {
            scope.push(hooks.after_write_entry.subscribe_with(move |v: &EntryRef| cb(v)));
        }
        scope
    }
}

/// Options for [`Library::install`]. Missing context and sink come from
/// the library's providers.
#[derive(Clone, Default)]
pub struct InstallOptions {
    pub context: Option<Context>,
    pub sink: Option<Arc<dyn Sink>>,
    pub hooks: HookCallbacks,
}

impl InstallOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn context(mut self, context: Context) -> Self {
        self.context = Some(context);
        self
    }

    pub fn sink(mut self, sink: Arc<dyn Sink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn hooks(mut self, hooks: HookCallbacks) -> Self {
        self.hooks = hooks;
        self
    }
}

#[derive(Default)]
struct LibraryState {
    schematics: BTreeMap<String, SchematicFactory>,
    providers: HashMap<Token, Provider>,
    parent: Option<Arc<Injector>>,
}

/// Named registry of generators.
#[derive(Default)]
pub struct Library {
    state: RwLock<LibraryState>,
    injector: RwLock<Option<Arc<Injector>>>,
}

impl fmt::Debug for Library {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Library")
            .field("schematics", &self.names().unwrap_or_default())
            .finish()
    }
}

/// A registration collected by [`Library::global`].
pub struct SchematicRegistration {
    pub name: &'static str,
    pub register: fn(&Library) -> Result<()>,
}

impl SchematicRegistration {
    pub const fn new(name: &'static str, register: fn(&Library) -> Result<()>) -> Self {
        Self { name, register }
    }
}

inventory::collect!(SchematicRegistration);

static GLOBAL: Lazy<Library> = Lazy::new(|| {
    let library = Library::new();
    for registration in inventory::iter::<SchematicRegistration> {
        if let Err(err) = (registration.register)(&library) {
            log::warn!("Failed to register schematic '{}': {}", registration.name, err);
        }
    }
    library
});

/// Register a generator type in [`Library::global`] under a name.
#[macro_export]
macro_rules! register_schematic {
    ($name:literal, $ty:ty) => {
        $crate::inventory::submit! {
            $crate::library::SchematicRegistration::new($name, |library| {
                library.register::<$ty>($name)
            })
        }
    };
}

impl Library {
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide library.
    pub fn global() -> &'static Library {
        &GLOBAL
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, LibraryState>> {
        self.state.read().map_err(|_| Error::poisoned("library state"))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, LibraryState>> {
        self.state.write().map_err(|_| Error::poisoned("library state"))
    }

    fn invalidate(&self) -> Result<()> {
        *self
            .injector
            .write()
            .map_err(|_| Error::poisoned("library injector"))? = None;
        Ok(())
    }

    /// Register `G` under `name`. Registering the same type again is a
    /// no-op; a different generator under a used name fails.
    pub fn register<G>(&self, name: impl Into<String>) -> Result<()>
    where
        G: Generator + Inject + 'static,
    {
        self.insert(
            name.into(),
            FactoryId::Type(TypeId::of::<G>()),
            type_name::<G>().to_string(),
            Arc::new(build_injected::<G>),
        )
    }

    /// Register a factory closure. `key` plays the role of the type for
    /// the idempotence check.
    pub fn register_factory<F>(&self, name: impl Into<String>, key: impl Into<String>, factory: F) -> Result<()>
    where
        F: Fn(&Resolver<'_>) -> Result<Box<dyn Generator>> + Send + Sync + 'static,
    {
        let key = key.into();
        self.insert(name.into(), FactoryId::Key(key.clone()), key, Arc::new(factory))
    }

    fn insert(&self, name: String, id: FactoryId, label: String, build: BuildFn) -> Result<()> {
        let mut state = self.write()?;
        if let Some(existing) = state.schematics.get(&name) {
            if existing.id == id {
                log::debug!("Schematic '{}' already registered as {}", name, label);
                return Ok(());
            }
            return Err(Error::AlreadyRegistered { name });
        }
        log::debug!("Registered schematic '{}' ({})", name, label);
        state.schematics.insert(name, SchematicFactory { id, label, build });
        Ok(())
    }

    /// Remove the registration under `name`.
    pub fn unregister(&self, name: &str) -> Result<bool> {
        let removed = self.write()?.schematics.remove(name).is_some();
        if removed {
            log::debug!("Unregistered schematic '{}'", name);
        }
        Ok(removed)
    }

    /// Remove every name registered for `G`. Returns how many were removed.
    pub fn unregister_type<G: 'static>(&self) -> Result<usize> {
        let id = FactoryId::Type(TypeId::of::<G>());
        let mut state = self.write()?;
        let before = state.schematics.len();
        state.schematics.retain(|_, factory| factory.id != id);
        Ok(before - state.schematics.len())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.read().map(|s| s.schematics.contains_key(name)).unwrap_or(false)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Result<Vec<String>> {
        Ok(self.read()?.schematics.keys().cloned().collect())
    }

    pub fn add_providers<I>(&self, providers: I) -> Result<()>
    where
        I: IntoIterator<Item = (Token, Provider)>,
    {
        self.write()?.providers.extend(providers);
        self.invalidate()
    }

    pub fn remove_provider(&self, token: &Token) -> Result<bool> {
        let removed = self.write()?.providers.remove(token).is_some();
        self.invalidate()?;
        Ok(removed)
    }

    /// Default context for [`create`](Self::create) and installs.
    pub fn set_context(&self, context: Context) -> Result<()> {
        self.add_providers([(Token::CONTEXT, Provider::value(context))])
    }

    /// Default sink for [`install`](Self::install).
    pub fn set_sink(&self, sink: Arc<dyn Sink>) -> Result<()> {
        self.add_providers([(Token::SINK, Provider::value(sink))])
    }

    /// Delegate tokens this library does not provide to `parent`.
    pub fn set_parent_injector(&self, parent: Option<Arc<Injector>>) -> Result<()> {
        self.write()?.parent = parent;
        self.invalidate()
    }

    /// The current injector, built on first use after a change.
    pub fn injector(&self) -> Result<Arc<Injector>> {
        if let Some(injector) = self
            .injector
            .read()
            .map_err(|_| Error::poisoned("library injector"))?
            .as_ref()
        {
            return Ok(injector.clone());
        }
        let injector = {
            let state = self.read()?;
            Arc::new(Injector {
                providers: state.providers.clone(),
                parent: state.parent.clone(),
                singletons: Mutex::new(HashMap::new()),
            })
        };
        let mut slot = self
            .injector
            .write()
            .map_err(|_| Error::poisoned("library injector"))?;
        Ok(slot.get_or_insert(injector).clone())
    }

    /// Construct the generator registered under `name` and bind `ctx` (or
    /// the library's context provider) to it.
    pub fn create(&self, name: &str, ctx: Option<&Context>) -> Result<Schematic> {
        let factory = {
            let state = self.read()?;
            match state.schematics.get(name) {
                Some(factory) => factory.clone(),
                None => {
                    let names: Vec<&str> = state.schematics.keys().map(String::as_str).collect();
                    return Err(Error::UnknownSchematic {
                        name: name.to_string(),
                        hint: suggestions::find_similar(name, &names).map(str::to_string),
                    });
                }
            }
        };
        let injector = self.injector()?;
        let path = RefCell::new(Vec::new());
        let resolver = Resolver::new(&injector, &path);
        let generator = (factory.build)(&resolver)?;
        let context = match ctx {
            Some(ctx) => ctx.clone(),
            None => resolver
                .get_optional::<Context>(&Token::CONTEXT)?
                .unwrap_or_default(),
        };
        log::debug!("Creating schematic '{}' ({})", name, factory.label);
        let mut schematic = Schematic::from_boxed(generator);
        schematic.transform(&context)?;
        Ok(schematic)
    }

    /// Create the schematic `name` and install it.
    ///
    /// Hook callbacks in `options` are subscribed for this install only and
    /// released however it ends.
    pub async fn install(&self, name: &str, options: InstallOptions) -> Result<()> {
        let mut schematic = self.create(name, options.context.as_ref())?;
        let sink = match options.sink {
            Some(sink) => sink,
            None => self.injector()?.get::<Arc<dyn Sink>>(&Token::SINK)?,
        };
        let _scope = options.hooks.attach(schematic.hooks());
        log::info!("Installing schematic '{}'", name);
        schematic.install(sink.as_ref()).await
    }
}
