//! Integration tests for the schematic library
//!
//! Covers registration from outside the crate, constructor injection from
//! library providers, and installing a registered collection.

use std::path::Path;
use std::sync::Arc;

use serde_json::Value;

use schematics::collection::Collection;
use schematics::context::{Context, Variable, VariableKind};
use schematics::entry::StaticEntry;
use schematics::error::{Error, Result};
use schematics::filesystem::{FileSystem, MemoryFileSystem};
use schematics::library::{Inject, InstallOptions, Library, Provider, Resolver, Token};
use schematics::schematic::{Generator, InstallState};
use schematics::sink::MemorySink;
use schematics::source::{from_entries, EntryStream};

const LICENSE_HOLDER: Token = Token::from_static("license-holder");

/// Writes a LICENSE naming a holder supplied by the library.
struct License {
    holder: String,
    year: i64,
}

impl Inject for License {
    fn inject(resolver: &Resolver<'_>) -> Result<Self> {
        Ok(Self {
            holder: resolver.get::<String>(&LICENSE_HOLDER)?,
            year: 0,
        })
    }
}

impl Generator for License {
    fn variables(&self) -> Vec<Variable> {
        vec![Variable::new("year", VariableKind::Integer).with_default(2024)]
    }

    fn bind(&mut self, name: &str, value: &Value) -> Result<()> {
        if name == "year" {
            self.year = value.as_i64().unwrap_or_default();
        }
        Ok(())
    }

    fn build(&self, _ctx: &Context) -> EntryStream {
        from_entries(vec![StaticEntry::new(
            "/",
            "LICENSE",
            format!("Copyright {} {}", self.year, self.holder),
        )
        .into_ref()])
    }
}

schematics::register_schematic!("license", License);

#[test]
fn test_macro_registers_into_global_library() {
    assert!(Library::global().contains("license"));
}

#[tokio::test]
async fn test_injected_generator_installs() {
    let library = Library::new();
    library.register::<License>("license").unwrap();
    library
        .add_providers([(LICENSE_HOLDER, Provider::value("Ada".to_string()))])
        .unwrap();

    let sink = Arc::new(MemorySink::new());
    library
        .install(
            "license",
            InstallOptions::new()
                .context(Context::new().with("year", "1843"))
                .sink(sink.clone()),
        )
        .await
        .unwrap();

    assert_eq!(sink.get("LICENSE").as_deref(), Some("Copyright 1843 Ada"));
}

#[test]
fn test_missing_provider_fails_creation() {
    let library = Library::new();
    library.register::<License>("license").unwrap();
    let err = library.create("license", None).unwrap_err();
    assert!(matches!(err, Error::NoProvider { ref token } if token == "license-holder"));
}

#[test]
fn test_library_context_provider_is_default() {
    let library = Library::new();
    library.register::<License>("license").unwrap();
    library
        .add_providers([(LICENSE_HOLDER, Provider::value("Ada".to_string()))])
        .unwrap();
    library
        .set_context(Context::new().with("year", 1900))
        .unwrap();

    let schematic = library.create("license", None).unwrap();
    assert_eq!(schematic.state(), InstallState::Transformed);
    assert_eq!(schematic.context().get("year"), Some(&Value::from(1900)));
}

#[test]
fn test_unknown_schematic_suggests_registered_name() {
    let library = Library::new();
    library.register::<License>("license").unwrap();
    let err = library.create("licence", None).unwrap_err();
    assert!(
        matches!(err, Error::UnknownSchematic { ref hint, .. } if hint.as_deref() == Some("license"))
    );
}

#[tokio::test]
async fn test_collection_registers_blueprints() {
    let fs = MemoryFileSystem::new();
    fs.add_file_string(
        "/work/collection.json",
        r#"{ "name": "docs", "schematics": {
            "readme": { "path": "readme",
                "variables": [ { "name": "title", "type": "string", "default": "Untitled" } ] }
        } }"#,
    )
    .unwrap();
    fs.add_file_string("/work/readme/README.md", "# <%= title %>\n")
        .unwrap();
    let fs: Arc<dyn FileSystem> = Arc::new(fs);

    let collection = Collection::load(fs.as_ref(), Path::new("/work")).await.unwrap();
    let library = Library::new();
    collection.register_into(&library, fs.clone()).unwrap();
    assert_eq!(library.names().unwrap(), vec!["readme".to_string()]);

    let sink = Arc::new(MemorySink::new());
    library
        .install(
            "readme",
            InstallOptions::new()
                .context(Context::new().with("title", "Guide"))
                .sink(sink.clone()),
        )
        .await
        .unwrap();
    assert_eq!(sink.get("README.md").as_deref(), Some("# Guide\n"));
}
