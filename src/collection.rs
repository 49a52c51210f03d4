//! # Collections and blueprints
//!
//! A collection is a `collection.json` manifest naming a set of
//! blueprints. Each blueprint points at a directory of template files and
//! declares the variables it accepts:
//!
//! ```json
//! {
//!   "name": "app",
//!   "description": "Application scaffolding",
//!   "schematics": {
//!     "component": {
//!       "description": "Create a component",
//!       "path": "component/files/",
//!       "variables": [
//!         { "name": "name", "type": "string", "default": "widget" },
//!         { "name": "spec", "type": "boolean", "default": true }
//!       ]
//!     }
//!   }
//! }
//! ```
//!
//! Blueprint paths are relative to the directory holding the manifest. A
//! `file://` prefix is accepted and stripped. Each blueprint becomes a
//! [`BlueprintGenerator`], which reads its directory with a
//! [`FileSource`] compiled by [`default_compiler`].

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;

use crate::compiler::default_compiler;
use crate::context::{Context, Variable, VariableKind};
use crate::error::{Error, Result};
use crate::filesystem::FileSystem;
use crate::library::{Library, Resolver};
use crate::schematic::Generator;
use crate::source::{EntryStream, FileSource, Source};

/// File name looked up when a collection path is a directory.
pub const MANIFEST_FILE: &str = "collection.json";

#[derive(Debug, Deserialize)]
struct CollectionManifest {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    schematics: BTreeMap<String, BlueprintManifest>,
}

#[derive(Debug, Deserialize)]
struct BlueprintManifest {
    #[serde(default)]
    description: Option<String>,
    #[serde(alias = "source")]
    path: String,
    #[serde(default)]
    variables: Vec<VariableManifest>,
}

#[derive(Debug, Deserialize)]
struct VariableManifest {
    name: String,
    #[serde(rename = "type", default)]
    kind: Option<String>,
    #[serde(default)]
    default: Option<Value>,
}

/// One generator described by a collection.
#[derive(Debug, Clone, PartialEq)]
pub struct Blueprint {
    pub name: String,
    pub description: String,
    /// Template directory
    pub path: PathBuf,
    pub variables: Vec<Variable>,
}

/// A loaded collection manifest.
#[derive(Debug, Clone)]
pub struct Collection {
    pub name: String,
    pub description: String,
    /// Directory the manifest lives in
    pub root: PathBuf,
    blueprints: Vec<Blueprint>,
}

fn config_error(message: String, hint: Option<&str>) -> Error {
    Error::ConfigParse {
        message,
        hint: hint.map(str::to_string),
    }
}

impl Collection {
    /// Load the collection at `path`: a directory holding
    /// `collection.json`, or the manifest file itself.
    pub async fn load(fs: &dyn FileSystem, path: &Path) -> Result<Collection> {
        let (manifest_path, root) = if fs.stat(path).await?.is_directory {
            (path.join(MANIFEST_FILE), path.to_path_buf())
        } else {
            let root = path.parent().map(Path::to_path_buf).unwrap_or_default();
            (path.to_path_buf(), root)
        };
        if manifest_path.extension().and_then(|e| e.to_str()) != Some("json") {
            return Err(config_error(
                format!("Collection manifest must be a JSON file: {}", manifest_path.display()),
                Some("Point --collection at a directory containing collection.json"),
            ));
        }
        let text = fs.read(&manifest_path).await?;
        log::debug!("Loading collection manifest {}", manifest_path.display());
        Self::parse(&text, root)
    }

    /// Parse manifest text. Blueprint paths are resolved against `root`.
    pub fn parse(text: &str, root: PathBuf) -> Result<Collection> {
        let manifest: CollectionManifest = serde_json::from_str(text).map_err(|e| {
            config_error(
                format!("Invalid collection manifest: {}", e),
                Some("Check the manifest against the collection.json format"),
            )
        })?;

        let mut blueprints = Vec::with_capacity(manifest.schematics.len());
        for (name, blueprint) in manifest.schematics {
            let variables = blueprint
                .variables
                .into_iter()
                .map(|v| variable_from_manifest(&name, v))
                .collect::<Result<Vec<_>>>()?;
            let relative = blueprint.path.trim_start_matches("file://");
            blueprints.push(Blueprint {
                path: root.join(relative),
                description: blueprint.description.unwrap_or_default(),
                variables,
                name,
            });
        }

        let name = manifest.name.unwrap_or_else(|| {
            root.file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default()
        });
        Ok(Collection {
            name,
            description: manifest.description.unwrap_or_default(),
            root,
            blueprints,
        })
    }

    /// Blueprints in name order.
    pub fn blueprints(&self) -> &[Blueprint] {
        &self.blueprints
    }

    pub fn blueprint(&self, name: &str) -> Option<&Blueprint> {
        self.blueprints.iter().find(|b| b.name == name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.blueprints.iter().map(|b| b.name.as_str()).collect()
    }

    /// Register every blueprint in `library`, reading templates through
    /// `fs`.
    pub fn register_into(&self, library: &Library, fs: Arc<dyn FileSystem>) -> Result<()> {
        for blueprint in &self.blueprints {
            let key = format!("blueprint:{}", blueprint.path.display());
            let blueprint = blueprint.clone();
            let fs = fs.clone();
            library.register_factory(
                blueprint.name.clone(),
                key,
                move |_resolver: &Resolver<'_>| {
                    Ok(Box::new(BlueprintGenerator::new(blueprint.clone(), fs.clone())) as Box<dyn Generator>)
                },
            )?;
        }
        Ok(())
    }
}

fn variable_from_manifest(blueprint: &str, v: VariableManifest) -> Result<Variable> {
    let kind = match v.kind.as_deref() {
        None => VariableKind::Any,
        Some(kind) => VariableKind::parse(kind).ok_or_else(|| {
            config_error(
                format!(
                    "Unknown type '{}' for variable '{}' of schematic '{}'",
                    kind, v.name, blueprint
                ),
                Some("Use one of: string, number, integer, boolean, any"),
            )
        })?,
    };
    let default = match v.default {
        Some(default) => Some(kind.coerce(&v.name, &default).map_err(|e| {
            config_error(
                format!("Invalid default in schematic '{}': {}", blueprint, e),
                Some("Make the default match the variable's type"),
            )
        })?),
        None => None,
    };
    let mut variable = Variable::new(v.name, kind);
    if let Some(default) = default {
        variable = variable.with_default(default);
    }
    Ok(variable)
}

/// Generator backed by a blueprint directory.
pub struct BlueprintGenerator {
    blueprint: Blueprint,
    fs: Arc<dyn FileSystem>,
}

impl BlueprintGenerator {
    pub fn new(blueprint: Blueprint, fs: Arc<dyn FileSystem>) -> Self {
        Self { blueprint, fs }
    }

    pub fn blueprint(&self) -> &Blueprint {
        &self.blueprint
    }
}

impl Generator for BlueprintGenerator {
    fn variables(&self) -> Vec<Variable> {
        self.blueprint.variables.clone()
    }

    fn build(&self, _ctx: &Context) -> EntryStream {
        log::debug!(
            "Reading blueprint '{}' from {}",
            self.blueprint.name,
            self.blueprint.path.display()
        );
        FileSource::new(&self.blueprint.path)
            .with_fs(self.fs.clone())
            .with_compiler(default_compiler())
            .read()
    }
}
