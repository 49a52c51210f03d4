//! Shared test utilities for E2E tests.
//!
//! Add `mod common;` to a test file, then use the helpers:
//!
//! ```rust,ignore
//! mod common;
//! use common::prelude::*;
//!
//! #[test]
//! fn test_example() {
//!     let fixture = TestFixture::new().with_component_collection();
//!     fixture.command().arg("list").assert().success();
//! }
//! ```

use assert_fs::prelude::*;
use std::path::{Path, PathBuf};

/// Re-export commonly used test dependencies for convenience.
pub mod prelude {
    pub use assert_fs::prelude::*;
    pub use predicates::prelude::*;

    #[allow(unused_imports)]
    pub use super::manifests;
    pub use super::TestFixture;
}

/// Collection manifests used across tests.
#[allow(dead_code)]
pub mod manifests {
    /// One `component` schematic with a templated directory name.
    pub const COMPONENT: &str = r#"{
  "name": "app",
  "schematics": {
    "component": {
      "description": "Create a component",
      "path": "component",
      "variables": [
        { "name": "name", "type": "string", "default": "widget" },
        { "name": "spec", "type": "boolean", "default": true }
      ]
    },
    "readme": { "description": "Add a README", "path": "readme" }
  }
}"#;

    /// A collection that defines nothing.
    pub const EMPTY: &str = r#"{ "name": "empty" }"#;

    /// Not JSON at all.
    pub const INVALID: &str = "schematics: [";
}

/// A temporary directory holding a collection and an output directory.
pub struct TestFixture {
    temp_dir: assert_fs::TempDir,
}

impl TestFixture {
    /// Create a new test fixture with an empty temporary directory.
    pub fn new() -> Self {
        Self {
            temp_dir: assert_fs::TempDir::new().expect("Failed to create temp directory"),
        }
    }

    /// Write `schematics/collection.json` with the given content.
    pub fn with_manifest(self, content: &str) -> Self {
        self.with_file("schematics/collection.json", content)
    }

    /// The `component` and `readme` schematics with their templates.
    #[allow(dead_code)]
    pub fn with_component_collection(self) -> Self {
        self.with_manifest(manifests::COMPONENT)
            .with_file(
                "schematics/component/__name__/__name__.txt",
                "component <%= name %>\n",
            )
            .with_file(
                "schematics/component/__name__/__name__.spec.txt",
                "<% if spec %>spec for <%= name %><% endif %>\n",
            )
            .with_file("schematics/readme/README.md", "# Project\n")
    }

    /// Add a file with the given path and content.
    pub fn with_file(self, path: &str, content: &str) -> Self {
        self.temp_dir
            .child(path)
            .write_str(content)
            .expect("Failed to write file");
        self
    }

    /// Get the path to the temporary directory.
    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Path of the collection directory.
    pub fn collection_path(&self) -> PathBuf {
        self.temp_dir.path().join("schematics")
    }

    /// Path of the output directory used by [`generate`](Self::generate).
    #[allow(dead_code)]
    pub fn output_path(&self) -> PathBuf {
        self.temp_dir.path().join("out")
    }

    /// Create a child path in the temp directory.
    #[allow(dead_code)]
    pub fn child(&self, path: &str) -> assert_fs::fixture::ChildPath {
        self.temp_dir.child(path)
    }

    /// A command running in this fixture's directory, with the collection
    /// environment variable cleared.
    pub fn command(&self) -> assert_cmd::Command {
        let mut cmd = assert_cmd::Command::cargo_bin("schematics").unwrap();
        cmd.current_dir(self.path())
            .env_remove("SCHEMATICS_COLLECTION")
            .env_remove("RUST_LOG");
        cmd
    }

    /// `generate` against this fixture's collection and output directory.
    #[allow(dead_code)]
    pub fn generate(&self) -> assert_cmd::Command {
        let mut cmd = self.command();
        cmd.arg("generate")
            .arg("--collection")
            .arg(self.collection_path())
            .arg("--output")
            .arg(self.output_path());
        cmd
    }
}

impl Default for TestFixture {
    fn default() -> Self {
        Self::new()
    }
}
