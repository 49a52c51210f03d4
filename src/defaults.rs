//! Default values for schematics configuration.
//!
//! This module provides centralized default values used across commands,
//! ensuring consistency and avoiding duplication.

use std::path::PathBuf;

/// Collection looked up when `--collection` is not given.
pub const DEFAULT_COLLECTION: &str = "./schematics/";

/// Environment variable overriding the collection path.
pub const COLLECTION_ENV: &str = "SCHEMATICS_COLLECTION";

/// Returns the default output directory: the current directory.
///
/// Falls back to `.` if the current directory cannot be determined.
pub fn default_output_dir() -> PathBuf {
    std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
}
