//! # CLI Command Implementations
//!
//! This module contains the implementation for each subcommand of the
//! `schematics` command-line tool. Each subcommand is defined in its own file.
//!
//! ## Structure
//!
//! Each command module contains:
//! - An `Args` struct that defines the command-specific arguments and options,
//!   derived using `clap`.
//! - An `execute` function that takes the parsed `Args` and performs the
//!   command's logic by calling into the `schematics` library.

pub mod generate;
pub mod list;

use std::path::Path;

use anyhow::Result;
use schematics::collection::Collection;
use schematics::filesystem::FileSystem;

/// Load the collection at `path`, with a hint-rich error when it is missing.
pub(crate) async fn load_collection(fs: &dyn FileSystem, path: &Path) -> Result<Collection> {
    if !path.exists() {
        return Err(schematics::suggestions::collection_not_found(path));
    }
    Collection::load(fs, path)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to load collection from {}: {}", path.display(), e))
}
