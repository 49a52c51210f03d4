//! # List Command Implementation
//!
//! This module implements the `list` subcommand, which prints the schematics
//! a collection defines.
//!
//! ## Functionality
//!
//! - **Schematic Listing**: one line per schematic with its description
//! - **Variables**: optional long format showing each declared variable, its
//!   type and default
//! - **Count**: only the number of schematics
//!
//! This command is read-only; it never touches the output directory.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Args;

use schematics::collection::{Blueprint, Collection};
use schematics::context::Variable;
use schematics::defaults::{COLLECTION_ENV, DEFAULT_COLLECTION};
use schematics::filesystem::{FileSystem, LocalFileSystem};

/// List the schematics of a collection
#[derive(Args, Debug)]
pub struct ListArgs {
    /// Collection directory or collection.json manifest
    #[arg(long, value_name = "PATH", env = COLLECTION_ENV, default_value = DEFAULT_COLLECTION)]
    pub collection: PathBuf,

    /// Show the variables each schematic accepts.
    #[arg(short, long)]
    pub long: bool,

    /// Show only the number of schematics.
    #[arg(long)]
    pub count: bool,
}

/// Execute the `list` command.
pub async fn execute(args: ListArgs) -> Result<()> {
    let fs: Arc<dyn FileSystem> = Arc::new(LocalFileSystem);
    let collection = super::load_collection(fs.as_ref(), &args.collection).await?;

    if args.count {
        println!("{}", collection.blueprints().len());
        return Ok(());
    }

    print!("{}", render(&collection, args.long));
    Ok(())
}

/// Format the listing of `collection`.
fn render(collection: &Collection, long: bool) -> String {
    let mut out = String::new();
    if collection.blueprints().is_empty() {
        out.push_str(&format!(
            "No schematics in the {} collection.\n",
            collection.name
        ));
        return out;
    }

    out.push_str(&format!("Schematics in the {} collection:\n", collection.name));
    let width = collection
        .blueprints()
        .iter()
        .map(|b| b.name.len())
        .max()
        .unwrap_or(0);
    for blueprint in collection.blueprints() {
        out.push_str(&format_blueprint(blueprint, width));
        if long {
            for variable in &blueprint.variables {
                out.push_str(&format!("      --{}\n", format_variable(variable)));
            }
        }
    }
    out
}

fn format_blueprint(blueprint: &Blueprint, width: usize) -> String {
    if blueprint.description.is_empty() {
        format!("  {}\n", blueprint.name)
    } else {
        format!(
            "  {:<width$}  {}\n",
            blueprint.name,
            blueprint.description,
            width = width
        )
    }
}

/// `name <type>` plus ` (default: value)` when one is declared.
fn format_variable(variable: &Variable) -> String {
    match &variable.default {
        Some(default) => format!(
            "{} <{}> (default: {})",
            variable.name,
            variable.kind.as_str(),
            default
        ),
        None => format!("{} <{}>", variable.name, variable.kind.as_str()),
    }
}
