//! Generate command implementation
//!
//! Loads a collection, binds the options given after the schematic name to
//! the blueprint's variables, and installs the schematic into the output
//! directory. With `--dry-run` the whole pipeline runs but nothing is
//! written.

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use clap::Args;

use schematics::context::Context;
use schematics::defaults::{default_output_dir, COLLECTION_ENV, DEFAULT_COLLECTION};
use schematics::entry::EntryRef;
use schematics::events::HookOutcome;
use schematics::filesystem::{FileSystem, LocalFileSystem};
use schematics::library::{HookCallbacks, InstallOptions, Library};
use schematics::sink::{DryRunSink, FileSink, Sink};

/// Arguments for the generate command
#[derive(Args, Debug)]
pub struct GenerateArgs {
    /// Collection directory or collection.json manifest
    #[arg(long, value_name = "PATH", env = COLLECTION_ENV, default_value = DEFAULT_COLLECTION)]
    pub collection: PathBuf,

    /// Output directory (defaults to current directory)
    #[arg(short, long, value_name = "PATH")]
    pub output: Option<PathBuf>,

    /// Run the schematic without writing any file
    #[arg(short = 'n', long)]
    pub dry_run: bool,

    /// Suppress all output except errors
    #[arg(short, long)]
    pub quiet: bool,

    /// Name of the schematic to generate
    #[arg(value_name = "SCHEMATIC")]
    pub name: String,

    /// Schematic options: --key=value, --key value, --flag or --no-flag
    #[arg(
        value_name = "OPTIONS",
        trailing_var_arg = true,
        allow_hyphen_values = true
    )]
    pub options: Vec<String>,
}

/// Parse schematic options into a context.
///
/// Values stay strings; the schematic coerces them to the declared types.
pub(crate) fn parse_options(raw: &[String]) -> Result<Context> {
    let mut ctx = Context::new();
    let mut args = raw.iter().peekable();
    while let Some(arg) = args.next() {
        let Some(flag) = arg.strip_prefix("--") else {
            anyhow::bail!(
                "Unexpected argument '{arg}'\n\n\
                 hint: Pass schematic options as --key=value"
            );
        };
        if flag.is_empty() {
            continue;
        }
        if let Some((key, value)) = flag.split_once('=') {
            ctx.insert(key, value);
            continue;
        }
        match args.peek() {
            Some(next) if !next.starts_with("--") => {
                ctx.insert(flag, next.as_str());
                args.next();
            }
            _ => match flag.strip_prefix("no-") {
                Some(negated) => ctx.insert(negated, false),
                None => ctx.insert(flag, true),
            },
        }
    }
    Ok(ctx)
}

/// Execute the generate command
pub async fn execute(args: GenerateArgs) -> Result<()> {
    let start_time = Instant::now();
    let fs: Arc<dyn FileSystem> = Arc::new(LocalFileSystem);

    let collection = super::load_collection(fs.as_ref(), &args.collection).await?;
    let Some(blueprint) = collection.blueprint(&args.name) else {
        return Err(schematics::suggestions::unknown_schematic(
            &args.name,
            &collection.names(),
        ));
    };

    let options = parse_options(&args.options)?;
    for (key, _) in options.iter() {
        if !blueprint.variables.iter().any(|v| v.name == key.as_str()) {
            log::warn!(
                "Ignoring unknown option '--{}' for schematic '{}'",
                key,
                args.name
            );
        }
    }

    let library = Library::new();
    collection.register_into(&library, fs.clone())?;

    let output_dir = args.output.unwrap_or_else(default_output_dir);
    let sink: Arc<dyn Sink> = if args.dry_run {
        Arc::new(DryRunSink::new())
    } else {
        Arc::new(FileSink::new(&output_dir).with_fs(fs.clone()))
    };

    if !args.quiet {
        println!("🧩 Generating '{}' from {}", args.name, collection.name);
        if args.dry_run {
            println!("🔎 DRY RUN MODE - No files will be written");
        }
        println!();
    }

    let written = Arc::new(AtomicUsize::new(0));
    let counter = written.clone();
    let quiet = args.quiet;
    let verb = if args.dry_run { "would create" } else { "create" };
    let hooks = HookCallbacks::new().after_write_entry(move |entry: &EntryRef| {
        counter.fetch_add(1, Ordering::SeqCst);
        log::debug!("Wrote {}", entry.key());
        if !quiet {
            println!("   {} {}", verb, entry.key());
        }
        Ok(HookOutcome::Done)
    });

    let result = library
        .install(
            &args.name,
            InstallOptions::new()
                .context(options)
                .sink(sink)
                .hooks(hooks),
        )
        .await;

    match result {
        Ok(()) => {
            if !args.quiet {
                let count = written.load(Ordering::SeqCst);
                println!();
                println!(
                    "✅ Generated {} file(s) in {:.2}s",
                    count,
                    start_time.elapsed().as_secs_f64()
                );
                if !args.dry_run && count > 0 {
                    println!("   Files written to: {}", output_dir.display());
                }
            }
            Ok(())
        }
        Err(e) => {
            if !args.quiet {
                println!("❌ Generate failed");
                println!();
            }
            Err(anyhow::anyhow!("Failed to generate '{}': {}", args.name, e))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;
    use std::fs;
    use tempfile::TempDir;

    fn strings(args: &[&str]) -> Vec<String> {
        args.iter().map(|s| s.to_string()).collect()
    }

    fn args(collection: PathBuf, output: PathBuf, name: &str, options: &[&str]) -> GenerateArgs {
        GenerateArgs {
            collection,
            output: Some(output),
            dry_run: false,
            quiet: true,
            name: name.to_string(),
            options: strings(options),
        }
    }

    fn write_collection(dir: &std::path::Path) {
        fs::create_dir_all(dir.join("component/files/__name__")).unwrap();
        fs::write(
            dir.join("collection.json"),
            r#"{ "schematics": { "component": { "path": "component/files",
                "variables": [ { "name": "name", "type": "string", "default": "widget" } ] } } }"#,
        )
        .unwrap();
        fs::write(
            dir.join("component/files/__name__/__name__.txt"),
            "component <%= name %>\n",
        )
        .unwrap();
    }

    #[test]
    fn test_parse_options_forms() {
        let ctx = parse_options(&strings(&[
            "--name=button",
            "--size",
            "3",
            "--spec",
            "--no-style",
        ]))
        .unwrap();
        assert_eq!(ctx.get("name"), Some(&Value::from("button")));
        assert_eq!(ctx.get("size"), Some(&Value::from("3")));
        assert_eq!(ctx.get("spec"), Some(&Value::Bool(true)));
        assert_eq!(ctx.get("style"), Some(&Value::Bool(false)));
    }

    #[test]
    fn test_parse_options_rejects_positional() {
        let err = parse_options(&strings(&["button"])).unwrap_err();
        assert!(err.to_string().contains("Unexpected argument 'button'"));
    }

    #[tokio::test]
    async fn test_execute_missing_collection() {
        let out = TempDir::new().unwrap();
        let result = execute(args(
            PathBuf::from("/nonexistent/schematics"),
            out.path().to_path_buf(),
            "component",
            &[],
        ))
        .await;
        let message = result.unwrap_err().to_string();
        assert!(message.contains("Collection not found"));
    }

    #[tokio::test]
    async fn test_execute_unknown_schematic() {
        let collection = TempDir::new().unwrap();
        write_collection(collection.path());
        let out = TempDir::new().unwrap();
        let result = execute(args(
            collection.path().to_path_buf(),
            out.path().to_path_buf(),
            "componnt",
            &[],
        ))
        .await;
        let message = result.unwrap_err().to_string();
        assert!(message.contains("Did you mean 'component'?"));
    }

    #[tokio::test]
    async fn test_execute_writes_files() {
        let collection = TempDir::new().unwrap();
        write_collection(collection.path());
        let out = TempDir::new().unwrap();
        execute(args(
            collection.path().to_path_buf(),
            out.path().to_path_buf(),
            "component",
            &["--name=button", "--unknown=1"],
        ))
        .await
        .unwrap();
        let written = fs::read_to_string(out.path().join("button/button.txt")).unwrap();
        assert_eq!(written, "component button\n");
    }

    #[tokio::test]
    async fn test_execute_dry_run_writes_nothing() {
        let collection = TempDir::new().unwrap();
        write_collection(collection.path());
        let out = TempDir::new().unwrap();
        let mut dry = args(
            collection.path().to_path_buf(),
            out.path().to_path_buf(),
            "component",
            &[],
        );
        dry.dry_run = true;
        execute(dry).await.unwrap();
        assert!(!out.path().join("widget").exists());
    }
}
