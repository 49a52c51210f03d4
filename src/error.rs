//! # Error Handling
//!
//! This module defines the centralized error type for the scaffolding
//! engine. It uses the `thiserror` library to build a single `Error` enum
//! covering every failure class the pipeline can surface, from entry
//! composition through source traversal, rendering, sink I/O and the
//! generator registry.
//!
//! ## Key Components
//!
//! - **`Error`**: The main enum. Each variant carries enough context (paths,
//!   keys, names) to explain the failure without a backtrace.
//!
//! - **`FsErrorCode`**: The POSIX-style code attached to file system errors,
//!   so callers can match on `ENOENT`/`EEXIST` without inspecting the
//!   underlying `std::io::Error`.
//!
//! - **`Result<T>`**: A type alias for `std::result::Result<T, Error>`.
//!
//! The failure classes are:
//!
//! - Identity conflicts when combining entries with different destinations.
//! - File system errors wrapping an OS error code.
//! - Source-shape errors (the root of a file source is not a directory).
//! - Registry errors (unknown generator, conflicting registration).
//! - Key-resolution errors from strict path token remapping.
//! - Sink-reported errors raised after a failed install.

use std::fmt;
use std::io;

use thiserror::Error;

/// POSIX-style error code carried by [`Error::FileSystem`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsErrorCode {
    /// No such file or directory.
    NotFound,
    /// Permission denied.
    PermissionDenied,
    /// File exists.
    AlreadyExists,
    /// Not a directory.
    NotADirectory,
    /// Is a directory.
    IsADirectory,
    /// Any other I/O failure.
    Other,
}

impl FsErrorCode {
    /// Classify an I/O error by its kind.
    pub fn from_io(err: &io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => Self::NotFound,
            io::ErrorKind::PermissionDenied => Self::PermissionDenied,
            io::ErrorKind::AlreadyExists => Self::AlreadyExists,
            _ => match err.raw_os_error() {
                Some(20) => Self::NotADirectory,
                Some(21) => Self::IsADirectory,
                _ => Self::Other,
            },
        }
    }

    /// The conventional symbolic name, e.g. `ENOENT`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotFound => "ENOENT",
            Self::PermissionDenied => "EACCES",
            Self::AlreadyExists => "EEXIST",
            Self::NotADirectory => "ENOTDIR",
            Self::IsADirectory => "EISDIR",
            Self::Other => "EIO",
        }
    }

    fn io_kind(&self) -> io::ErrorKind {
        match self {
            Self::NotFound => io::ErrorKind::NotFound,
            Self::PermissionDenied => io::ErrorKind::PermissionDenied,
            Self::AlreadyExists => io::ErrorKind::AlreadyExists,
            _ => io::ErrorKind::Other,
        }
    }
}

impl fmt::Display for FsErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Main error type for scaffolding operations
#[derive(Error, Debug)]
pub enum Error {
    /// Two entries with different destinations were combined.
    #[error("Cannot combine entries with different destinations: {left} and {right}")]
    IdentityConflict { left: String, right: String },

    /// A file system operation failed with an OS error code.
    #[error("{code}: {operation} failed for '{path}': {source}")]
    FileSystem {
        code: FsErrorCode,
        operation: &'static str,
        path: String,
        #[source]
        source: io::Error,
    },

    /// The root of a file source was a plain file.
    #[error("Source root must be a directory: {path}")]
    SourceRootNotDirectory { path: String },

    /// A different generator is already registered under this name.
    #[error("Schematic already registered: {name}")]
    AlreadyRegistered { name: String },

    /// No generator is registered under this name.
    #[error("Unknown schematic: {name}{}", hint.as_ref().map(|h| format!("\n  hint: {}", h)).unwrap_or_default())]
    UnknownSchematic {
        name: String,
        /// Closest registered name, if any
        hint: Option<String>,
    },

    /// A path token referenced a key missing from the context in strict mode.
    #[error("Unknown key '{key}' in '{input}'")]
    UnknownKey { key: String, input: String },

    /// The injector has no provider for a token.
    #[error("No provider for token: {token}")]
    NoProvider { token: String },

    /// A provider produced a value of an unexpected type.
    #[error("Provider for token '{token}' has type {found}, expected {expected}")]
    ProviderType {
        token: String,
        expected: &'static str,
        found: &'static str,
    },

    /// A provider factory requested its own token.
    #[error("Cycle detected in providers: {cycle}")]
    CycleDetected { cycle: String },

    /// A merge of two entries' contents failed.
    #[error("Merge operation error: {operation} - {message}")]
    Merge { operation: String, message: String },

    /// A template failed to compile or render.
    ///
    /// May include the name of the entry being rendered.
    #[error("Template processing error: {message}{}", entry.as_ref().map(|v| format!(" (entry: {})", v)).unwrap_or_default())]
    Template {
        message: String,
        /// The entry whose content failed, if applicable
        entry: Option<String>,
    },

    /// A context value could not be coerced to a variable's declared type.
    #[error("Cannot coerce variable '{variable}' to {expected}: {message}")]
    Coercion {
        variable: String,
        expected: &'static str,
        message: String,
    },

    /// An operation was attempted in a state that does not allow it.
    #[error("Invalid state: cannot {operation} while {state}")]
    InvalidState {
        operation: &'static str,
        state: String,
    },

    /// A sink rejected an entry or reported a failed install.
    #[error("Sink error: {message}")]
    Sink { message: String },

    /// A lifecycle hook handler failed.
    #[error("Hook '{hook}' failed: {message}")]
    Hook { hook: String, message: String },

    /// A collection manifest could not be parsed.
    #[error("Configuration parsing error: {message}{}", hint.as_ref().map(|h| format!("\n  hint: {}", h)).unwrap_or_default())]
    ConfigParse {
        message: String,
        /// Optional hint for how to fix the manifest
        hint: Option<String>,
    },

    /// An error indicating that a mutex or other lock has been poisoned.
    #[error("Lock poisoned: {context}")]
    LockPoisoned { context: String },

    /// An I/O error, wrapped from `std::io::Error`.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A regular expression error, wrapped from `regex::Error`.
    #[error("Regex error: {0}")]
    Regex(#[from] regex::Error),

    /// A glob pattern error, wrapped from `glob::PatternError`.
    #[error("Glob pattern error: {0}")]
    Glob(#[from] glob::PatternError),

    /// A JSON error, wrapped from `serde_json::Error`.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Wrap an I/O error raised by `operation` on `path`.
    pub fn fs(operation: &'static str, path: impl Into<String>, source: io::Error) -> Self {
        Error::FileSystem {
            code: FsErrorCode::from_io(&source),
            operation,
            path: path.into(),
            source,
        }
    }

    /// Build a file system error from a bare code, for adapters that have no
    /// underlying OS error.
    pub fn fs_code(operation: &'static str, path: impl Into<String>, code: FsErrorCode) -> Self {
        let path = path.into();
        Error::FileSystem {
            code,
            operation,
            source: io::Error::new(code.io_kind(), format!("{} '{}'", code, path)),
            path,
        }
    }

    /// The file system error code, if this is a file system error.
    pub fn fs_code_of(&self) -> Option<FsErrorCode> {
        match self {
            Error::FileSystem { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// Shorthand for a lock-poisoned error.
    pub(crate) fn poisoned(context: &str) -> Self {
        Error::LockPoisoned {
            context: context.to_string(),
        }
    }
}

/// A convenient type alias for `Result<T, Error>`.
pub type Result<T> = std::result::Result<T, Error>;
