//! Path manipulation utilities for entry destinations
//!
//! Entry paths are `/`-separated strings independent of the host platform.
//! The bare `/` stands for the template root: an entry at `/` named
//! `README.md` has the destination key `README.md`.

use crate::context::Context;
use crate::error::{Error, Result};
use glob::Pattern;
use regex::Regex;

/// The template root.
pub const ROOT: &str = "/";

/// Normalize an entry directory.
///
/// Empty and `.` inputs become [`ROOT`]. Otherwise `.` and empty segments
/// are removed, `..` pops the previous segment where there is one, and any
/// trailing slash is dropped. Absolute inputs stay absolute.
pub fn normalize(path: &str) -> String {
    let absolute = path.starts_with('/');
    let mut parts: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => match parts.last() {
                Some(&last) if last != ".." => {
                    parts.pop();
                }
                _ if absolute => {}
                _ => parts.push(".."),
            },
            other => parts.push(other),
        }
    }
    if parts.is_empty() {
        return ROOT.to_string();
    }
    let joined = parts.join("/");
    if absolute {
        format!("/{}", joined)
    } else {
        joined
    }
}

/// Whether `path` is absolute. The template root itself is not.
pub fn is_absolute(path: &str) -> bool {
    path.starts_with('/') && path != ROOT
}

/// Join a directory and a file name into a destination key.
pub fn join(dir: &str, name: &str) -> String {
    if dir == ROOT || dir.is_empty() {
        name.to_string()
    } else if dir.ends_with('/') {
        format!("{}{}", dir, name)
    } else {
        format!("{}/{}", dir, name)
    }
}

/// Split a destination key into `(dir, name)`.
///
/// `"dir/file2"` yields `("dir", "file2")`; a bare name yields
/// `(ROOT, name)`.
pub fn split(full: &str) -> (String, String) {
    match full.rsplit_once('/') {
        Some((dir, name)) if !dir.is_empty() => (normalize(dir), name.to_string()),
        Some((_, name)) => (ROOT.to_string(), name.to_string()),
        None => (ROOT.to_string(), full.to_string()),
    }
}

/// Prefix a relative directory with `root`. Absolute directories are
/// returned unchanged.
pub fn prepend_root(root: &str, dir: &str) -> String {
    if is_absolute(dir) {
        dir.to_string()
    } else if dir == ROOT {
        normalize(root)
    } else {
        normalize(&join(root, dir))
    }
}

/// Replace every match of `token` in `input` with the context value named
/// by its first capture group.
///
/// Unknown keys resolve to the empty string, or fail with
/// [`Error::UnknownKey`] when `strict` is set.
pub fn replace_tokens(token: &Regex, input: &str, ctx: &Context, strict: bool) -> Result<String> {
    let mut result = String::with_capacity(input.len());
    let mut last = 0;
    for captures in token.captures_iter(input) {
        let whole = match captures.get(0) {
            Some(m) => m,
            None => continue,
        };
        result.push_str(&input[last..whole.start()]);
        let key = captures.get(1).map(|m| m.as_str()).unwrap_or_default();
        match ctx.display_value(key) {
            Some(value) => result.push_str(&value),
            None if strict => {
                return Err(Error::UnknownKey {
                    key: key.to_string(),
                    input: input.to_string(),
                })
            }
            None => {}
        }
        last = whole.end();
    }
    result.push_str(&input[last..]);
    Ok(result)
}

/// Match a path against a glob pattern
pub fn glob_match(pattern: &str, path: &str) -> Result<bool> {
    let pattern = Pattern::new(pattern).map_err(Error::Glob)?;
    Ok(pattern.matches(path))
}
