//! JSON merge operations
//!
//! Deep merging of JSON documents. The second document's values win on
//! conflicting keys; objects are merged recursively, and keys present only
//! in the first document are kept.
//!
//! ## Example
//!
//! ```
//! use schematics::merge::merge_json_documents;
//!
//! let merged = merge_json_documents(r#"{"a": 1, "b": {"c": 1}}"#, r#"{"b": {"d": 2}}"#, 0).unwrap();
//! assert_eq!(merged, r#"{"a":1,"b":{"c":1,"d":2}}"#);
//! ```

use serde::Serialize;
use serde_json::ser::{PrettyFormatter, Serializer};
use serde_json::Value as JsonValue;

use crate::error::{Error, Result};

/// Recursively merge source JSON value into target
///
/// - Objects: keys are merged recursively, source values win on conflicts.
///   Target keys keep their position; keys new in the source are appended.
/// - Arrays: merged index by index; the source element wins at each shared
///   index, and trailing elements of the longer array are kept.
/// - Anything else: the source replaces the target.
pub fn merge_json_values(target: &mut JsonValue, source: &JsonValue) {
    match (target, source) {
        (JsonValue::Object(target_map), JsonValue::Object(source_map)) => {
            for (key, value) in source_map {
                match target_map.get_mut(key) {
                    Some(existing) => merge_json_values(existing, value),
                    None => {
                        target_map.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        (JsonValue::Array(target_array), JsonValue::Array(source_array)) => {
            for (index, value) in source_array.iter().enumerate() {
                match target_array.get_mut(index) {
                    Some(existing) => merge_json_values(existing, value),
                    None => target_array.push(value.clone()),
                }
            }
        }
        (target, source) => *target = source.clone(),
    }
}

/// Parse, merge and re-serialize two JSON documents.
///
/// `indent` is the number of spaces per nesting level; `0` produces compact
/// output.
///
/// # Errors
///
/// Returns `Error::Merge` if either document is not valid JSON.
pub fn merge_json_documents(first: &str, second: &str, indent: usize) -> Result<String> {
    let parse = |which: &str, text: &str| -> Result<JsonValue> {
        serde_json::from_str(text).map_err(|e| Error::Merge {
            operation: "json merge".to_string(),
            message: format!("{} document is not valid JSON: {}", which, e),
        })
    };
    let mut merged = parse("first", first)?;
    let overlay = parse("second", second)?;
    merge_json_values(&mut merged, &overlay);
    to_string_indented(&merged, indent)
}

/// Serialize `value` with `indent` spaces per level, or compactly for `0`.
pub fn to_string_indented(value: &JsonValue, indent: usize) -> Result<String> {
    if indent == 0 {
        return Ok(serde_json::to_string(value)?);
    }
    let pad = " ".repeat(indent);
    let mut out = Vec::new();
    let mut ser = Serializer::with_formatter(&mut out, PrettyFormatter::with_indent(pad.as_bytes()));
    value.serialize(&mut ser)?;
    String::from_utf8(out).map_err(|e| Error::Merge {
        operation: "json merge".to_string(),
        message: e.to_string(),
    })
}
