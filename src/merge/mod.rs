//! Content merge operations
//!
//! Merging two entries that share a destination either concatenates their
//! contents or, for JSON documents, deep-merges them. The JSON logic lives in
//! [`json`]; concatenation needs no helper.

pub mod json;

pub use json::{merge_json_documents, merge_json_values};
