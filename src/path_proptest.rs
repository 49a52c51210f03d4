//! Property-based tests for path handling and stream operators.
//!
//! These tests use proptest to generate random inputs and verify that
//! invariants hold for all possible inputs.

#[cfg(test)]
mod proptest_tests {
    use crate::context::Context;
    use crate::entry::{EntryRef, StaticEntry};
    use crate::operators::{concat_duplicates, deduplicate};
    use crate::path::{glob_match, join, normalize, replace_tokens, split, ROOT};
    use crate::source::{from_entries, EntryStream};
    use futures::executor::block_on;
    use futures::StreamExt;
    use proptest::prelude::*;
    use regex::Regex;

    fn entries(specs: &[(String, String)]) -> Vec<EntryRef> {
        specs
            .iter()
            .map(|(key, content)| {
                let (dir, name) = split(key);
                StaticEntry::new(&dir, name, content.clone()).into_ref()
            })
            .collect()
    }

    fn keys_and_contents(
        input: Vec<EntryRef>,
        op: fn(EntryStream) -> EntryStream,
    ) -> Vec<(String, String)> {
        block_on(
            op(from_entries(input))
                .map(|e| {
                    let e = e.unwrap();
                    (e.key(), e.content().unwrap().unwrap_or_default())
                })
                .collect::<Vec<_>>(),
        )
    }

    /// Short keys over a tiny alphabet so duplicates are frequent.
    fn spec_strategy() -> impl Strategy<Value = Vec<(String, String)>> {
        prop::collection::vec(("[ab](/[ab]){0,2}", "[xyz]{0,3}"), 0..12)
    }

    // ============================================================================
    // normalize property tests
    // ============================================================================

    proptest! {
        /// Property: normalize is idempotent
        #[test]
        fn normalize_is_idempotent(input in "[a-z./]{0,20}") {
            let once = normalize(&input);
            prop_assert_eq!(normalize(&once), once);
        }

        /// Property: normalized paths have no empty, `.` or trailing segments
        #[test]
        fn normalize_removes_empty_and_dot_segments(input in "[a-z./]{0,20}") {
            let result = normalize(&input);
            if result != ROOT {
                prop_assert!(!result.ends_with('/'), "trailing slash in '{}'", result);
                prop_assert!(!result.contains("//"), "empty segment in '{}'", result);
                prop_assert!(
                    !result.split('/').any(|s| s == "."),
                    "dot segment in '{}'",
                    result
                );
            }
        }

        /// Property: normalize keeps an input absolute or relative
        #[test]
        fn normalize_preserves_absoluteness(input in "/?[a-z]{1,5}(/[a-z]{1,5}){0,3}") {
            let result = normalize(&input);
            prop_assert_eq!(result.starts_with('/'), input.starts_with('/'));
        }
    }

    // ============================================================================
    // join / split property tests
    // ============================================================================

    proptest! {
        /// Property: split undoes join for clean directories
        #[test]
        fn split_inverts_join(dir in "[a-z]{1,5}(/[a-z]{1,5}){0,3}", name in "[a-z]{1,8}") {
            let (d, n) = split(&join(&dir, &name));
            prop_assert_eq!(d, dir);
            prop_assert_eq!(n, name);
        }

        /// Property: joining onto the root yields the bare name
        #[test]
        fn join_root_is_name(name in "[a-zA-Z0-9_.-]{1,12}") {
            prop_assert_eq!(join(ROOT, &name), name);
        }
    }

    // ============================================================================
    // replace_tokens property tests
    // ============================================================================

    proptest! {
        /// Property: input without token markers is returned unchanged
        #[test]
        fn replace_tokens_without_markers_is_identity(input in "[a-z/.]{0,20}") {
            let token = Regex::new("__(.*?)__").unwrap();
            let result = replace_tokens(&token, &input, &Context::new(), true);
            prop_assert_eq!(result.unwrap(), input);
        }

        /// Property: a known token is always replaced by its value
        #[test]
        fn replace_tokens_substitutes_value(prefix in "[a-z]{0,5}", value in "[a-z]{1,5}") {
            let token = Regex::new("__(.*?)__").unwrap();
            let ctx = Context::new().with("name", value.clone());
            let input = format!("{}__name__", prefix);
            let result = replace_tokens(&token, &input, &ctx, true).unwrap();
            prop_assert_eq!(result, format!("{}{}", prefix, value));
        }
    }

    // ============================================================================
    // glob_match property tests
    // ============================================================================

    proptest! {
        /// Property: glob pattern "*" matches any non-empty single path component
        #[test]
        fn glob_star_matches_single_component(path in "[a-zA-Z0-9_.]+") {
            let result = glob_match("*", &path);
            prop_assert!(result.is_ok());
            prop_assert!(result.unwrap(), "Pattern '*' should match '{}'", path);
        }

        /// Property: a literal pattern matches itself
        #[test]
        fn glob_literal_matches_itself(path in "[a-z]{1,5}(/[a-z]{1,5}){0,2}") {
            prop_assert!(glob_match(&path, &path).unwrap());
        }
    }

    // ============================================================================
    // operator property tests
    // ============================================================================

    proptest! {
        /// Property: deduplicate is idempotent
        #[test]
        fn deduplicate_is_idempotent(specs in spec_strategy()) {
            let once = keys_and_contents(entries(&specs), deduplicate::apply);
            let twice = keys_and_contents(entries(&once), deduplicate::apply);
            prop_assert_eq!(twice, once);
        }

        /// Property: deduplicate keeps the first entry of every key, in order
        #[test]
        fn deduplicate_keeps_first_writer(specs in spec_strategy()) {
            let result = keys_and_contents(entries(&specs), deduplicate::apply);
            let mut expected: Vec<(String, String)> = Vec::new();
            for (key, content) in &specs {
                let key = normalize(key);
                if !expected.iter().any(|(k, _)| *k == key) {
                    expected.push((key, content.clone()));
                }
            }
            prop_assert_eq!(result, expected);
        }

        /// Property: concat of duplicates joins every content of a key in order
        #[test]
        fn concat_duplicates_joins_in_source_order(specs in spec_strategy()) {
            let result = keys_and_contents(entries(&specs), concat_duplicates::apply);
            let mut expected: Vec<(String, String)> = Vec::new();
            for (key, content) in &specs {
                let key = normalize(key);
                match expected.iter_mut().find(|(k, _)| *k == key) {
                    Some((_, joined)) => joined.push_str(content),
                    None => expected.push((key, content.clone())),
                }
            }
            prop_assert_eq!(result, expected);
        }
    }
}
