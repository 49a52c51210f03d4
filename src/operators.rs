//! Stream transform operators
//!
//! Every operator is a function from an entry stream to an entry stream.
//! Operators never mutate entries; they wrap or replace them. Errors in the
//! input are passed through unchanged.
//!
//! Each operator lives in its own module with an `apply` function; most
//! also expose an `operator` constructor returning an [`Operator`] so that
//! pipelines can be assembled with [`compose`].

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use futures::channel::mpsc;
use futures::future::{self, FutureExt};
use futures::stream::{self, StreamExt};

use crate::context::Context;
use crate::entry::{Entry, EntryRef, MoveEntry};
use crate::error::Result;
use crate::path;
use crate::source::EntryStream;

/// A reusable stream transform.
pub type Operator = Arc<dyn Fn(EntryStream) -> EntryStream + Send + Sync>;

/// Binary combinator used to fold entries that share a destination.
pub type Combine = Arc<dyn Fn(EntryRef, EntryRef) -> Result<EntryRef> + Send + Sync>;

/// Chain operators left to right.
pub fn compose(operators: Vec<Operator>) -> Operator {
    Arc::new(move |input: EntryStream| {
        operators
            .iter()
            .fold(input, |stream, operator| operator(stream))
    })
}

/// Deduplicate-by-identity operator - keeps the first entry per destination
pub mod deduplicate {
    use super::*;

    /// Drop every entry whose `(path, name)` was already seen. First writer
    /// wins.
    pub fn apply(input: EntryStream) -> EntryStream {
        let mut seen = HashSet::new();
        input
            .filter(move |item| {
                let keep = match item {
                    Ok(entry) => {
                        let key = entry.key();
                        let fresh = !seen.contains(&key);
                        if fresh {
                            seen.insert(key);
                        } else {
                            log::debug!("Dropping duplicate entry {}", key);
                        }
                        fresh
                    }
                    Err(_) => true,
                };
                future::ready(keep)
            })
            .boxed()
    }

    pub fn operator() -> Operator {
        Arc::new(apply)
    }
}

/// Merge-duplicates operator - folds entries sharing a destination
pub mod merge_duplicates {
    use super::*;

    /// Group the stream by destination and left-fold each group through
    /// `combine`. One entry is emitted per group, in order of each group's
    /// first occurrence, once the input is exhausted.
    pub fn apply(input: EntryStream, combine: Combine) -> EntryStream {
        stream::once(fold_groups(input, combine))
            .flat_map(stream::iter)
            .boxed()
    }

    async fn fold_groups(mut input: EntryStream, combine: Combine) -> Vec<Result<EntryRef>> {
        let mut groups: Vec<EntryRef> = Vec::new();
        let mut index: HashMap<String, usize> = HashMap::new();
        while let Some(item) = input.next().await {
            let entry = match item {
                Ok(entry) => entry,
                Err(err) => return vec![Err(err)],
            };
            let key = entry.key();
            match index.get(&key) {
                Some(&slot) => match combine(groups[slot].clone(), entry) {
                    Ok(combined) => groups[slot] = combined,
                    Err(err) => return vec![Err(err)],
                },
                None => {
                    index.insert(key, groups.len());
                    groups.push(entry);
                }
            }
        }
        groups.into_iter().map(Ok).collect()
    }

    pub fn operator(combine: Combine) -> Operator {
        Arc::new(move |input| apply(input, combine.clone()))
    }
}

/// Concat-duplicates operator - concatenates entries sharing a destination
pub mod concat_duplicates {
    use super::*;
    use crate::entry::ConcatEntry;

    pub fn apply(input: EntryStream) -> EntryStream {
        merge_duplicates::apply(input, combiner())
    }

    fn combiner() -> Combine {
        Arc::new(|a: EntryRef, b: EntryRef| -> Result<EntryRef> {
            Ok(Arc::new(ConcatEntry::new(a, b)?))
        })
    }

    pub fn operator() -> Operator {
        Arc::new(apply)
    }
}

/// Merge-JSON-duplicates operator - deep-merges JSON entries sharing a destination
pub mod merge_json_duplicates {
    use super::*;
    use crate::entry::MergeJsonEntry;

    /// Later entries win on conflicting keys. `indent` is passed to
    /// [`MergeJsonEntry`].
    pub fn apply(input: EntryStream, indent: usize) -> EntryStream {
        let combine: Combine = Arc::new(move |a: EntryRef, b: EntryRef| -> Result<EntryRef> {
            Ok(Arc::new(MergeJsonEntry::new(a, b, indent)?))
        });
        merge_duplicates::apply(input, combine)
    }

    pub fn operator(indent: usize) -> Operator {
        Arc::new(move |input| apply(input, indent))
    }
}

/// Path-remap operator - substitutes tokens in entry paths and names
pub mod path_remap {
    use super::*;
    use crate::compiler::{default_token, remap, token_regex};
    use regex::Regex;

    /// Token pattern and strictness for [`apply`].
    #[derive(Debug, Clone)]
    pub struct PathRemapOptions {
        pub token: Regex,
        pub strict: bool,
    }

    impl Default for PathRemapOptions {
        fn default() -> Self {
            Self {
                token: default_token(),
                strict: false,
            }
        }
    }

    impl PathRemapOptions {
        /// A custom token pattern; its first capture group names the key.
        pub fn new(pattern: &str, strict: bool) -> Result<Self> {
            Ok(Self {
                token: token_regex(pattern)?,
                strict,
            })
        }
    }

    /// Replace tokens in every entry's path and name using `ctx`. Unknown
    /// keys become "" unless `options.strict` is set, in which case the
    /// entry is replaced by an `UnknownKey` error.
    pub fn apply(input: EntryStream, ctx: Context, options: PathRemapOptions) -> EntryStream {
        input
            .map(move |item| {
                item.and_then(|entry| remap(&options.token, options.strict, &entry, &ctx))
            })
            .boxed()
    }

    pub fn operator(ctx: Context, options: PathRemapOptions) -> Operator {
        Arc::new(move |input| apply(input, ctx.clone(), options.clone()))
    }
}

/// Prepend-root operator - roots relative entries under a directory
pub mod prepend_root {
    use super::*;

    /// Move every relative entry under `root`. Absolute entries pass
    /// through unchanged.
    pub fn apply(input: EntryStream, root: String) -> EntryStream {
        input
            .map(move |item| {
                item.map(|entry| {
                    if path::is_absolute(entry.path()) {
                        return entry;
                    }
                    let rooted = path::prepend_root(&root, entry.path());
                    Arc::new(MoveEntry::new(entry, Some(&rooted), None)) as EntryRef
                })
            })
            .boxed()
    }

    pub fn operator(root: impl Into<String>) -> Operator {
        let root = root.into();
        Arc::new(move |input| apply(input, root.clone()))
    }
}

/// Template-render operator - renders entry contents with a renderer
pub mod render_templates {
    use super::*;
    use crate::entry::StaticEntry;
    use crate::error::Error;
    use crate::template::{Renderer, TemplateRenderer};

    /// Render each entry's content with `renderer` against `ctx`. Entries
    /// without content pass through.
    pub fn apply(input: EntryStream, ctx: Context, renderer: Arc<dyn Renderer>) -> EntryStream {
        input
            .map(move |item: Result<EntryRef>| -> Result<EntryRef> {
                let entry = item?;
                let text = match entry.content()? {
                    Some(text) => text,
                    None => return Ok(entry),
                };
                let rendered = renderer.render(&text, &ctx).map_err(|err| match err {
                    Error::Template { message, .. } => Error::Template {
                        message,
                        entry: Some(entry.key()),
                    },
                    other => other,
                })?;
                Ok(StaticEntry::new(entry.path(), entry.name(), rendered).into_ref())
            })
            .boxed()
    }

    pub fn operator(ctx: Context) -> Operator {
        let renderer: Arc<dyn Renderer> = Arc::new(TemplateRenderer::default());
        Arc::new(move |input| apply(input, ctx.clone(), renderer.clone()))
    }
}

/// Exclude operator - drops entries whose destination matches a glob
pub mod exclude {
    use super::*;
    use glob::Pattern;

    /// Fails if any pattern is not a valid glob.
    pub fn apply(input: EntryStream, patterns: &[&str]) -> Result<EntryStream> {
        let patterns = patterns
            .iter()
            .map(|p| Pattern::new(p))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(input
            .filter(move |item| {
                let keep = match item {
                    Ok(entry) => {
                        let key = entry.key();
                        !patterns.iter().any(|p| p.matches(&key))
                    }
                    Err(_) => true,
                };
                future::ready(keep)
            })
            .boxed())
    }
}

/// Splice operator - applies a sub-pipeline to a partition of the stream
pub mod splice {
    use super::*;

    /// Predicate selecting the entries routed through the sub-pipeline.
    pub type Predicate = Arc<dyn Fn(&dyn Entry) -> bool + Send + Sync>;

    /// Route entries matching `predicate` through `transform` and merge the
    /// result with the untouched entries. Order across the two partitions is
    /// not preserved. Errors go to the untouched partition.
    pub fn apply(input: EntryStream, predicate: Predicate, transform: Operator) -> EntryStream {
        let (matched_tx, matched_rx) = mpsc::unbounded();
        let (rest_tx, rest_rx) = mpsc::unbounded();
        let pump = input.for_each(move |item| {
            let tx = match &item {
                Ok(entry) if predicate(entry.as_ref()) => &matched_tx,
                _ => &rest_tx,
            };
            // A closed receiver means the consumer stopped reading.
            let _ = tx.unbounded_send(item);
            future::ready(())
        });
        let pump = pump
            .into_stream()
            .filter_map(|()| future::ready(None::<Result<EntryRef>>));
        let matched = transform(matched_rx.boxed());
        stream::select(stream::select(matched, rest_rx), pump).boxed()
    }

    pub fn operator(predicate: Predicate, transform: Operator) -> Operator {
        Arc::new(move |input| apply(input, predicate.clone(), transform.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context;
    use crate::entry::StaticEntry;
    use crate::error::Error;
    use crate::source::from_entries;
    use futures::TryStreamExt;

    fn e(path: &str, name: &str, content: &str) -> EntryRef {
        StaticEntry::new(path, name, content).into_ref()
    }

    async fn contents(stream: EntryStream) -> Vec<(String, String)> {
        stream
            .map_ok(|entry| (entry.key(), entry.content().unwrap().unwrap_or_default()))
            .try_collect()
            .await
            .unwrap()
    }

    mod deduplicate_tests {
        use super::*;

        #[tokio::test]
        async fn test_first_writer_wins() {
            let input = from_entries(vec![e("/", "a", "1"), e("/", "b", "2"), e("/", "a", "3")]);
            let out = contents(deduplicate::apply(input)).await;
            assert_eq!(
                out,
                vec![("a".to_string(), "1".to_string()), ("b".to_string(), "2".to_string())]
            );
        }

        #[tokio::test]
        async fn test_passes_errors_through() {
            let input = stream::iter(vec![
                Ok(e("/", "a", "1")),
                Err(Error::Sink {
                    message: "x".to_string(),
                }),
            ])
            .boxed();
            let items: Vec<_> = deduplicate::apply(input).collect().await;
            assert_eq!(items.len(), 2);
            assert!(items[1].is_err());
        }
    }

    mod merge_duplicates_tests {
        use super::*;
        use crate::source::{chain, MemoryMap, MemorySource, Source};

        #[tokio::test]
        async fn test_concat_across_three_sources() {
            let sources: Vec<Box<dyn Source>> = ["X1", "X2", "X3"]
                .iter()
                .map(|c| {
                    Box::new(MemorySource::new(
                        MemoryMap::new().dir("blue", MemoryMap::new().file("file1", *c)),
                    )) as Box<dyn Source>
                })
                .collect();
            let out = contents(concat_duplicates::apply(chain(sources))).await;
            assert_eq!(out, vec![("blue/file1".to_string(), "X1X2X3".to_string())]);
        }

        #[tokio::test]
        async fn test_groups_emitted_in_first_seen_order() {
            let input = from_entries(vec![
                e("/", "b", "b1"),
                e("/", "a", "a1"),
                e("/", "b", "b2"),
            ]);
            let out = contents(concat_duplicates::apply(input)).await;
            assert_eq!(
                out,
                vec![("b".to_string(), "b1b2".to_string()), ("a".to_string(), "a1".to_string())]
            );
        }

        #[tokio::test]
        async fn test_merge_json_duplicates() {
            let input = from_entries(vec![
                e("/", "package.json", r#"{"name":"a","scripts":{"build":"x"}}"#),
                e("/", "package.json", r#"{"name":"b","scripts":{"test":"y"}}"#),
            ]);
            let out = contents(merge_json_duplicates::apply(input, 0)).await;
            assert_eq!(
                out[0].1,
                r#"{"name":"b","scripts":{"build":"x","test":"y"}}"#
            );
        }

        #[tokio::test]
        async fn test_combine_error_ends_stream() {
            let combine: Combine = Arc::new(|_, _| {
                Err(Error::Merge {
                    operation: "test".to_string(),
                    message: "no".to_string(),
                })
            });
            let input = from_entries(vec![e("/", "a", "1"), e("/", "a", "2")]);
            let items: Vec<_> = merge_duplicates::apply(input, combine).collect().await;
            assert_eq!(items.len(), 1);
            assert!(items[0].is_err());
        }
    }

    mod path_remap_tests {
        use super::*;

        #[tokio::test]
        async fn test_remaps_path_and_name() {
            let input = from_entries(vec![e("a__name__b", "__name__.txt", "c")]);
            let out = contents(path_remap::apply(
                input,
                context! { "name" => "world" },
                path_remap::PathRemapOptions::default(),
            ))
            .await;
            assert_eq!(out[0].0, "aworldb/world.txt");
        }

        #[tokio::test]
        async fn test_strict_unknown_key() {
            let input = from_entries(vec![e("__missing__", "f", "")]);
            let options = path_remap::PathRemapOptions::new("__(.*?)__", true).unwrap();
            let items: Vec<_> = path_remap::apply(input, Context::new(), options).collect().await;
            assert!(matches!(items[0], Err(Error::UnknownKey { .. })));
        }

        #[tokio::test]
        async fn test_lenient_unknown_key_is_empty() {
            let input = from_entries(vec![e("x__missing__y", "f", "")]);
            let out = contents(path_remap::apply(
                input,
                Context::new(),
                path_remap::PathRemapOptions::default(),
            ))
            .await;
            assert_eq!(out[0].0, "xy/f");
        }
    }

    mod prepend_root_tests {
        use super::*;

        #[tokio::test]
        async fn test_relative_paths_are_rooted() {
            let input = from_entries(vec![e("src", "a", ""), e("/", "b", ""), e("/etc", "c", "")]);
            let keys: Vec<String> = contents(prepend_root::apply(input, "app".to_string()))
                .await
                .into_iter()
                .map(|(k, _)| k)
                .collect();
            assert_eq!(keys, vec!["app/src/a", "app/b", "/etc/c"]);
        }
    }

    mod render_templates_tests {
        use super::*;

        #[tokio::test]
        async fn test_renders_content() {
            let input = from_entries(vec![
                e("/", "a", "hello <%= str %>"),
                e("/", "b", "number: <%= nb * 2 %>"),
            ]);
            let op = render_templates::operator(context! { "str" => "world", "nb" => 4 });
            let out = contents(op(input)).await;
            assert_eq!(out[0].1, "hello world");
            assert_eq!(out[1].1, "number: 8");
        }
    }

    mod exclude_tests {
        use super::*;

        #[tokio::test]
        async fn test_excludes_matching_keys() {
            let input = from_entries(vec![e("src", "a.rs", ""), e("/", "debug.log", ""), e("/", "b.rs", "")]);
            let out = contents(exclude::apply(input, &["*.log"]).unwrap()).await;
            let keys: Vec<_> = out.into_iter().map(|(k, _)| k).collect();
            assert_eq!(keys, vec!["src/a.rs", "b.rs"]);
        }

        #[test]
        fn test_invalid_pattern() {
            assert!(exclude::apply(from_entries(vec![]), &["[unclosed"]).is_err());
        }
    }

    mod splice_tests {
        use super::*;

        #[tokio::test]
        async fn test_transforms_only_matching_partition() {
            let input = from_entries(vec![
                e("/", "a.json", r#"{"a":1}"#),
                e("/", "notes.txt", "n1"),
                e("/", "a.json", r#"{"b":2}"#),
                e("/", "notes.txt", "n2"),
            ]);
            let is_json: splice::Predicate = Arc::new(|entry| entry.name().ends_with(".json"));
            let mut out = contents(splice::apply(input, is_json, merge_json_duplicates::operator(0))).await;
            out.sort();
            assert_eq!(
                out,
                vec![
                    ("a.json".to_string(), r#"{"a":1,"b":2}"#.to_string()),
                    ("notes.txt".to_string(), "n1".to_string()),
                    ("notes.txt".to_string(), "n2".to_string()),
                ]
            );
        }
    }

    mod compose_tests {
        use super::*;

        #[tokio::test]
        async fn test_compose_runs_left_to_right() {
            let pipeline = compose(vec![
                path_remap::operator(context! { "n" => "x" }, path_remap::PathRemapOptions::default()),
                deduplicate::operator(),
                prepend_root::operator("out"),
            ]);
            let input = from_entries(vec![e("/", "__n__", "1"), e("/", "x", "2")]);
            let out = contents(pipeline(input)).await;
            assert_eq!(out, vec![("out/x".to_string(), "1".to_string())]);
        }
    }
}
