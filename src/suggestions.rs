//! # Error Suggestions
//!
//! Helpers for error messages that say what went wrong and how to fix it.

use std::path::Path;

/// Generate an error for when no collection manifest is found.
///
/// Includes hints about:
/// - Creating a collection manifest
/// - Using the --collection flag
/// - Using the SCHEMATICS_COLLECTION environment variable
pub fn collection_not_found(path: &Path) -> anyhow::Error {
    anyhow::anyhow!(
        "Collection not found: {path}\n\n\
         hint: Create a collection.json describing your schematics\n\
         hint: Use --collection to specify a different path\n\
         hint: Set SCHEMATICS_COLLECTION environment variable",
        path = path.display()
    )
}

/// Generate an error for a generator name the collection does not define.
///
/// Lists the available names, with a suggestion when one is close.
pub fn unknown_schematic(name: &str, available: &[&str]) -> anyhow::Error {
    let did_you_mean = find_similar(name, available)
        .map(|s| format!("\nhint: Did you mean '{s}'?"))
        .unwrap_or_default();
    let listing = if available.is_empty() {
        "The collection defines no schematics".to_string()
    } else {
        format!("Available schematics are: {}", available.join(", "))
    };
    anyhow::anyhow!(
        "Unknown schematic: {name}{did_you_mean}\n\n\
         {listing}\n\
         hint: Run 'schematics list' to see descriptions"
    )
}

/// Find a similar string from a list of candidates using edit distance.
///
/// Returns Some(candidate) if a close match is found (edit distance <= 2).
pub fn find_similar<'a>(input: &str, candidates: &[&'a str]) -> Option<&'a str> {
    candidates
        .iter()
        .filter_map(|&candidate| {
            let distance = edit_distance(input, candidate);
            if distance <= 2 && distance < input.len() {
                Some((candidate, distance))
            } else {
                None
            }
        })
        .min_by_key(|(_, distance)| *distance)
        .map(|(candidate, _)| candidate)
}

/// Levenshtein edit distance between two strings.
fn edit_distance(a: &str, b: &str) -> usize {
    let a_chars: Vec<char> = a.chars().collect();
    let b_chars: Vec<char> = b.chars().collect();
    if a_chars.is_empty() {
        return b_chars.len();
    }
    if b_chars.is_empty() {
        return a_chars.len();
    }

    // Single rolling row; previous[j] is the distance from a[..i] to b[..j].
    let mut previous: Vec<usize> = (0..=b_chars.len()).collect();
    let mut current = vec![0usize; b_chars.len() + 1];
    for (i, a_char) in a_chars.iter().enumerate() {
        current[0] = i + 1;
        for (j, b_char) in b_chars.iter().enumerate() {
            let cost = usize::from(a_char != b_char);
            current[j + 1] = (previous[j + 1] + 1)
                .min(current[j] + 1)
                .min(previous[j] + cost);
        }
        std::mem::swap(&mut previous, &mut current);
    }
    previous[b_chars.len()]
}
