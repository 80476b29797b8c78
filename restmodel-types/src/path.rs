//! Dotted attribute paths.
//!
//! Paths address values inside nested JSON objects: `dim.width` is the
//! `width` key of the `dim` object. A `[]` suffix on a segment addresses every
//! element of an array (`parts[].name`). Rules are registered against these
//! paths; the helpers below read and write the trees they point into.

use crate::{Error, Result};
use serde_json::{Map, Value};

/// Separator between path segments.
pub const SEPARATOR: char = '.';

/// Suffix marking "every element of this array".
pub const ARRAY_MARKER: &str = "[]";

/// Splits and validates a dotted path. Empty segments are rejected.
pub fn parse(path: &str) -> Result<Vec<String>> {
    let segments: Vec<String> = path.split(SEPARATOR).map(str::to_string).collect();
    if segments.iter().any(|s| s.is_empty()) {
        return Err(Error::InvalidPath(path.to_string()));
    }
    Ok(segments)
}

/// Joins a parent node and a leaf name. The root node is the empty string.
pub fn join(node: &str, leaf: &str) -> String {
    if node.is_empty() {
        leaf.to_string()
    } else {
        format!("{node}{SEPARATOR}{leaf}")
    }
}

/// Splits a path into its parent node and leaf (`"a.b.c"` → `("a.b", "c")`).
pub fn split_leaf(path: &str) -> (&str, &str) {
    match path.rfind(SEPARATOR) {
        Some(idx) => (&path[..idx], &path[idx + 1..]),
        None => ("", path),
    }
}

/// Returns the node used for the elements of the array at `path`.
pub fn element_node(path: &str) -> String {
    format!("{path}{ARRAY_MARKER}")
}

/// Removes every array marker (`"parts[].name"` → `"parts.name"`).
pub fn strip_array_markers(path: &str) -> String {
    path.replace(ARRAY_MARKER, "")
}

/// Returns true when `a` and `b` are equal or one is an ancestor of the other.
///
/// Array markers are ignored, so `parts[].name` is related to `parts`.
pub fn is_related(a: &str, b: &str) -> bool {
    let a = strip_array_markers(a);
    let b = strip_array_markers(b);
    a == b || is_prefix(&a, &b) || is_prefix(&b, &a)
}

fn is_prefix(ancestor: &str, path: &str) -> bool {
    path.len() > ancestor.len()
        && path.starts_with(ancestor)
        && path[ancestor.len()..].starts_with(SEPARATOR)
}

/// Reads the value at `segments`, descending through objects only.
pub fn extract<'a, S: AsRef<str>>(value: &'a Value, segments: &[S]) -> Option<&'a Value> {
    segments
        .iter()
        .try_fold(value, |current, seg| current.as_object()?.get(seg.as_ref()))
}

/// Like [`extract`], starting from an object's entries.
pub fn extract_from<'a, S: AsRef<str>>(
    map: &'a Map<String, Value>,
    segments: &[S],
) -> Option<&'a Value> {
    let (first, rest) = segments.split_first()?;
    extract(map.get(first.as_ref())?, rest)
}

/// Reads the value at a dotted path.
pub fn extract_path<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    extract(value, &path.split(SEPARATOR).collect::<Vec<_>>())
}

/// Writes `value` at `segments`, creating intermediate objects as needed.
///
/// An intermediate that exists but is not an object is replaced.
pub fn insert<S: AsRef<str>>(target: &mut Map<String, Value>, segments: &[S], value: Value) {
    let Some((last, parents)) = segments.split_last() else {
        return;
    };
    let mut current = target;
    for seg in parents {
        let slot = current
            .entry(seg.as_ref().to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if !slot.is_object() {
            *slot = Value::Object(Map::new());
        }
        let Value::Object(map) = slot else {
            return;
        };
        current = map;
    }
    current.insert(last.as_ref().to_string(), value);
}

/// Writes `value` at a dotted path.
pub fn insert_path(target: &mut Map<String, Value>, path: &str, value: Value) {
    insert(target, &path.split(SEPARATOR).collect::<Vec<_>>(), value);
}

/// Removes the value at a dotted path, returning how many values were removed.
///
/// A segment ending in `[]` fans out over every element of that array, so
/// `items[].tmp` removes `tmp` from each element of `items`.
pub fn remove_path(target: &mut Map<String, Value>, path: &str) -> usize {
    let segments: Vec<&str> = path.split(SEPARATOR).collect();
    remove_in(target, &segments)
}

fn remove_in(target: &mut Map<String, Value>, segments: &[&str]) -> usize {
    let Some((first, rest)) = segments.split_first() else {
        return 0;
    };
    let (key, fan_out) = match first.strip_suffix(ARRAY_MARKER) {
        Some(key) => (key, true),
        None => (*first, false),
    };

    if rest.is_empty() && !fan_out {
        return usize::from(target.remove(key).is_some());
    }

    match (target.get_mut(key), fan_out) {
        (Some(Value::Array(items)), true) => items
            .iter_mut()
            .filter_map(Value::as_object_mut)
            .map(|item| remove_in(item, rest))
            .sum(),
        (Some(Value::Object(inner)), false) => remove_in(inner, rest),
        _ => 0,
    }
}
