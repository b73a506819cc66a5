// SPDX-License-Identifier: MIT

//! `${path.to.value}` placeholder substitution over a JSON context map.

use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;

fn placeholder_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\$\{([^}]+)\}").unwrap_or_else(|e| unreachable!("static pattern: {e}")))
}

/// Resolve a `.`/`[index]` path into a JSON value tree.
///
/// Returns `None` when any segment of the path is missing, which callers
/// treat as "renders as empty" rather than an error.
pub fn resolve_path<'a>(context: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = context;
    for segment in split_path(path) {
        current = match segment {
            PathSegment::Key(key) => current.get(key)?,
            PathSegment::Index(index) => current.get(index)?,
        };
    }
    Some(current)
}

enum PathSegment<'a> {
    Key(&'a str),
    Index(usize),
}

fn split_path(path: &str) -> impl Iterator<Item = PathSegment<'_>> {
    path.split('.').flat_map(|segment| {
        let mut parts = Vec::new();
        let mut rest = segment;
        if let Some(bracket) = rest.find('[') {
            let (key, tail) = rest.split_at(bracket);
            if !key.is_empty() {
                parts.push(PathSegment::Key(key));
            }
            rest = tail;
            while let Some(end) = rest.find(']') {
                let index_str = &rest[1..end];
                if let Ok(index) = index_str.parse::<usize>() {
                    parts.push(PathSegment::Index(index));
                }
                rest = &rest[end + 1..];
            }
        } else if !rest.is_empty() {
            parts.push(PathSegment::Key(rest));
        }
        parts
    })
}

fn value_to_interpolated_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Substitute every `${path}` placeholder in `text` with its resolved value
/// from `context`. A placeholder whose path doesn't resolve renders as an
/// empty string rather than being left verbatim or erroring.
pub fn render(text: &str, context: &Value) -> String {
    placeholder_re()
        .replace_all(text, |caps: &regex::Captures<'_>| {
            let path = caps[1].trim();
            resolve_path(context, path).map(value_to_interpolated_string).unwrap_or_default()
        })
        .into_owned()
}

#[cfg(test)]
#[path = "template_tests.rs"]
mod tests;
