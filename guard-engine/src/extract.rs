//! Recovery of a JSON object from free-form oracle text.
//!
//! Each strategy is a pure function from the raw reply to an optional JSON
//! object. [`extract_object`] tries them in [`STRATEGIES`] order and keeps
//! the first hit carrying a `decision` key. Objects without one are only
//! returned when no strategy finds a better candidate.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};

/// A single extraction heuristic.
pub type Strategy = fn(&str) -> Option<Map<String, Value>>;

/// Strategies in the order they are attempted.
pub const STRATEGIES: [(&str, Strategy); 4] = [
    ("leading_object", leading_object),
    ("fenced_block", fenced_block),
    ("labeled_output", labeled_output),
    ("balanced_scan", balanced_scan),
];

static FENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```[A-Za-z]*[ \t]*\r?\n?(.*?)```").expect("valid fence pattern")
});

static LABEL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:final\s+answer|output|answer|response|result)\s*:")
        .expect("valid label pattern")
});

/// Runs every strategy in order and returns the first object holding a
/// `decision` key, or failing that the first object any strategy found,
/// along with the name of the strategy that produced it.
#[must_use]
pub fn extract_object(text: &str) -> Option<(&'static str, Map<String, Value>)> {
    let mut fallback = None;
    for (name, strategy) in STRATEGIES {
        let Some(object) = strategy(text) else {
            continue;
        };
        if object.contains_key("decision") {
            return Some((name, object));
        }
        fallback.get_or_insert((name, object));
    }
    fallback
}

/// (a) The balanced object the reply opens with. Only whitespace may come
/// before its `{`.
#[must_use]
pub fn leading_object(text: &str) -> Option<Map<String, Value>> {
    let start = text.len() - text.trim_start().len();
    let end = balanced_end(text, start)?;
    parse_object(&text[start..end])
}

/// (b) The body of the first code fence holding an object.
#[must_use]
pub fn fenced_block(text: &str) -> Option<Map<String, Value>> {
    FENCE.captures_iter(text).find_map(|captures| {
        let body = captures.get(1)?.as_str().trim();
        parse_object(body).or_else(|| leading_object(body))
    })
}

/// (c) The object following a label such as `Output:` or `Final answer:`.
#[must_use]
pub fn labeled_output(text: &str) -> Option<Map<String, Value>> {
    LABEL
        .find_iter(text)
        .find_map(|label| leading_object(&text[label.end()..]))
}

/// (d) Every brace-balanced span in the text, preferring one that carries a
/// `decision` key.
#[must_use]
pub fn balanced_scan(text: &str) -> Option<Map<String, Value>> {
    let mut fallback = None;
    for (start, _) in text.match_indices('{') {
        let Some(end) = balanced_end(text, start) else {
            continue;
        };
        if let Some(object) = parse_object(&text[start..end]) {
            if object.contains_key("decision") {
                return Some(object);
            }
            fallback.get_or_insert(object);
        }
    }
    fallback
}

/// Byte index one past the `}` closing the `{` at `start`, skipping braces
/// inside JSON strings.
fn balanced_end(text: &str, start: usize) -> Option<usize> {
    let bytes = text.as_bytes();
    if bytes.get(start) != Some(&b'{') {
        return None;
    }

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (offset, byte) in bytes[start..].iter().copied().enumerate() {
        if in_string {
            match byte {
                _ if escaped => escaped = false,
                b'\\' => escaped = true,
                b'"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match byte {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(start + offset + 1);
                }
            }
            _ => {}
        }
    }
    None
}

fn parse_object(candidate: &str) -> Option<Map<String, Value>> {
    match serde_json::from_str::<Value>(candidate).ok()? {
        Value::Object(object) => Some(object),
        _ => None,
    }
}
