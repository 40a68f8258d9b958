//! Path segment placeholders.
//!
//! Placeholders take the form `{name}` (matches anything) or
//! `{<name>pattern}` (matches a custom regular expression).

use std::collections::HashMap;

use regex::Regex;
use thiserror::Error;

const WILDCARD: &str = ".*";

/// Errors raised while compiling or extracting segments.
#[derive(Debug, Error)]
pub enum SegmentError {
    #[error("Duplicate segment ID found: '{name}' in path '{path}'")]
    Duplicate { name: String, path: String },

    #[error("{0} must not be blank")]
    Blank(&'static str),

    #[error("Invalid segment pattern in '{path}': {source}")]
    InvalidPattern {
        path: String,
        #[source]
        source: regex::Error,
    },
}

/// A single placeholder as written in the path.
struct Placeholder<'a> {
    /// Byte range of the whole `{...}` token.
    start: usize,
    end: usize,
    name: &'a str,
    /// Custom pattern, `None` for the bare `{name}` form.
    pattern: Option<&'a str>,
}

impl<'a> Placeholder<'a> {
    fn parse(body: &'a str, start: usize, end: usize) -> Self {
        if let Some(rest) = body.strip_prefix('<') {
            if let Some(close) = rest.find('>') {
                let pattern = &rest[close + 1..];
                if !pattern.is_empty() {
                    return Self {
                        start,
                        end,
                        name: &rest[..close],
                        pattern: Some(pattern),
                    };
                }
            }
        }
        Self {
            start,
            end,
            name: body,
            pattern: None,
        }
    }
}

/// Byte offset just past the `}` closing the brace at `open`.
///
/// Nested braces (regex quantifiers such as `{3,5}`) are balanced and
/// backslash escapes are skipped.
fn closing_brace(path: &str, open: usize) -> Option<usize> {
    let bytes = path.as_bytes();
    let mut depth = 0usize;
    let mut i = open;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 1,
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i + 1);
                }
            }
            _ => {}
        }
        i += 1;
    }
    None
}

/// Every placeholder in `path`, left to right.
///
/// An unbalanced or empty `{...}` is left as literal text.
fn placeholders(path: &str) -> Vec<Placeholder<'_>> {
    let mut found = Vec::new();
    let mut cursor = 0;
    while let Some(offset) = path[cursor..].find('{') {
        let open = cursor + offset;
        match closing_brace(path, open) {
            Some(end) if end - open > 2 => {
                found.push(Placeholder::parse(&path[open + 1..end - 1], open, end));
                cursor = end;
            }
            _ => cursor = open + 1,
        }
    }
    found
}

/// Escape the regex metacharacters that may appear in literal path text.
fn escape_literal(literal: &str, out: &mut String) {
    for c in literal.chars() {
        if matches!(c, '.' | '*' | '(' | ')') {
            out.push('\\');
        }
        out.push(c);
    }
}

/// Turn a placeholder path into a regular expression.
///
/// Paths without a trailing slash accept one optionally.
pub fn replace_segments_with_regex(path: &str) -> String {
    let mut result = String::with_capacity(path.len() + 8);
    let mut last_end = 0;

    for placeholder in placeholders(path) {
        escape_literal(&path[last_end..placeholder.start], &mut result);
        match placeholder.pattern {
            // grouped so an alternation stays inside its segment
            Some(pattern) => {
                result.push_str("(?:");
                result.push_str(pattern);
                result.push(')');
            }
            None => result.push_str(WILDCARD),
        }
        last_end = placeholder.end;
    }
    escape_literal(&path[last_end..], &mut result);

    if !path.ends_with('/') {
        result.push_str("/?");
    }
    result
}

/// Ordered placeholder names of `path`, rejecting duplicates.
pub fn segment_names(path: &str) -> Result<Vec<String>, SegmentError> {
    let mut names: Vec<String> = Vec::new();
    for placeholder in placeholders(path) {
        let name = placeholder.name;
        if names.iter().any(|n| n == name) {
            return Err(SegmentError::Duplicate {
                name: name.to_string(),
                path: path.to_string(),
            });
        }
        names.push(name.to_string());
    }
    Ok(names)
}

/// Match `actual_path` against `path_template` and collect the placeholder values.
///
/// A path that does not match yields an empty map.
pub fn extract_segment_values(
    path_template: &str,
    actual_path: &str,
) -> Result<HashMap<String, String>, SegmentError> {
    if path_template.trim().is_empty() {
        return Err(SegmentError::Blank("path template"));
    }
    if actual_path.trim().is_empty() {
        return Err(SegmentError::Blank("actual path"));
    }

    let mut template = path_template.to_string();
    let mut actual = actual_path.to_string();
    match (template.ends_with('/'), actual.ends_with('/')) {
        (true, false) => actual.push('/'),
        (false, true) => template.push('/'),
        _ => {}
    }

    let names = segment_names(&template)?;
    if names.is_empty() {
        return Ok(HashMap::new());
    }

    let regex = capturing_regex(&template)?;
    let Some(caps) = regex.captures(&actual) else {
        return Ok(HashMap::new());
    };

    let values = names
        .into_iter()
        .enumerate()
        .filter_map(|(i, name)| {
            caps.name(&group_name(i))
                .map(|m| (name, m.as_str().to_string()))
        })
        .collect();
    Ok(values)
}

fn group_name(index: usize) -> String {
    format!("seg{index}")
}

/// Build an anchored regex with one named group per placeholder.
pub(crate) fn capturing_regex(template: &str) -> Result<Regex, SegmentError> {
    let mut source = String::from("^");
    let mut last_end = 0;

    for (i, placeholder) in placeholders(template).into_iter().enumerate() {
        escape_literal(&template[last_end..placeholder.start], &mut source);
        source.push_str(&format!(
            "(?P<{}>{})",
            group_name(i),
            placeholder.pattern.unwrap_or(WILDCARD)
        ));
        last_end = placeholder.end;
    }
    escape_literal(&template[last_end..], &mut source);
    source.push('$');

    Regex::new(&source).map_err(|source| SegmentError::InvalidPattern {
        path: template.to_string(),
        source,
    })
}
