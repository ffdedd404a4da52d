//! Literal-typed value parsing for the `key=value` property file format.

use std::collections::HashMap;

use crate::error::PipelineError;

#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    Int(i64),
    Float(f64),
    Bool(bool),
    Str(String),
    List(Vec<PropertyValue>),
    Map(HashMap<String, PropertyValue>),
}

pub fn parse_property_file(
    text: &str,
) -> Result<HashMap<String, PropertyValue>, PipelineError> {
    let mut out = HashMap::new();

    for (lineno, raw_line) in text.lines().enumerate() {
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let (key, value) = line.split_once('=').ok_or_else(|| {
            PipelineError::ConfigType {
                key: format!("line {}", lineno + 1),
                expected: "key=value",
            }
        })?;

        out.insert(key.trim().to_string(), parse_value(value.trim()));
    }

    Ok(out)
}

fn parse_value(s: &str) -> PropertyValue {
    if let Some(inner) = brace_inner(s) {
        return PropertyValue::Map(parse_map(inner));
    }
    if let Some(inner) = bracket_inner(s) {
        return PropertyValue::List(parse_list(inner));
    }
    if let Ok(n) = s.parse::<i64>() {
        return PropertyValue::Int(n);
    }
    if let Ok(f) = s.parse::<f64>() {
        return PropertyValue::Float(f);
    }
    match s.to_ascii_lowercase().as_str() {
        "true" => return PropertyValue::Bool(true),
        "false" => return PropertyValue::Bool(false),
        _ => {}
    }
    let unquoted = s
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .or_else(|| s.strip_prefix('\'').and_then(|s| s.strip_suffix('\'')))
        .unwrap_or(s);
    PropertyValue::Str(unquoted.to_string())
}

fn brace_inner(s: &str) -> Option<&str> {
    s.strip_prefix('{').and_then(|s| s.strip_suffix('}'))
}

fn bracket_inner(s: &str) -> Option<&str> {
    s.strip_prefix('[')
        .and_then(|s| s.strip_suffix(']'))
        .or_else(|| s.strip_prefix('(').and_then(|s| s.strip_suffix(')')))
}

/// Splits `a, b, c` (or `a:1, b:2`) respecting one level of nested brackets/braces.
fn split_top_level(s: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut start = 0usize;

    for (i, c) in s.char_indices() {
        match c {
            '[' | '(' | '{' => depth += 1,
            ']' | ')' | '}' => depth -= 1,
            ',' if depth == 0 => {
                parts.push(s[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    let tail = s[start..].trim();
    if !tail.is_empty() {
        parts.push(tail);
    }
    parts
}

fn parse_list(inner: &str) -> Vec<PropertyValue> {
    split_top_level(inner)
        .into_iter()
        .map(parse_value)
        .collect()
}

fn parse_map(inner: &str) -> HashMap<String, PropertyValue> {
    let mut map = HashMap::new();
    for entry in split_top_level(inner) {
        if let Some((k, v)) = entry.split_once(':') {
            map.insert(k.trim().to_string(), parse_value(v.trim()));
        } else {
            log::warn!("ignoring malformed map entry {entry:?} in property file");
        }
    }
    map
}
