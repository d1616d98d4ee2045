//! JSONC support: comment and trailing-comma stripping
//!
//! devcontainer.json and devcontainer-feature.json are "JSON with comments".
//! Both `//` line comments and `/* */` block comments are removed, as are
//! trailing commas before `}` or `]`, so the result parses as strict JSON.

use crate::{ConfigError, Result};
use serde_json::{Map, Value};

/// Strip JSON comments (// and /* */) and trailing commas
pub fn strip_json_comments(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();
    let mut in_string = false;
    let mut escape_next = false;

    while let Some(c) = chars.next() {
        if escape_next {
            result.push(c);
            escape_next = false;
            continue;
        }

        if c == '\\' && in_string {
            result.push(c);
            escape_next = true;
            continue;
        }

        if c == '"' {
            in_string = !in_string;
            result.push(c);
            continue;
        }

        if in_string {
            result.push(c);
            continue;
        }

        if c == '/' {
            match chars.peek() {
                Some('/') => {
                    chars.next();
                    while let Some(&nc) = chars.peek() {
                        if nc == '\n' {
                            break;
                        }
                        chars.next();
                    }
                    continue;
                }
                Some('*') => {
                    chars.next();
                    let mut prev = '\0';
                    for nc in chars.by_ref() {
                        if prev == '*' && nc == '/' {
                            break;
                        }
                        prev = nc;
                    }
                    // keep tokens on either side of the comment apart
                    result.push(' ');
                    continue;
                }
                _ => {}
            }
        }

        if c == '}' || c == ']' {
            drop_trailing_comma(&mut result);
        }

        result.push(c);
    }

    result
}

/// Remove a `,` that is followed only by whitespace at the end of `out`
fn drop_trailing_comma(out: &mut String) {
    let trimmed_len = out.trim_end().len();
    if out[..trimmed_len].ends_with(',') {
        out.replace_range(trimmed_len - 1..trimmed_len, "");
    }
}

/// Parse JSONC bytes into a JSON object
pub fn parse_object(bytes: &[u8]) -> Result<Map<String, Value>> {
    let text = String::from_utf8_lossy(bytes);
    let stripped = strip_json_comments(&text);
    let value: Value = serde_json::from_str(&stripped)?;

    match value {
        Value::Object(map) => Ok(map),
        other => Err(ConfigError::InvalidRoot(kind_name(&other))),
    }
}

pub(crate) fn kind_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
