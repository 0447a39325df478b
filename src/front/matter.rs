//! YAML front matter parsing.
//!
//! A document starting with a `---` line carries a YAML mapping up to the
//! next `---` line. Everything after the closing line is the body, kept
//! byte for byte.

use crate::error::BuildError;
use serde_yaml::{Mapping, Value};

const DELIMITER: &str = "---";

/// Split `text` into (front matter, body).
///
/// Text without an opening delimiter has empty metadata and is all body.
pub fn parse(text: &str) -> Result<(Mapping, &str), BuildError> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);

    let Some(rest) = strip_delimiter_line(text) else {
        return Ok((Mapping::new(), text));
    };

    let (yaml, body) = split_at_closing(rest)
        .ok_or_else(|| BuildError::format("front matter is not closed by a `---` line"))?;

    let metadata = match serde_yaml::from_str::<Value>(yaml)
        .map_err(|e| BuildError::format(format!("invalid front matter: {e}")))?
    {
        Value::Mapping(mapping) => mapping,
        Value::Null => Mapping::new(),
        other => {
            return Err(BuildError::format(format!(
                "front matter must be a mapping, got {}",
                kind_of(&other)
            )));
        }
    };

    Ok((metadata, body))
}

/// Remainder after a leading `---` line, if the text starts with one.
fn strip_delimiter_line(text: &str) -> Option<&str> {
    let rest = text.strip_prefix(DELIMITER)?;
    let (line, rest) = rest.split_once('\n').unwrap_or((rest, ""));
    line.trim_end().is_empty().then_some(rest)
}

/// Split at the first line that is exactly `---`.
fn split_at_closing(text: &str) -> Option<(&str, &str)> {
    let mut offset = 0;
    for line in text.split_inclusive('\n') {
        if line.trim_end() == DELIMITER {
            return Some((&text[..offset], &text[offset + line.len()..]));
        }
        offset += line.len();
    }
    None
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Sequence(_) => "a sequence",
        Value::Mapping(_) => "a mapping",
        Value::Tagged(_) => "a tagged value",
    }
}
