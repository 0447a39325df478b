//! Template prelude: the variables every page template starts with.
//!
//! Page and site metadata are written as map literals, so templates see
//! them as read-only key-value maps (`page.title`, `site.url`) built once
//! per render.

use serde_yaml::{Mapping, Value};
use std::fmt::Write;

/// Prelude assigning `page`, `site` and `isexcerpt`, then the import lines.
pub struct Prelude<'a> {
    pub page: &'a Mapping,
    pub site: &'a Value,
    pub imports: &'a [String],
}

impl Prelude<'_> {
    pub fn render(&self, isexcerpt: bool) -> String {
        let mut out = String::with_capacity(256);
        out.push_str("{% set page = ");
        write_mapping(&mut out, self.page);
        out.push_str(" %}\n{% set site = ");
        write_literal(&mut out, self.site);
        out.push_str(" %}\n");
        let _ = writeln!(out, "{{% set isexcerpt = {isexcerpt} %}}");
        for line in self.imports {
            out.push_str(line);
            out.push('\n');
        }
        out
    }
}

/// Write `value` as a template expression literal.
pub fn write_literal(out: &mut String, value: &Value) {
    match value {
        Value::Null => out.push_str("none"),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                let _ = write!(out, "{i}");
            } else if let Some(u) = n.as_u64() {
                let _ = write!(out, "{u}");
            } else {
                match n.as_f64() {
                    Some(f) if f.is_finite() => {
                        let _ = write!(out, "{f:?}");
                    }
                    _ => out.push_str("none"),
                }
            }
        }
        Value::String(s) => write_string(out, s),
        Value::Sequence(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                write_literal(out, item);
            }
            out.push(']');
        }
        Value::Mapping(mapping) => write_mapping(out, mapping),
        Value::Tagged(tagged) => write_literal(out, &tagged.value),
    }
}

fn write_mapping(out: &mut String, mapping: &Mapping) {
    out.push('{');
    for (i, (key, value)) in mapping.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        match key {
            Value::String(s) => write_string(out, s),
            other => write_string(out, &scalar_key(other)),
        }
        out.push_str(": ");
        write_literal(out, value);
    }
    out.push('}');
}

/// Non-string keys (`2020: ...`) become their text form.
fn scalar_key(key: &Value) -> String {
    match key {
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => "null".into(),
        other => serde_yaml::to_string(other)
            .map(|s| s.trim_end().to_owned())
            .unwrap_or_default(),
    }
}

/// Quoted string literal for `s`.
pub fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    write_string(&mut out, s);
    out
}

fn write_string(out: &mut String, s: &str) {
    // JSON string escapes are a subset of what the template lexer accepts.
    match serde_json::to_string(s) {
        Ok(quoted) => out.push_str(&quoted),
        Err(_) => out.push_str("\"\""),
    }
}
