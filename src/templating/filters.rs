//! Filters and tests: `date`, `j2`, `on`, `off`.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use minijinja::{Error, ErrorKind, State, value::Value};
use std::{collections::BTreeMap, fmt::Write};

pub const DEFAULT_DATE_FORMAT: &str = "%Y-%m-%d";

/// `true/1/y/yes` and `false/0/n/no`, case-insensitive.
pub fn parse_switch(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "y" | "yes" => Some(true),
        "false" | "0" | "n" | "no" => Some(false),
        _ => None,
    }
}

fn switch(value: &Value) -> Result<bool, Error> {
    let text = value.to_string();
    parse_switch(&text).ok_or_else(|| {
        Error::new(
            ErrorKind::InvalidOperation,
            format!("`{text}` is neither on (true/1/y/yes) nor off (false/0/n/no)"),
        )
    })
}

/// `{% if flag is on %}`
pub fn is_on(value: Value) -> Result<bool, Error> {
    switch(&value)
}

/// `{% if flag is off %}`
pub fn is_off(value: Value) -> Result<bool, Error> {
    switch(&value).map(|on| !on)
}

/// `{{ "2017-04-16" | date("%B %-d, %Y") }}` renders `April 16, 2017`.
///
/// `infmt` defaults to `%Y-%m-%d`; it may carry a time part.
pub fn date(value: &str, outfmt: &str, infmt: Option<&str>) -> Result<String, Error> {
    let infmt = infmt.unwrap_or(DEFAULT_DATE_FORMAT);
    let parsed = NaiveDateTime::parse_from_str(value, infmt)
        .or_else(|_| NaiveDate::parse_from_str(value, infmt).map(|d| d.and_time(NaiveTime::MIN)))
        .map_err(|e| {
            Error::new(
                ErrorKind::InvalidOperation,
                format!("date `{value}` does not match `{infmt}`: {e}"),
            )
        })?;

    let mut out = String::new();
    write!(out, "{}", parsed.format(outfmt)).map_err(|_| {
        Error::new(
            ErrorKind::InvalidOperation,
            format!("invalid date format `{outfmt}`"),
        )
    })?;
    Ok(out)
}

/// Render `value` as a template, with the caller's variables or `altctx`.
pub fn j2(state: &State, value: &str, altctx: Option<Value>) -> Result<String, Error> {
    let ctx = match altctx {
        Some(ctx) => ctx,
        None => visible_context(state),
    };
    state.env().render_str(value, ctx)
}

/// Every variable visible from `state`, as one map.
fn visible_context(state: &State) -> Value {
    let vars: BTreeMap<String, Value> = state
        .known_variables()
        .into_iter()
        .filter_map(|name| {
            let value = state.lookup(&name)?;
            Some((name.into_owned(), value))
        })
        .collect();
    Value::from_serialize(&vars)
}

// ============================================================================
// Tests
// ============================================================================
