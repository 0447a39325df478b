//! Post metadata sidecars and the small tools that reshape them.
//!
//! A sidecar is the YAML mapping `front` writes next to every rendered page.
//! `add-refs` attaches the paths of derived files, `combine` gathers sidecars
//! into one index document, `list-drafts` flattens an index's drafts.

use super::write_output;
use crate::error::{BuildError, require_file};
use anyhow::{Context, Result};
use chrono::NaiveDate;
use rayon::prelude::*;
use serde_yaml::{Mapping, Value};
use std::{
    fs,
    path::{Path, PathBuf},
};

/// Tags that keep a post out of feeds and sitemaps.
pub const UNLISTED_TAGS: &[&str] = &["DRAFT", "HIDDEN"];

/// One parsed sidecar.
#[derive(Debug, Clone)]
pub struct Sidecar {
    pub path: PathBuf,
    pub meta: Mapping,
}

impl Sidecar {
    pub fn load(path: &Path) -> Result<Self> {
        let meta = read_mapping(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            meta,
        })
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.meta.get(key)
    }

    /// String field, missing or non-string is a format error.
    pub fn str_field(&self, key: &str) -> Result<&str, BuildError> {
        self.get(key).and_then(Value::as_str).ok_or_else(|| {
            BuildError::format(format!("{}: missing string field `{key}`", self.path.display()))
        })
    }

    /// `tags` as strings; absent means none.
    pub fn tags(&self) -> Vec<&str> {
        match self.get("tags") {
            Some(Value::Sequence(tags)) => tags.iter().filter_map(Value::as_str).collect(),
            Some(Value::String(tag)) => vec![tag.as_str()],
            _ => Vec::new(),
        }
    }

    /// False for drafts and hidden posts.
    pub fn is_listed(&self) -> bool {
        !self.tags().iter().any(|t| UNLISTED_TAGS.contains(t))
    }

    pub fn date(&self) -> Result<NaiveDate, BuildError> {
        let raw = self.str_field("date")?;
        NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|e| {
            BuildError::format(format!("{}: bad date `{raw}`: {e}", self.path.display()))
        })
    }

    /// `refs.<name>`, as recorded by `add-refs`.
    pub fn reference(&self, name: &str) -> Result<&str, BuildError> {
        self.get("refs")
            .and_then(|refs| refs.get(name))
            .and_then(Value::as_str)
            .ok_or_else(|| {
                BuildError::format(format!("{}: missing `refs.{name}`", self.path.display()))
            })
    }

    /// Published URL: `puburl`, else `url`.
    pub fn public_url(&self) -> Result<&str, BuildError> {
        self.get("puburl")
            .and_then(Value::as_str)
            .map_or_else(|| self.str_field("url"), Ok)
    }
}

/// Load every sidecar in parallel, keeping argument order.
pub fn load_all(paths: &[PathBuf]) -> Result<Vec<Sidecar>> {
    paths.par_iter().map(|p| Sidecar::load(p)).collect()
}

fn read_mapping(path: &Path) -> Result<Mapping> {
    let path = require_file(path)?;
    let text = fs::read_to_string(&path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    match serde_yaml::from_str::<Value>(&text) {
        Ok(Value::Mapping(map)) => Ok(map),
        Ok(Value::Null) => Ok(Mapping::new()),
        Ok(_) => Err(BuildError::format(format!("{}: expected a YAML mapping", path.display())).into()),
        Err(e) => Err(BuildError::format(format!("{}: {e}", path.display())).into()),
    }
}

fn dump(map: &Mapping) -> Result<String> {
    serde_yaml::to_string(map).context("Failed to serialize YAML")
}

// ============================================================================
// Commands
// ============================================================================

/// `main` plus `posts`: every sidecar, newest `date` first.
pub fn combine(main: &Path, posts: &[PathBuf]) -> Result<Mapping> {
    let mut main = read_mapping(main)?;
    let mut posts = load_all(posts)?;

    let dates = posts
        .iter()
        .map(|p| p.str_field("date").map(str::to_owned))
        .collect::<Result<Vec<_>, _>>()?;
    let mut order: Vec<usize> = (0..posts.len()).collect();
    order.sort_by(|&a, &b| dates[b].cmp(&dates[a]));

    let sorted: Vec<Value> = order
        .into_iter()
        .map(|i| Value::Mapping(std::mem::take(&mut posts[i].meta)))
        .collect();
    main.insert(Value::from("posts"), Value::Sequence(sorted));
    Ok(main)
}

/// `quire combine`
pub fn run_combine(output: &Path, main: &Path, posts: &[PathBuf]) -> Result<()> {
    let combined = combine(main, posts)?;
    write_output("combine", output, &dump(&combined)?)
}

/// Pair up `NAME FILE` arguments.
pub fn pair_refs(flags: &[String]) -> Result<Mapping, BuildError> {
    if flags.len() % 2 != 0 {
        return Err(BuildError::argument(format!(
            "references come in NAME FILE pairs, got {} values",
            flags.len()
        )));
    }
    Ok(flags
        .chunks_exact(2)
        .map(|pair| (Value::from(pair[0].as_str()), Value::from(pair[1].as_str())))
        .collect())
}

/// `quire add-refs`
pub fn run_add_refs(main: &Path, output: &Path, flags: &[String]) -> Result<()> {
    let refs = pair_refs(flags)?;
    let mut main = read_mapping(main)?;
    main.insert(Value::from("refs"), Value::Mapping(refs));
    write_output("refs", output, &dump(&main)?)
}

/// `public_html` of every entry under `drafts`.
pub fn drafts(combined: &Mapping, source: &Path) -> Result<Vec<String>, BuildError> {
    let missing = || BuildError::format(format!("{}: missing `drafts` list", source.display()));
    let list = combined
        .get("drafts")
        .and_then(Value::as_sequence)
        .ok_or_else(missing)?;
    list.iter()
        .map(|post| {
            post.get("public_html")
                .and_then(Value::as_str)
                .map(str::to_owned)
                .ok_or_else(|| {
                    BuildError::format(format!("{}: draft without `public_html`", source.display()))
                })
        })
        .collect()
}

/// `quire list-drafts`
pub fn run_list_drafts(combined: &Path, output: &Path) -> Result<()> {
    let map = read_mapping(combined)?;
    let lines: String = drafts(&map, combined)?
        .into_iter()
        .map(|line| line + "\n")
        .collect();
    write_output("drafts", output, &lines)
}

// ============================================================================
// Tests
// ============================================================================
