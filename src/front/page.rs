//! Page metadata derivation.
//!
//! A [`Page`] is built once from a source file and then enriched step by
//! step: defaults, excerpt, post detection, date and URL, asset homes.

use super::matter;
use crate::{
    config::defaults,
    error::BuildError,
    templating::filters::parse_switch,
    utils::path::{join_url, relative_to, to_slash},
};
use chrono::NaiveDate;
use regex::Regex;
use serde_yaml::{Mapping, Value};
use std::{
    ffi::OsStr,
    path::{Component, Path, PathBuf},
    sync::LazyLock,
};

/// `YYYY-MM-DD-slug` post file stems.
static POST_STEM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d{4})-(\d{2})-(\d{2})-(.+)$").unwrap());

const POSTS_ROOT: &str = "posts";
const PAGES_ROOT: &str = "pages";

#[derive(Debug, Clone)]
pub struct Page {
    pub source: PathBuf,
    pub body: String,
    pub metadata: Mapping,
}

impl Page {
    pub fn parse(source: &Path, text: &str) -> Result<Self, BuildError> {
        let (metadata, body) = matter::parse(text).map_err(|e| {
            BuildError::format(format!("{}: {e}", source.display()))
        })?;
        Ok(Self {
            source: source.to_path_buf(),
            body: body.to_owned(),
            metadata,
        })
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(Value::as_str)
    }

    pub fn set(&mut self, key: &str, value: impl Into<Value>) {
        self.metadata.insert(Value::from(key), value.into());
    }

    /// Copy every default the page does not define itself.
    pub fn merge_defaults(&mut self, defaults: &Mapping) {
        for (key, value) in defaults {
            if !self.metadata.contains_key(key) {
                self.metadata.insert(key.clone(), value.clone());
            }
        }
    }

    pub fn excerpt_token(&self) -> String {
        self.get_str("excerpt_token")
            .map_or_else(defaults::page::excerpt_token, str::to_owned)
    }

    /// Body before the first `token`.
    ///
    /// A token at offset 0 counts as absent, so the excerpt is empty.
    pub fn excerpt(&self, token: &str) -> &str {
        match self.body.find(token) {
            Some(offset) if offset > 0 => &self.body[..offset],
            _ => "",
        }
    }

    /// Resolve and record `ispost`: explicit metadata wins, else a `posts`
    /// component in the source path.
    pub fn resolve_post(&mut self) -> Result<bool, BuildError> {
        let is_post = match self.metadata.get("ispost") {
            Some(Value::Bool(b)) => *b,
            Some(Value::String(s)) => parse_switch(s).ok_or_else(|| {
                BuildError::format(format!("`ispost` must be a boolean, got `{s}`"))
            })?,
            Some(Value::Number(n)) => n.as_i64().is_some_and(|n| n != 0),
            _ => self
                .source
                .components()
                .any(|c| c == Component::Normal(OsStr::new(POSTS_ROOT))),
        };
        self.set("ispost", is_post);
        Ok(is_post)
    }

    fn is_post(&self) -> bool {
        matches!(self.metadata.get("ispost"), Some(Value::Bool(true)))
    }

    /// Posts get `date` and a dated `url` from their file name; other pages
    /// get a `url` mirroring their path under `pages/`.
    pub fn derive_date_and_url(&mut self, site_url: &str) -> Result<(), BuildError> {
        if self.is_post() {
            let stem = file_stem(&self.source);
            let caps = POST_STEM.captures(&stem).ok_or_else(|| {
                BuildError::format(format!(
                    "post `{}` is not named YYYY-MM-DD-slug",
                    self.source.display()
                ))
            })?;
            let (year, month, day, slug) = (&caps[1], &caps[2], &caps[3], &caps[4]);
            let date = NaiveDate::parse_from_str(&format!("{year}-{month}-{day}"), "%Y-%m-%d")
                .map_err(|e| {
                    BuildError::format(format!("post `{}` has a bad date: {e}", self.source.display()))
                })?;

            let url = format!("{site_url}/articles/{year}/{month}/{day}/{slug}.html");
            self.set("date", date.format("%Y-%m-%d").to_string());
            self.set("url", url);
        } else {
            let rel = relative_to(&self.source, Path::new(PAGES_ROOT));
            // Sources outside `pages/` keep their own path.
            let rel = if rel.starts_with("..") { self.source.clone() } else { rel };
            self.set("url", format!("{site_url}/{}.html", to_slash(&rel.with_extension(""))));
        }
        Ok(())
    }

    /// `imghome` and `assestshome`: `/img` and `/assets` joined with the
    /// source directory relative to its collection root.
    pub fn derive_homes(&mut self) {
        let root = if self.is_post() { POSTS_ROOT } else { PAGES_ROOT };
        let rel = relative_to(&self.source, Path::new(root));
        let page_home = rel.parent().map(to_slash).unwrap_or_default();

        self.set("imghome", join_url("/img", &page_home));
        self.set("assestshome", join_url("/assets", &page_home));
    }

    /// Layout template name, resolved against `layouts` when bare.
    pub fn layout(&self, layouts: &Path) -> Option<String> {
        self.get_str("layout").map(|name| resolve_layout(name, layouts))
    }
}

/// Bare names (no path separator) live under `layouts` and default to `.html`.
pub fn resolve_layout(name: &str, layouts: &Path) -> String {
    if name.contains('/') || name.contains(std::path::MAIN_SEPARATOR) {
        return name.to_owned();
    }
    let mut path = layouts.join(name);
    if path.extension().is_none() {
        path.set_extension("html");
    }
    to_slash(&path)
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}
