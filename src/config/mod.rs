//! Site configuration loaded from the site YAML file.
//!
//! # Keys
//!
//! | Key             | Purpose                                             |
//! |-----------------|-----------------------------------------------------|
//! | `url`           | Absolute site URL used for page URLs and feeds      |
//! | `title`, ...    | Feed channel metadata                               |
//! | `page_defaults` | Metadata merged into pages lacking the keys         |
//! | `layouts`       | Directory bare layout names resolve against         |
//! | `imports`       | Template lines appended to every page prelude       |
//! | `sitemap_adds`  | Extra URLs listed in the sitemap                    |
//! | `diagrams`      | Diagram generators and artifact cache               |
//! | anything else   | Kept verbatim and exposed to templates as `site.*`  |
//!
//! # Example
//!
//! ```yaml
//! url: https://blog.example.org
//! title: The Blog
//! author: Alice
//! page_defaults:
//!   excerpt_token: "<!--more-->"
//!   layout: post
//! diagrams:
//!   plantuml-jar: ~/bin/plantuml.jar
//! ```

pub mod defaults;
mod diagram;
mod error;

pub use diagram::DiagramConfig;
pub use error::ConfigError;

use anyhow::{Context, Result};
use educe::Educe;
use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value};
use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};

// ============================================================================
// Root Configuration
// ============================================================================

/// Root configuration structure representing the site YAML file.
#[derive(Debug, Clone, Educe, Serialize, Deserialize)]
#[educe(Default)]
pub struct SiteConfig {
    /// Absolute base URL, without trailing slash.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub url: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub title: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub author: String,

    #[serde(default = "defaults::site::email", skip_serializing_if = "is_default_email")]
    #[educe(Default = defaults::site::email())]
    pub email: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,

    /// BCP 47 language code for feeds.
    #[serde(default = "defaults::site::language", skip_serializing_if = "is_default_language")]
    #[educe(Default = defaults::site::language())]
    pub language: String,

    /// File name of the RSS feed under `url`.
    #[serde(default = "defaults::site::name_rss", skip_serializing_if = "is_default_name_rss")]
    #[educe(Default = defaults::site::name_rss())]
    pub name_rss: String,

    /// File name of the Atom feed under `url`.
    #[serde(default = "defaults::site::name_atom", skip_serializing_if = "is_default_name_atom")]
    #[educe(Default = defaults::site::name_atom())]
    pub name_atom: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sitemap_adds: Vec<String>,

    /// Consumed by the front-matter merge, never serialized back out.
    #[serde(default, skip_serializing)]
    pub page_defaults: Mapping,

    /// Build-side settings below are never exposed to templates.
    #[serde(default = "defaults::site::layouts", skip_serializing)]
    #[educe(Default = defaults::site::layouts())]
    pub layouts: PathBuf,

    #[serde(default, skip_serializing)]
    pub imports: Vec<String>,

    #[serde(default, skip_serializing)]
    pub diagrams: DiagramConfig,

    /// User-defined fields, exposed to templates untouched.
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

// Defaulted keys only reach templates when the user changed them.
fn is_default_email(value: &str) -> bool {
    value == defaults::site::email()
}

fn is_default_language(value: &str) -> bool {
    value == defaults::site::language()
}

fn is_default_name_rss(value: &str) -> bool {
    value == defaults::site::name_rss()
}

fn is_default_name_atom(value: &str) -> bool {
    value == defaults::site::name_atom()
}

impl SiteConfig {
    /// Parse configuration from a YAML string. An empty document is the default config.
    pub fn from_str(content: &str) -> Result<Self> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: SiteConfig = serde_yaml::from_str(content).map_err(ConfigError::from)?;
        Ok(config)
    }

    /// Load, normalize and validate configuration from a file path.
    pub fn from_path(path: &Path) -> Result<Self> {
        let content =
            fs::read_to_string(path).map_err(|err| ConfigError::Io(path.to_path_buf(), err))?;
        let mut config = Self::from_str(&content)
            .with_context(|| format!("Failed to load site config {}", path.display()))?;
        config.diagrams.expand_paths();
        config.validate()?;
        Ok(config)
    }

    /// Check the fields other commands rely on.
    pub fn validate(&mut self) -> Result<(), ConfigError> {
        while self.url.ends_with('/') {
            self.url.pop();
        }
        if !self.url.is_empty() && !self.url.starts_with("http") {
            return Err(ConfigError::Validation(format!(
                "`url` must be absolute, got `{}`",
                self.url
            )));
        }
        Ok(())
    }

    /// Take `page_defaults` out of the config so it never reaches templates.
    pub fn take_page_defaults(&mut self) -> Mapping {
        std::mem::take(&mut self.page_defaults)
    }

    /// Configuration as a template value (`site.*`).
    pub fn template_vars(&self) -> Result<Value> {
        serde_yaml::to_value(self).context("Failed to serialize site config")
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_site_config_full() {
        let config = r#"
url: https://blog.example.org/
title: The Blog
author: Alice
email: alice@example.org
description: Notes
sitemap_adds:
  - https://blog.example.org/index.html
page_defaults:
  layout: post
  excerpt_token: "<!--more-->"
imports:
  - "{% import 'z/j2/macros.j2' as m %}"
analytics: UA-1
"#;
        let mut config = SiteConfig::from_str(config).unwrap();
        config.validate().unwrap();

        assert_eq!(config.url, "https://blog.example.org");
        assert_eq!(config.title, "The Blog");
        assert_eq!(config.sitemap_adds.len(), 1);
        assert_eq!(config.page_defaults.len(), 2);
        assert_eq!(config.imports.len(), 1);
        assert_eq!(config.extra.get("analytics"), Some(&Value::from("UA-1")));
    }

    #[test]
    fn test_site_config_defaults() {
        let config = SiteConfig::from_str("").unwrap();

        assert_eq!(config.url, "");
        assert_eq!(config.language, "en");
        assert_eq!(config.name_rss, "rss.xml");
        assert_eq!(config.name_atom, "atom.xml");
        assert_eq!(config.layouts, PathBuf::from("z/layouts"));
        assert!(config.page_defaults.is_empty());
    }

    #[test]
    fn test_validate_rejects_relative_url() {
        let mut config = SiteConfig::from_str("url: blog.example.org").unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Validation(_))
        ));
    }

    #[test]
    fn test_page_defaults_never_serialized() {
        let mut config = SiteConfig::from_str("title: T\npage_defaults:\n  layout: post\n").unwrap();
        let defaults = config.take_page_defaults();
        assert_eq!(defaults.get("layout"), Some(&Value::from("post")));
        assert!(config.page_defaults.is_empty());

        let vars = config.template_vars().unwrap();
        assert!(vars.get("page_defaults").is_none());
        assert_eq!(vars.get("title"), Some(&Value::from("T")));
    }

    #[test]
    fn test_extra_keys_flatten_into_template_vars() {
        let config = SiteConfig::from_str("twitter: '@alice'\n").unwrap();
        let vars = config.template_vars().unwrap();
        assert_eq!(vars.get("twitter"), Some(&Value::from("@alice")));
    }

    #[test]
    fn test_template_vars_only_user_keys() {
        let config = SiteConfig::from_str("title: T\nlanguage: fr\n").unwrap();
        let vars = config.template_vars().unwrap();
        let keys: Vec<&str> = vars
            .as_mapping()
            .unwrap()
            .keys()
            .filter_map(Value::as_str)
            .collect();
        assert_eq!(keys, vec!["title", "language"]);

        let vars = SiteConfig::from_str("").unwrap().template_vars().unwrap();
        assert!(vars.as_mapping().unwrap().is_empty());
    }

    #[test]
    fn test_from_path_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = SiteConfig::from_path(&dir.path().join("site.yml")).unwrap_err();
        assert!(err.downcast_ref::<ConfigError>().is_some());
    }
}
