//! Sitemap generation.
//!
//! Lists every published post, then the site's extra URLs dated with the
//! newest post.
//!
//! # Sitemap Format
//!
//! ```xml
//! <?xml version="1.0" encoding="utf-8"?>
//! <urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
//!    <url>
//!       <loc>https://example.com/</loc>
//!       <lastmod>2025-01-01</lastmod>
//!    </url>
//! </urlset>
//! ```

use super::{
    escape_xml,
    sidecar::{self, Sidecar},
    write_output,
};
use crate::{
    config::SiteConfig,
    error::{BuildError, require_file},
    log,
};
use anyhow::Result;
use std::path::{Path, PathBuf};

// ============================================================================
// Constants
// ============================================================================

/// XML namespace for sitemap
const SITEMAP_NS: &str = "http://www.sitemaps.org/schemas/sitemap/0.9";

/// `lastmod` of the extra URLs when no post is listed.
const NO_DATE: &str = "0000-00-00";

const INDENT: &str = "   ";

// ============================================================================
// Public API
// ============================================================================

/// `quire sitemap`
pub fn run(output: &Path, site: &Path, posts: &[PathBuf]) -> Result<()> {
    let site = SiteConfig::from_path(&require_file(site)?)?;
    let posts = sidecar::load_all(posts)?;
    let sitemap = Sitemap::build(&site, &posts)?;
    log!("sitemap"; "{} urls", sitemap.len());
    write_output("sitemap", output, &sitemap.into_xml())
}

// ============================================================================
// Sitemap Implementation
// ============================================================================

/// Sitemap data structure
#[derive(Debug, Default)]
pub struct Sitemap {
    /// List of URL entries
    urls: Vec<UrlEntry>,
}

/// Single URL entry in the sitemap
#[derive(Debug)]
struct UrlEntry {
    /// Full URL location
    loc: String,
    /// Last modification date, YYYY-MM-DD
    lastmod: String,
}

impl Sitemap {
    /// Listed posts in order, then `sitemap_adds`.
    pub fn build(site: &SiteConfig, posts: &[Sidecar]) -> Result<Self, BuildError> {
        let mut sitemap = Self::default();
        let mut latest = NO_DATE.to_owned();

        for post in posts.iter().filter(|p| p.is_listed()) {
            let date = post.str_field("date")?;
            sitemap.push(post.public_url()?, date)?;
            if date > latest.as_str() {
                latest = date.to_owned();
            }
        }
        for url in &site.sitemap_adds {
            sitemap.push(url, &latest)?;
        }
        Ok(sitemap)
    }

    /// Add an entry; relative URLs are rejected.
    fn push(&mut self, loc: &str, lastmod: &str) -> Result<(), BuildError> {
        if !loc.starts_with("http") {
            return Err(BuildError::format(format!(
                "sitemap URL must be absolute, got `{loc}`"
            )));
        }
        self.urls.push(UrlEntry {
            loc: loc.to_owned(),
            lastmod: lastmod.to_owned(),
        });
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.urls.len()
    }

    /// Generate sitemap XML string.
    pub fn into_xml(self) -> String {
        let mut xml = String::with_capacity(4096);

        xml.push_str(r#"<?xml version="1.0" encoding="utf-8"?>"#);
        xml.push('\n');
        xml.push_str(&format!(r#"<urlset xmlns="{SITEMAP_NS}">"#));
        xml.push('\n');

        for entry in self.urls {
            xml.push_str(&format!("{INDENT}<url>\n"));
            xml.push_str(&format!("{INDENT}{INDENT}<loc>{}</loc>\n", escape_xml(&entry.loc)));
            xml.push_str(&format!(
                "{INDENT}{INDENT}<lastmod>{}</lastmod>\n",
                escape_xml(&entry.lastmod)
            ));
            xml.push_str(&format!("{INDENT}</url>\n"));
        }

        xml.push_str("</urlset>\n");
        xml
    }
}

// ============================================================================
// Tests
// ============================================================================
