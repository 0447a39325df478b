//! RSS and Atom feeds.
//!
//! Entries come from post sidecars; drafts and hidden posts are skipped.
//! Content is the rendered HTML file named by `refs.content-html`.

use super::{
    escape_xml,
    sidecar::{self, Sidecar},
    write_output,
};
use crate::{config::SiteConfig, error::require_file, log};
use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, NaiveTime, Utc};
use regex::Regex;
use rss::{
    CategoryBuilder, ChannelBuilder, GuidBuilder, ItemBuilder,
    extension::atom::{AtomExtension, Link},
    validation::Validate,
};
use std::{
    fmt::Write as _,
    fs,
    path::{Path, PathBuf},
    sync::LazyLock,
};

const GENERATOR: &str = "quire";
const ATOM_NS: &str = "http://www.w3.org/2005/Atom";

// ============================================================================
// Public API
// ============================================================================

/// `quire feed`
pub fn run(rss: &Path, atom: &Path, site: &Path, posts: &[PathBuf]) -> Result<()> {
    let site = SiteConfig::from_path(&require_file(site)?)?;
    let posts = sidecar::load_all(posts)?;
    let feed = Feed::build(&site, &posts)?;
    log!("feed"; "{} entries", feed.entries().len());

    write_output("atom", atom, &feed.to_atom())?;
    write_output("rss", rss, &feed.to_rss()?)?;
    Ok(())
}

/// One published post.
#[derive(Debug, Clone)]
pub struct Entry {
    pub title: String,
    pub url: String,
    pub date: DateTime<Utc>,
    pub content: String,
    pub tags: Vec<String>,
}

impl Entry {
    /// Read an entry from a sidecar, loading its rendered content.
    pub fn from_sidecar(post: &Sidecar) -> Result<Self> {
        let content_path = require_file(post.reference("content-html")?)?;
        let content = fs::read_to_string(&content_path)
            .with_context(|| format!("Failed to read {}", content_path.display()))?;
        Ok(Self {
            title: post.str_field("title")?.to_owned(),
            url: post.str_field("url")?.to_owned(),
            date: post.date()?.and_time(NaiveTime::MIN).and_utc(),
            content,
            tags: post.tags().into_iter().map(str::to_owned).collect(),
        })
    }
}

/// Feed channel plus its listed entries, in sidecar order.
pub struct Feed<'a> {
    site: &'a SiteConfig,
    entries: Vec<Entry>,
}

impl<'a> Feed<'a> {
    pub fn build(site: &'a SiteConfig, posts: &[Sidecar]) -> Result<Self> {
        let entries = posts
            .iter()
            .filter(|p| p.is_listed())
            .map(Entry::from_sidecar)
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { site, entries })
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    fn self_link(&self, name: &str) -> String {
        format!("{}/{name}", self.site.url)
    }

    /// Latest entry date; now when there are no entries.
    fn updated(&self) -> DateTime<Utc> {
        self.entries.iter().map(|e| e.date).max().unwrap_or_else(Utc::now)
    }

    /// RSS 2.0 document.
    pub fn to_rss(&self) -> Result<String> {
        let author = rss_author(self.site);
        let items: Vec<_> = self
            .entries
            .iter()
            .map(|entry| {
                let categories = entry
                    .tags
                    .iter()
                    .map(|tag| CategoryBuilder::default().name(tag.as_str()).build())
                    .collect::<Vec<_>>();
                ItemBuilder::default()
                    .title(Some(entry.title.clone()))
                    .link(Some(entry.url.clone()))
                    .guid(Some(GuidBuilder::default().permalink(true).value(entry.url.clone()).build()))
                    .pub_date(Some(entry.date.to_rfc2822()))
                    .author(author.clone())
                    .categories(categories)
                    .content(Some(entry.content.clone()))
                    .build()
            })
            .collect();

        let mut self_link = Link::default();
        self_link.set_href(self.self_link(&self.site.name_rss));
        self_link.set_rel("self");
        self_link.set_mime_type(Some("application/rss+xml".to_owned()));
        let mut atom_ext = AtomExtension::default();
        atom_ext.set_links(vec![self_link]);

        let channel = ChannelBuilder::default()
            .title(self.site.title.as_str())
            .link(self.site.url.as_str())
            .description(self.site.description.as_str())
            .language(Some(self.site.language.clone()))
            .generator(Some(GENERATOR.to_owned()))
            .atom_ext(Some(atom_ext))
            .items(items)
            .build();

        channel
            .validate()
            .map_err(|e| anyhow!("rss validation failed: {e}"))?;
        Ok(channel.to_string())
    }

    /// Atom 1.0 document, pretty-printed.
    pub fn to_atom(&self) -> String {
        let site = self.site;
        let mut xml = String::with_capacity(4096);
        let _ = writeln!(xml, r#"<?xml version="1.0" encoding="utf-8"?>"#);
        let _ = writeln!(xml, r#"<feed xmlns="{ATOM_NS}" xml:lang="{}">"#, escape_xml(&site.language));
        let _ = writeln!(xml, "  <id>{}</id>", escape_xml(&site.url));
        let _ = writeln!(xml, "  <title>{}</title>", escape_xml(&site.title));
        let _ = writeln!(xml, "  <updated>{}</updated>", self.updated().to_rfc3339());
        xml.push_str("  <author>\n");
        let _ = writeln!(xml, "    <name>{}</name>", escape_xml(&site.author));
        if !site.email.is_empty() {
            let _ = writeln!(xml, "    <email>{}</email>", escape_xml(&site.email));
        }
        xml.push_str("  </author>\n");
        let _ = writeln!(xml, r#"  <link href="{}" rel="alternate"/>"#, escape_xml(&site.url));
        let _ = writeln!(
            xml,
            r#"  <link href="{}" rel="self"/>"#,
            escape_xml(&self.self_link(&site.name_atom))
        );
        let _ = writeln!(xml, "  <generator>{GENERATOR}</generator>");
        let _ = writeln!(xml, "  <subtitle>{}</subtitle>", escape_xml(&site.description));

        for entry in &self.entries {
            let date = entry.date.to_rfc3339();
            let url = escape_xml(&entry.url);
            let title = escape_xml(&entry.title);
            xml.push_str("  <entry>\n");
            let _ = writeln!(xml, "    <id>{url}</id>");
            let _ = writeln!(xml, "    <title>{title}</title>");
            let _ = writeln!(xml, "    <updated>{date}</updated>");
            let _ = writeln!(xml, "    <author>\n      <name>{}</name>\n    </author>", escape_xml(&site.author));
            let _ = writeln!(xml, r#"    <content type="html">{}</content>"#, escape_xml(&entry.content));
            let _ = writeln!(xml, r#"    <link href="{url}" rel="alternate" type="text/html" title="{title}"/>"#);
            for tag in &entry.tags {
                let tag = escape_xml(tag);
                let _ = writeln!(xml, r#"    <category term="{tag}" label="{tag}"/>"#);
            }
            let _ = writeln!(xml, "    <published>{date}</published>");
            xml.push_str("  </entry>\n");
        }
        xml.push_str("</feed>\n");
        xml
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// RSS author: `email@example.com (Name)`.
///
/// A site author already in that form is used as is; otherwise the site
/// email and author are combined. `None` when either is missing.
fn rss_author(site: &SiteConfig) -> Option<String> {
    static RE_VALID_AUTHOR: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"^[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}[ \t]*\([^)]+\)$").unwrap()
    });

    let author = site.author.trim();
    if RE_VALID_AUTHOR.is_match(author) {
        return Some(author.to_owned());
    }
    if author.is_empty() || site.email.is_empty() {
        return None;
    }
    Some(format!("{} ({author})", site.email))
}

// ============================================================================
// Tests
// ============================================================================
