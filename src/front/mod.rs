//! Front-matter splitter.
//!
//! Turns one markdown source with YAML front matter into four files:
//!
//! | Output     | Content                                                   |
//! |------------|-----------------------------------------------------------|
//! | `content`  | prelude + body, wrapped in the page layout when it has one |
//! | `bare`     | prelude + body, never wrapped                             |
//! | `excerpt`  | excerpt prelude + body up to the excerpt marker           |
//! | `metadata` | page metadata as YAML, computed fields included           |
//!
//! ```text
//! source.md ──parse──▶ Page ──defaults──▶ excerpt ──date/url──▶ homes
//!                                                                 │
//!                       content / bare / excerpt / metadata ◀─────┘
//! ```

mod matter;
mod page;
mod prelude;

pub use page::{Page, resolve_layout};
pub use prelude::{Prelude, quote};

use crate::{config::SiteConfig, error::require_file, log, utils::path::to_slash};
use anyhow::{Context, Result};
use std::{fs, path::Path};

const BLOCK_BEGIN: &str = "{% block content %}\n";
const BLOCK_END: &str = "\n{% endblock content %}\n";

/// Output paths of one split.
#[derive(Debug, Clone, Copy)]
pub struct FrontOutputs<'a> {
    pub content: &'a Path,
    pub bare: &'a Path,
    pub excerpt: &'a Path,
    pub metadata: &'a Path,
}

/// The four rendered outputs, before they hit the disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Split {
    pub content: String,
    pub bare: String,
    pub excerpt: String,
    pub metadata: String,
}

/// Split `text` read from `source`.
///
/// `site` loses its `page_defaults`; `excerpt_file` is recorded in the
/// page metadata so templates can include the excerpt later.
pub fn split(source: &Path, text: &str, site: &mut SiteConfig, excerpt_file: &Path) -> Result<Split> {
    let mut page = Page::parse(source, text)?;

    let defaults = site.take_page_defaults();
    page.merge_defaults(&defaults);

    let token = page.excerpt_token();
    let excerpt = page.excerpt(&token).to_owned();
    page.set("excerpt_file", to_slash(excerpt_file));
    page.set("raw_excerpt", excerpt.as_str());

    page.resolve_post()?;
    page.derive_date_and_url(&site.url)?;
    page.derive_homes();

    let site_vars = site.template_vars()?;
    let prelude = Prelude {
        page: &page.metadata,
        site: &site_vars,
        imports: &site.imports,
    };
    let content_prelude = prelude.render(false);

    let bare = format!("{content_prelude}{}", page.body);
    let content = match page.layout(&site.layouts) {
        Some(layout) => wrap_in_layout(&layout, &content_prelude, &page.body),
        None => bare.clone(),
    };
    let excerpt = format!("{}{excerpt}", prelude.render(true));

    let mut metadata = page.metadata.clone();
    metadata.remove("layout");
    let metadata = serde_yaml::to_string(&metadata).context("Failed to serialize page metadata")?;

    Ok(Split {
        content,
        bare,
        excerpt,
        metadata,
    })
}

/// `{% extends %}` + prelude + body inside the `content` block.
pub fn wrap_in_layout(layout: &str, prelude: &str, body: &str) -> String {
    format!(
        "{{% extends {} %}}\n{prelude}{BLOCK_BEGIN}{body}{BLOCK_END}",
        quote(layout)
    )
}

/// Read `source` and `site`, split, write every output.
pub fn run(source: &Path, outputs: FrontOutputs<'_>, site: &Path) -> Result<()> {
    let source = require_file(source)?;
    let mut site = SiteConfig::from_path(&require_file(site)?)?;

    let text = fs::read_to_string(&source)
        .with_context(|| format!("Failed to read {}", source.display()))?;
    let split = split(&source, &text, &mut site, outputs.excerpt)?;

    write(outputs.content, &split.content)?;
    write(outputs.bare, &split.bare)?;
    write(outputs.excerpt, &split.excerpt)?;
    write(outputs.metadata, &split.metadata)?;

    log!("front"; "{}", source.display());
    Ok(())
}

fn write(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    fs::write(path, contents).with_context(|| format!("Failed to write {}", path.display()))
}

// ============================================================================
// Tests
// ============================================================================
