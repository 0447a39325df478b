//! Site-wide outputs built from post metadata sidecars.

pub mod feed;
pub mod sidecar;
pub mod sitemap;

use crate::log;
use anyhow::{Context, Result};
use std::{fs, path::Path};

/// Escape special XML characters.
pub fn escape_xml(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

/// Write `contents`, creating parent directories, and log the file name.
pub fn write_output(module: &str, path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    fs::write(path, contents).with_context(|| format!("Failed to write {}", path.display()))?;
    log!(module; "{}", path.file_name().unwrap_or_default().to_string_lossy());
    Ok(())
}
