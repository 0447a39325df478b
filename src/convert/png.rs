//! PNG minification through ImageMagick `convert` and `optipng`.
//!
//! The transform spec reads `T:Q<colors>-S<percent>`; `T:` and `T:Q0-S0`
//! only run `optipng`.

use crate::{
    error::{BuildError, require_file},
    exec, log,
};
use anyhow::{Context, Result};
use std::{
    fs,
    path::{Component, Path, PathBuf},
    str::FromStr,
};

/// Quantize and resize settings; zero means "leave alone".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PngSpec {
    pub colors: u32,
    pub resize: u32,
}

impl PngSpec {
    pub const fn is_passthrough(&self) -> bool {
        self.colors == 0 && self.resize == 0
    }
}

impl FromStr for PngSpec {
    type Err = BuildError;

    fn from_str(spec: &str) -> Result<Self, Self::Err> {
        let bad = || BuildError::argument(format!("bad png spec `{spec}` (expected T:Q<n>-S<m>)"));
        let rest = spec.strip_prefix("T:").ok_or_else(bad)?;
        if rest.is_empty() {
            return Ok(Self::default());
        }

        let (q, s) = rest.split_once('-').ok_or_else(bad)?;
        let colors = q.strip_prefix('Q').and_then(|n| n.parse().ok()).ok_or_else(bad)?;
        let resize = s.strip_prefix('S').and_then(|n| n.parse().ok()).ok_or_else(bad)?;
        Ok(Self { colors, resize })
    }
}

/// Scratch file for `dst`: its directory mirrored under `tmpdir`.
pub fn scratch_path(tmpdir: &Path, dst: &Path) -> PathBuf {
    let relative: PathBuf = dst
        .parent()
        .map(|p| {
            p.components()
                .filter(|c| matches!(c, Component::Normal(_)))
                .collect()
        })
        .unwrap_or_default();
    let name = dst.file_name().unwrap_or_default();
    tmpdir.join(relative).join(name)
}

fn optipng(src: &Path, dst: &Path) -> Result<()> {
    exec!(["optipng"]; "-o7", "--strip", "all", "-quiet", "-out", dst, src)?;
    Ok(())
}

/// `quire minify-png`
pub fn run(src: &Path, spec: &str, tmpdir: &Path, dst: &Path) -> Result<()> {
    let spec: PngSpec = spec.parse()?;
    let src = require_file(src)?;
    if !src.is_file() {
        return Err(BuildError::MissingFile(src).into());
    }
    if !tmpdir.is_dir() {
        return Err(BuildError::MissingFile(tmpdir.to_path_buf()).into());
    }
    if let Some(parent) = dst.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).with_context(|| format!("Failed to create {}", parent.display()))?;
    }

    if spec.is_passthrough() {
        optipng(&src, dst)?;
    } else {
        let scratch = scratch_path(tmpdir, dst);
        if let Some(parent) = scratch.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let resize = if spec.resize > 0 { format!("{}%", spec.resize) } else { String::new() };
        let colors = if spec.colors > 0 { spec.colors.to_string() } else { String::new() };
        // Empty arguments are dropped, so absent steps vanish with their flag.
        exec!(
            ["convert"];
            &src,
            if resize.is_empty() { "" } else { "-resize" }, &resize,
            if colors.is_empty() { "" } else { "-colors" }, &colors,
            &scratch
        )?;

        let optimized = optipng(&scratch, dst);
        fs::remove_file(&scratch)
            .with_context(|| format!("Failed to remove {}", scratch.display()))?;
        optimized?;
    }

    log!("png"; "{}", dst.display());
    Ok(())
}
