//! Content-addressed store for generated diagram artifacts.
//!
//! Artifacts live as `<fingerprint>.<format>` under one directory and are
//! never evicted. A store writes a temp file in the same directory and renames
//! it into place, so readers never see a partial artifact. Two processes
//! missing on the same fingerprint may still both generate it.

use anyhow::{Context, Result};
use std::{
    fmt, fs,
    io::Write,
    path::{Path, PathBuf},
};
use tempfile::NamedTempFile;

/// Deterministic identity of one artifact.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint {
    hex: String,
    format: String,
}

impl Fingerprint {
    /// Hash of the destination, generator kind, source text and format.
    ///
    /// Fields are length-prefixed so `("ab", "c")` and `("a", "bc")` differ.
    pub fn new(destination: &Path, kind: &str, source: &str, format: &str) -> Self {
        let mut hasher = blake3::Hasher::new();
        let destination = destination.to_string_lossy();
        for field in [destination.as_ref(), kind, source, format] {
            hasher.update(&(field.len() as u64).to_le_bytes());
            hasher.update(field.as_bytes());
        }
        Self {
            hex: hasher.finalize().to_hex().to_string(),
            format: format.to_owned(),
        }
    }

    pub fn file_name(&self) -> String {
        format!("{}.{}", self.hex, self.format)
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.hex)
    }
}

/// Artifact directory.
#[derive(Debug, Clone)]
pub struct ArtifactCache {
    dir: PathBuf,
}

impl ArtifactCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn fingerprint(&self, destination: &Path, kind: &str, source: &str, format: &str) -> Fingerprint {
        Fingerprint::new(destination, kind, source, format)
    }

    pub fn path(&self, id: &Fingerprint) -> PathBuf {
        self.dir.join(id.file_name())
    }

    pub fn exists(&self, id: &Fingerprint) -> bool {
        self.path(id).is_file()
    }

    /// Write `bytes` under `id`, replacing any previous artifact atomically.
    pub fn store(&self, id: &Fingerprint, bytes: &[u8]) -> Result<PathBuf> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("Failed to create cache dir {}", self.dir.display()))?;

        let mut tmp = NamedTempFile::new_in(&self.dir)
            .with_context(|| format!("Failed to create temp file in {}", self.dir.display()))?;
        tmp.write_all(bytes).context("Failed to write artifact")?;

        let path = self.path(id);
        tmp.persist(&path)
            .with_context(|| format!("Failed to move artifact to {}", path.display()))?;
        Ok(path)
    }

    /// Copy the artifact to `destination`, creating parent directories.
    pub fn copy_to(&self, id: &Fingerprint, destination: &Path) -> Result<()> {
        if let Some(parent) = destination.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let cached = self.path(id);
        fs::copy(&cached, destination).with_context(|| {
            format!("Failed to copy {} to {}", cached.display(), destination.display())
        })?;
        Ok(())
    }
}
