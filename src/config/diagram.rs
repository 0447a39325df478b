//! `diagrams:` section configuration.
//!
//! Locates the external generators and the artifact cache.

use super::defaults;
use educe::Educe;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// `diagrams:` section in the site YAML.
///
/// # Example
/// ```yaml
/// diagrams:
///   plantuml-jar: ~/bin/plantuml.jar
///   ditaa-jar: ~/bin/ditaa.jar
///   format: svg
///   output: out/site
/// ```
#[derive(Debug, Clone, Educe, Serialize, Deserialize)]
#[educe(Default)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct DiagramConfig {
    #[serde(default = "defaults::diagrams::plantuml_jar")]
    #[educe(Default = defaults::diagrams::plantuml_jar())]
    pub plantuml_jar: PathBuf,

    #[serde(default = "defaults::diagrams::ditaa_jar")]
    #[educe(Default = defaults::diagrams::ditaa_jar())]
    pub ditaa_jar: PathBuf,

    #[serde(default = "defaults::diagrams::dot_bin")]
    #[educe(Default = defaults::diagrams::dot_bin())]
    pub dot_bin: String,

    #[serde(default = "defaults::diagrams::java_bin")]
    #[educe(Default = defaults::diagrams::java_bin())]
    pub java_bin: String,

    /// Image format passed to the generators (`svg`, `png`).
    #[serde(default = "defaults::diagrams::format")]
    #[educe(Default = defaults::diagrams::format())]
    pub format: String,

    /// Directory holding generated artifacts keyed by fingerprint.
    #[serde(default = "defaults::diagrams::cache")]
    #[educe(Default = defaults::diagrams::cache())]
    pub cache: PathBuf,

    /// Root the page image homes (`/img/...`) are resolved against.
    #[serde(default = "defaults::diagrams::output")]
    #[educe(Default = defaults::diagrams::output())]
    pub output: PathBuf,
}

impl DiagramConfig {
    /// Expand `~` in every configured path.
    pub fn expand_paths(&mut self) {
        for path in [
            &mut self.plantuml_jar,
            &mut self.ditaa_jar,
            &mut self.cache,
            &mut self.output,
        ] {
            *path = expand_tilde(path);
        }
    }
}

fn expand_tilde(path: &Path) -> PathBuf {
    let raw = path.to_string_lossy();
    PathBuf::from(shellexpand::tilde(&raw).into_owned())
}
