//! `diagram` filter: fenced plantuml/ditaa/dot source to an embedded figure.
//!
//! ```jinja
//! {% filter diagram(location="margin") %}
//! ```dot
//! digraph { a -> b }
//! ```
//! A *tiny* graph.
//! {% endfilter %}
//! ```
//!
//! Generation only happens when `ENV.DIAGRAMS` is on. Otherwise the filter
//! emits the figure HTML and touches nothing on disk.

use super::{
    figure::{Figure, Location, lookup_home},
    filters::parse_switch,
    helper_error,
};
use crate::{
    cache::ArtifactCache,
    config::DiagramConfig,
    error::{BuildError, require_file},
    exec, log,
    utils::path::join_url,
};
use anyhow::{Context, Result};
use minijinja::{
    Error, ErrorKind, State,
    value::{Kwargs, Value},
};
use regex::Regex;
use std::{
    fmt, fs,
    path::{Path, PathBuf},
    sync::{Arc, LazyLock},
};

/// Supported generators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    PlantUml,
    Ditaa,
    Dot,
}

impl Kind {
    pub fn parse(name: &str) -> Result<Self, BuildError> {
        match name.trim() {
            "plantuml" | "uml" => Ok(Self::PlantUml),
            "ditaa" => Ok(Self::Ditaa),
            "dot" | "graphviz" => Ok(Self::Dot),
            other => Err(BuildError::format(format!(
                "unknown diagram kind `{other}` (expected plantuml, ditaa or dot)"
            ))),
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PlantUml => "plantuml",
            Self::Ditaa => "ditaa",
            Self::Dot => "dot",
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Fence Parsing
// ============================================================================

/// A fenced block plus the caption text following it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fence {
    /// Info string of the opening fence, if any.
    pub info: Option<String>,
    pub source: String,
    pub caption: String,
}

/// Parse "```kind\nsource\n```\ncaption".
///
/// Backtick and tilde fences of any length work; the closing fence must use
/// the same character and be at least as long.
pub fn parse_fence(text: &str) -> Result<Fence, BuildError> {
    let mut lines = text.lines().skip_while(|l| l.trim().is_empty());

    let opening = lines
        .next()
        .map(str::trim)
        .ok_or_else(|| BuildError::format("diagram block is empty"))?;
    let marker = opening.chars().next().filter(|c| *c == '`' || *c == '~');
    let Some(marker) = marker else {
        return Err(BuildError::format("diagram block must start with a fenced code block"));
    };
    let width = opening.chars().take_while(|c| *c == marker).count();
    if width < 3 {
        return Err(BuildError::format("diagram block must start with a fenced code block"));
    }
    let info = opening[width..].trim();
    let info = info.trim_start_matches('{').trim_end_matches('}').trim_start_matches('.');
    let info = (!info.is_empty()).then(|| info.to_owned());

    let mut source = Vec::new();
    let mut closed = false;
    for line in lines.by_ref() {
        let trimmed = line.trim();
        if trimmed.chars().take_while(|c| *c == marker).count() >= width
            && trimmed.chars().all(|c| c == marker)
        {
            closed = true;
            break;
        }
        source.push(line);
    }
    if !closed {
        return Err(BuildError::format("diagram block has no closing fence"));
    }

    let caption = lines.collect::<Vec<_>>().join("\n").trim().to_owned();
    Ok(Fence {
        info,
        source: source.join("\n"),
        caption,
    })
}

/// `<16 hex>.<format>` derived from kind and source.
pub fn default_name(kind: Kind, source: &str, format: &str) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(kind.as_str().as_bytes());
    hasher.update(&[0]);
    hasher.update(source.as_bytes());
    let hex = hasher.finalize().to_hex();
    format!("{}.{format}", &hex[..16])
}

// ============================================================================
// Generators
// ============================================================================

/// Turns diagram source into image bytes.
pub trait Generator: Send + Sync {
    fn generate(&self, kind: Kind, source: &str, format: &str) -> Result<Vec<u8>>;
}

/// Lines that mark a failed run even when the tool exits zero.
const ERROR_MARKERS: &[&str] = &["Syntax Error", "ERROR", "Exception in thread", "Error:"];

/// Runs plantuml, ditaa and dot in a scratch directory.
#[derive(Debug, Clone)]
pub struct ExternalGenerator {
    config: DiagramConfig,
}

impl ExternalGenerator {
    pub fn new(config: DiagramConfig) -> Self {
        Self { config }
    }

    fn java(&self) -> Result<PathBuf> {
        which::which(&self.config.java_bin)
            .with_context(|| format!("`{}` not found. Please install it first.", self.config.java_bin))
    }

    fn plantuml(&self, dir: &Path, source: &str, format: &str) -> Result<PathBuf> {
        let jar = require_file(&self.config.plantuml_jar)?;
        let java = self.java()?;
        let src = dir.join("diagram.uml");
        fs::write(&src, format!("@startuml\n{source}\n@enduml"))?;

        let output = exec!(
            [java.as_os_str()];
            "-Djava.awt.headless=true", "-jar", &jar, format!("-t{format}"), &src
        )?;
        check_output("plantuml", &output)?;
        Ok(dir.join(format!("diagram.{format}")))
    }

    fn ditaa(&self, dir: &Path, source: &str, format: &str) -> Result<PathBuf> {
        if format != "svg" {
            return Err(BuildError::format(format!("ditaa only produces svg, not `{format}`")).into());
        }
        let jar = require_file(&self.config.ditaa_jar)?;
        let java = self.java()?;
        let src = dir.join("diagram.txt");
        let dst = dir.join("diagram.svg");
        fs::write(&src, source)?;

        let output = exec!(
            [java.as_os_str()];
            "-Djava.awt.headless=true", "-jar", &jar,
            "--overwrite", "--transparent", "--svg", &src, &dst,
            "--no-shadows", "--no-separation"
        )?;
        check_output("ditaa", &output)?;

        let svg = fs::read_to_string(&dst)
            .map_err(|_| BuildError::tool_output("ditaa", "no svg produced"))?;
        fs::write(&dst, fix_ditaa_svg(&svg))?;
        Ok(dst)
    }

    fn dot(&self, dir: &Path, source: &str, format: &str) -> Result<PathBuf> {
        let dot = which::which(&self.config.dot_bin)
            .with_context(|| format!("`{}` not found. Please install it first.", self.config.dot_bin))?;
        let src = dir.join("diagram.dot");
        let dst = dir.join(format!("diagram.{format}"));
        fs::write(&src, source)?;

        let output = exec!([dot.as_os_str()]; format!("-T{format}"), "-o", &dst, &src)?;
        check_output("dot", &output)?;
        Ok(dst)
    }
}

impl Generator for ExternalGenerator {
    fn generate(&self, kind: Kind, source: &str, format: &str) -> Result<Vec<u8>> {
        // Removed on drop, on every exit path.
        let scratch = tempfile::tempdir().context("Failed to create scratch dir")?;
        let dir = scratch.path();

        let produced = match kind {
            Kind::PlantUml => self.plantuml(dir, source, format)?,
            Kind::Ditaa => self.ditaa(dir, source, format)?,
            Kind::Dot => self.dot(dir, source, format)?,
        };
        let bytes = fs::read(&produced)
            .map_err(|_| BuildError::tool_output(kind.as_str(), format!("no {format} output produced")))?;
        Ok(bytes)
    }
}

fn check_output(tool: &str, output: &std::process::Output) -> Result<(), BuildError> {
    let stderr = String::from_utf8_lossy(&output.stderr);
    let stdout = String::from_utf8_lossy(&output.stdout);
    let flagged: Vec<&str> = stderr
        .lines()
        .chain(stdout.lines())
        .filter(|line| ERROR_MARKERS.iter().any(|m| line.contains(m)))
        .collect();
    if flagged.is_empty() {
        Ok(())
    } else {
        Err(BuildError::tool_output(tool, flagged.join("\n")))
    }
}

const DITAA_STYLE: &str = r#"<style type='text/css'>
/* <![CDATA[ */
text {
  fill: black !important;
  font-family: Consolas, "Liberation Mono", Menlo, Courier, monospace !important;
}
path {
  stroke-width: 1.5 !important;
}
path[fill="white"] {
  fill: transparent !important;
}
/* ]]> */
</style>
"#;

/// Add a viewBox so the SVG scales, and restyle text and strokes.
pub fn fix_ditaa_svg(svg: &str) -> String {
    static SIZE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"(?s) width='([0-9]*)'.*?height='([0-9]*)'.*?shape-rendering=").unwrap()
    });
    let svg = SIZE.replacen(svg, 1, " viewBox='0 0 $1 $2' shape-rendering=");
    svg.replacen("<defs>", &format!("{DITAA_STYLE}<defs>"), 1)
}

// ============================================================================
// Renderer
// ============================================================================

/// Cache-backed generation: fingerprint, generate on miss, copy out.
pub struct DiagramRenderer<G> {
    generator: G,
    cache: ArtifactCache,
    output: PathBuf,
    format: String,
}

impl<G: Generator> DiagramRenderer<G> {
    pub fn new(generator: G, cache: ArtifactCache, output: impl Into<PathBuf>, format: impl Into<String>) -> Self {
        Self {
            generator,
            cache,
            output: output.into(),
            format: format.into(),
        }
    }

    pub fn format(&self) -> &str {
        &self.format
    }

    /// File a diagram named `name` under `imghome` is written to.
    pub fn destination(&self, imghome: &str, name: &str) -> PathBuf {
        self.output.join(imghome.trim_start_matches('/')).join(name)
    }

    /// Make sure `destination` holds the artifact, generating on cache miss.
    ///
    /// The copy always happens: the build may have cleared the output tree
    /// even though the cache still has the artifact.
    pub fn ensure(&self, kind: Kind, source: &str, format: &str, destination: &Path) -> Result<()> {
        let id = self.cache.fingerprint(destination, kind.as_str(), source, format);
        if !self.cache.exists(&id) {
            let bytes = self.generator.generate(kind, source, format)?;
            self.cache.store(&id, &bytes)?;
            log!("diagram"; "{kind} -> {}", destination.display());
        }
        self.cache.copy_to(&id, destination)
    }
}

impl DiagramRenderer<ExternalGenerator> {
    pub fn from_config(config: &DiagramConfig) -> Self {
        Self::new(
            ExternalGenerator::new(config.clone()),
            ArtifactCache::new(&config.cache),
            &config.output,
            &config.format,
        )
    }
}

/// Filter options, all optional.
#[derive(Debug, Default)]
pub struct Options {
    pub location: Option<String>,
    pub name: Option<String>,
    pub format: Option<String>,
    pub kind: Option<String>,
}

impl Options {
    fn from_kwargs(kwargs: &Kwargs) -> Result<Self, Error> {
        let options = Self {
            location: kwargs.get("location")?,
            name: kwargs.get("name")?,
            format: kwargs.get("format")?,
            kind: kwargs.get("kind")?,
        };
        kwargs.assert_all_used()?;
        Ok(options)
    }
}

/// Parse `text`, generate when `live`, return the figure HTML.
pub fn emit<G: Generator>(
    renderer: &DiagramRenderer<G>,
    text: &str,
    imghome: &str,
    live: bool,
    options: &Options,
) -> Result<String> {
    let fence = parse_fence(text)?;
    let kind = options
        .kind
        .as_deref()
        .or(fence.info.as_deref())
        .ok_or_else(|| BuildError::format("diagram kind missing (fence info string or `kind=`)"))?;
    let kind = Kind::parse(kind)?;
    let location = Location::parse(options.location.as_deref().unwrap_or("main"))?;
    let format = options.format.as_deref().unwrap_or(renderer.format());
    let name = match &options.name {
        Some(name) => name.clone(),
        None => default_name(kind, &fence.source, format),
    };

    if live {
        renderer.ensure(kind, &fence.source, format, &renderer.destination(imghome, &name))?;
    }

    let src = join_url(imghome, &name);
    Ok(Figure {
        src: &src,
        caption: &fence.caption,
        max_width: None,
        class: "",
        alt: "",
        location,
    }
    .to_html())
}

/// True when the context carries `ENV.DIAGRAMS` set to an on value.
fn is_live(state: &State) -> bool {
    state
        .lookup("ENV")
        .and_then(|env| env.get_attr("DIAGRAMS").ok())
        .and_then(|flag| flag.as_str().and_then(parse_switch).or_else(|| flag.is_true().then_some(true)))
        .unwrap_or(false)
}

/// Build the `diagram` filter around a shared renderer.
pub fn filter<G: Generator + 'static>(
    renderer: Arc<DiagramRenderer<G>>,
) -> impl Fn(&State, String, Kwargs) -> Result<Value, Error> + Send + Sync + 'static {
    move |state: &State, text: String, kwargs: Kwargs| {
        let options = Options::from_kwargs(&kwargs)?;
        let imghome = lookup_home(state, "imghome")?;
        let html = emit(renderer.as_ref(), &text, &imghome, is_live(state), &options).map_err(|e| {
            match e.downcast::<BuildError>() {
                Ok(e) => helper_error(e),
                Err(e) => Error::new(ErrorKind::InvalidOperation, format!("{e:#}")),
            }
        })?;
        Ok(Value::from_safe_string(html))
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use minijinja::{Environment, context};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Counting {
        calls: AtomicUsize,
    }

    impl Generator for Counting {
        fn generate(&self, kind: Kind, source: &str, format: &str) -> Result<Vec<u8>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(format!("<{format} kind='{kind}'>{source}</{format}>").into_bytes())
        }
    }

    impl Generator for Arc<Counting> {
        fn generate(&self, kind: Kind, source: &str, format: &str) -> Result<Vec<u8>> {
            self.as_ref().generate(kind, source, format)
        }
    }

    struct Failing;

    impl Generator for Failing {
        fn generate(&self, kind: Kind, _: &str, _: &str) -> Result<Vec<u8>> {
            Err(BuildError::tool_output(kind.as_str(), "Syntax Error?").into())
        }
    }

    const BLOCK: &str = "\n```dot\ndigraph { a -> b }\n```\nA *tiny* graph.\n";

    fn renderer<G: Generator>(generator: G, dir: &Path) -> DiagramRenderer<G> {
        DiagramRenderer::new(generator, ArtifactCache::new(dir.join("cache")), dir.join("site"), "svg")
    }

    #[test]
    fn test_parse_fence() {
        let fence = parse_fence(BLOCK).unwrap();
        assert_eq!(fence.info.as_deref(), Some("dot"));
        assert_eq!(fence.source, "digraph { a -> b }");
        assert_eq!(fence.caption, "A *tiny* graph.");
    }

    #[test]
    fn test_parse_fence_variants() {
        let fence = parse_fence("~~~~ {.ditaa}\n+--+\n|  |\n~~~~").unwrap();
        assert_eq!(fence.info.as_deref(), Some("ditaa"));
        assert_eq!(fence.source, "+--+\n|  |");
        assert_eq!(fence.caption, "");

        let fence = parse_fence("```\nA -> B\n```").unwrap();
        assert_eq!(fence.info, None);
    }

    #[test]
    fn test_parse_fence_errors() {
        assert!(parse_fence("").is_err());
        assert!(parse_fence("digraph {}").is_err());
        assert!(parse_fence("```dot\ndigraph {}\n").is_err());
        assert!(parse_fence("``dot\nx\n``").is_err());
    }

    #[test]
    fn test_default_name() {
        let name = default_name(Kind::Dot, "digraph {}", "svg");
        assert_eq!(name.len(), 16 + 4);
        assert!(name.ends_with(".svg"));
        assert_ne!(name, default_name(Kind::PlantUml, "digraph {}", "svg"));
    }

    #[test]
    fn test_generator_runs_once_and_destination_restored() {
        let dir = tempfile::tempdir().unwrap();
        let counting = Arc::new(Counting::default());
        let renderer = renderer(Arc::clone(&counting), dir.path());
        let options = Options::default();

        let first = emit(&renderer, BLOCK, "/img/2020", true, &options).unwrap();
        let name = default_name(Kind::Dot, "digraph { a -> b }", "svg");
        let destination = dir.path().join("site/img/2020").join(&name);
        assert!(destination.is_file());

        fs::remove_file(&destination).unwrap();
        let second = emit(&renderer, BLOCK, "/img/2020", true, &options).unwrap();

        assert_eq!(first, second);
        assert_eq!(counting.calls.load(Ordering::SeqCst), 1);
        assert!(destination.is_file());
        assert!(fs::read_to_string(&destination).unwrap().contains("kind='dot'"));
    }

    #[test]
    fn test_not_live_has_no_side_effects() {
        let dir = tempfile::tempdir().unwrap();
        let counting = Arc::new(Counting::default());
        let renderer = renderer(Arc::clone(&counting), dir.path());

        let html = emit(&renderer, BLOCK, "/img/", false, &Options::default()).unwrap();
        assert!(html.contains("src='/img/"));
        assert_eq!(counting.calls.load(Ordering::SeqCst), 0);
        assert!(!dir.path().join("site").exists());
        assert!(!dir.path().join("cache").exists());
    }

    #[test]
    fn test_options_override_fence() {
        let dir = tempfile::tempdir().unwrap();
        let renderer = renderer(Counting::default(), dir.path());
        let options = Options {
            location: Some("margin".into()),
            name: Some("flow.png".into()),
            format: Some("png".into()),
            kind: Some("plantuml".into()),
        };

        let html = emit(&renderer, BLOCK, "/img", true, &options).unwrap();
        assert!(html.contains("class='marginnote'"));
        assert!(html.contains("src='/img/flow.png'"));
        let written = fs::read_to_string(dir.path().join("site/img/flow.png")).unwrap();
        assert!(written.starts_with("<png kind='plantuml'>"));
    }

    #[test]
    fn test_generator_failure_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let renderer = renderer(Failing, dir.path());
        let err = emit(&renderer, BLOCK, "/img", true, &Options::default()).unwrap_err();
        assert!(matches!(err.downcast_ref::<BuildError>(), Some(BuildError::ExternalTool { .. })));
    }

    #[test]
    fn test_missing_kind() {
        let dir = tempfile::tempdir().unwrap();
        let renderer = renderer(Counting::default(), dir.path());
        assert!(emit(&renderer, "```\nx\n```", "/img", false, &Options::default()).is_err());
    }

    #[test]
    fn test_filter_respects_env_flag() {
        let dir = tempfile::tempdir().unwrap();
        let counting = Arc::new(Counting::default());
        let renderer = Arc::new(renderer(Arc::clone(&counting), dir.path()));
        let mut env = Environment::new();
        env.add_filter("diagram", filter(renderer));

        let template = "{% filter diagram(location='full') %}```dot\ndigraph {}\n```\ncap{% endfilter %}";
        let off = env
            .render_str(template, context! { imghome => "/img", ENV => context! { DIAGRAMS => "no" } })
            .unwrap();
        assert_eq!(counting.calls.load(Ordering::SeqCst), 0);
        assert!(off.contains("<figure class=''>"));

        env.render_str(template, context! { imghome => "/img", ENV => context! { DIAGRAMS => "yes" } })
            .unwrap();
        assert_eq!(counting.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_fix_ditaa_svg() {
        let svg = "<svg width='120'\n height='40' shape-rendering='geometricPrecision'><defs></defs></svg>";
        let fixed = fix_ditaa_svg(svg);
        assert!(fixed.contains("<svg viewBox='0 0 120 40' shape-rendering='geometricPrecision'>"));
        assert!(fixed.contains("</style>\n<defs>"));
    }

    #[test]
    fn test_check_output_markers() {
        let output = std::process::Command::new("sh")
            .args(["-c", "echo 'Syntax Error? line 2' >&2"])
            .output()
            .unwrap();
        assert!(check_output("plantuml", &output).is_err());

        let output = std::process::Command::new("sh").args(["-c", "echo fine"]).output().unwrap();
        assert!(check_output("plantuml", &output).is_ok());
    }
}
