//! Template rendering with the blog helper library.
//!
//! | Name          | Kind     | Module    |
//! |---------------|----------|-----------|
//! | `glob`        | function | [`glob`]  |
//! | `globfile`    | function | [`glob`]  |
//! | `date`        | filter   | [`filters`] |
//! | `j2`          | filter   | [`filters`] |
//! | `on` / `off`  | test     | [`filters`] |
//! | `figure` ...  | function | [`figure`] |
//! | `marginnote`  | function | [`figure`] |
//! | `asset`       | function | [`figure`] |
//! | `diagram`     | filter   | [`diagram`] |

pub mod diagram;
pub mod figure;
pub mod filters;
pub mod format;
pub mod glob;

use crate::{
    config::{DiagramConfig, SiteConfig},
    error::{BuildError, require_file},
    log,
};
use anyhow::{Context, Result};
use diagram::DiagramRenderer;
use minijinja::{AutoEscape, Environment, Error, ErrorKind, path_loader, value::Value};
use serde_yaml::Mapping;
use std::{
    collections::BTreeMap,
    env, fs,
    path::{Path, PathBuf},
    sync::Arc,
};

/// Surface a build error from inside a helper.
pub(crate) fn helper_error(e: BuildError) -> Error {
    Error::new(ErrorKind::InvalidOperation, e.to_string()).with_source(e)
}

/// Environment with every helper registered, loading templates from `root`.
pub fn environment(root: &Path, diagrams: &DiagramConfig) -> Environment<'static> {
    let mut env = Environment::new();
    env.set_loader(path_loader(root.to_path_buf()));
    env.set_keep_trailing_newline(true);
    // No autoescape, whatever the template name.
    env.set_auto_escape_callback(|_| AutoEscape::None);

    env.add_function("glob", glob::glob);
    env.add_function("globfile", glob::globfile);

    env.add_filter("date", filters::date);
    env.add_filter("j2", filters::j2);
    env.add_test("on", filters::is_on);
    env.add_test("off", filters::is_off);

    env.add_function("figure", figure::figure);
    env.add_function("marginfig", figure::marginfig);
    env.add_function("fullfig", figure::fullfig);
    env.add_function("mainfig", figure::mainfig);
    env.add_function("marginnote", figure::marginnote);
    env.add_function("asset", figure::asset);

    let renderer = Arc::new(DiagramRenderer::from_config(diagrams));
    env.add_filter("diagram", diagram::filter(renderer));
    env
}

/// Arguments of one `render` invocation.
#[derive(Debug, Clone)]
pub struct RenderJob<'a> {
    pub template: &'a Path,
    pub output: &'a Path,
    pub data: &'a [PathBuf],
    /// Loader root; defaults to the template's directory.
    pub templates: Option<&'a Path>,
    pub site: Option<&'a Path>,
}

/// Top-level render context: `ENV`, `site`, then every data file's keys.
pub fn build_context(site: Option<&SiteConfig>, data: &[PathBuf]) -> Result<BTreeMap<String, serde_yaml::Value>> {
    let mut ctx = BTreeMap::new();

    let environ: BTreeMap<String, String> = env::vars_os()
        .map(|(k, v)| (k.to_string_lossy().into_owned(), v.to_string_lossy().into_owned()))
        .collect();
    ctx.insert("ENV".to_owned(), serde_yaml::to_value(environ)?);

    if let Some(site) = site {
        ctx.insert("site".to_owned(), site.template_vars()?);
    }

    for path in data {
        let path = require_file(path)?;
        let text = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let mapping: Mapping = match serde_yaml::from_str::<Option<Mapping>>(&text) {
            Ok(mapping) => mapping.unwrap_or_default(),
            Err(e) => {
                return Err(BuildError::format(format!(
                    "{}: data file must be a YAML mapping: {e}",
                    path.display()
                ))
                .into());
            }
        };
        for (key, value) in mapping {
            let key = key
                .as_str()
                .map(str::to_owned)
                .ok_or_else(|| BuildError::format(format!("{}: non-string key", path.display())))?;
            ctx.insert(key, value);
        }
    }
    Ok(ctx)
}

/// Render `template` with the given context.
pub fn render_file(env: &Environment<'_>, template: &Path, ctx: &BTreeMap<String, serde_yaml::Value>) -> Result<String> {
    let source = fs::read_to_string(template)
        .with_context(|| format!("Failed to read {}", template.display()))?;
    let name = template.to_string_lossy();
    let out = env
        .render_named_str(&name, &source, Value::from_serialize(ctx))
        .map_err(|e| anyhow::anyhow!("{e:#}"))
        .with_context(|| format!("Failed to render {}", template.display()))?;
    Ok(out)
}

/// `quire render`
pub fn run(job: RenderJob<'_>) -> Result<()> {
    let template = require_file(job.template)?;

    let site = match job.site {
        Some(path) => {
            let mut site = SiteConfig::from_path(&require_file(path)?)?;
            site.take_page_defaults();
            Some(site)
        }
        None => None,
    };
    let diagrams = site.as_ref().map(|s| s.diagrams.clone()).unwrap_or_default();

    let root = match job.templates {
        Some(dir) => dir.to_path_buf(),
        None => template.parent().map(Path::to_path_buf).unwrap_or_default(),
    };
    let root = if root.as_os_str().is_empty() { PathBuf::from(".") } else { root };

    let env = environment(&root, &diagrams);
    let ctx = build_context(site.as_ref(), job.data)?;
    let out = render_file(&env, &template, &ctx)?;

    if let Some(parent) = job.output.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    fs::write(job.output, out).with_context(|| format!("Failed to write {}", job.output.display()))?;

    log!("render"; "{}", job.output.display());
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================
