//! Glob-based asset discovery: `glob(...)` and `globfile(...)`.

use super::{format::format_path, helper_error};
use crate::{
    error::BuildError,
    utils::path::{relative_to, to_slash},
};
use glob::Pattern;
use minijinja::{Error, value::{Kwargs, Value}};
use std::{
    fs,
    path::{Path, PathBuf},
};

/// Expand `pattern`, sorted. `**` only crosses directories when `recursive`.
///
/// No matches is an empty list, not an error.
pub fn expand(pattern: &str, recursive: bool) -> Result<Vec<PathBuf>, BuildError> {
    let pattern = if recursive {
        pattern.to_owned()
    } else {
        pattern.replace("**", "*")
    };
    let paths = glob::glob(&pattern)
        .map_err(|e| BuildError::format(format!("invalid glob `{pattern}`: {e}")))?;

    let mut found: Vec<PathBuf> = paths.filter_map(Result::ok).collect();
    found.sort();
    Ok(found)
}

/// Expand every pattern listed in `list`, one per line.
///
/// Blank lines and `#` comments are skipped; patterns are relative to the
/// directory holding `list`.
pub fn expand_file(list: &Path) -> Result<Vec<PathBuf>, BuildError> {
    let text = fs::read_to_string(list).map_err(|_| BuildError::MissingFile(list.to_path_buf()))?;
    let base = list.parent().unwrap_or(Path::new(""));
    let base = Pattern::escape(&base.to_string_lossy());

    let mut found = Vec::new();
    for line in text.lines().map(str::trim) {
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let pattern = if base.is_empty() {
            line.to_owned()
        } else {
            format!("{base}/{line}")
        };
        found.extend(expand(&pattern, true)?);
    }
    found.sort();
    Ok(found)
}

/// Rewrite matches relative to `rel`, then through the `fmt` specifier.
///
/// The result is sorted as strings, after rewriting.
pub fn present(
    paths: Vec<PathBuf>,
    rel: Option<&Path>,
    fmt: Option<&str>,
) -> Result<Vec<String>, BuildError> {
    let mut shown = paths
        .into_iter()
        .map(|path| {
            let path = match rel {
                Some(base) => relative_to(&path, base),
                None => path,
            };
            match fmt {
                Some(fmt) => format_path(fmt, &path),
                None => Ok(to_slash(&path)),
            }
        })
        .collect::<Result<Vec<_>, _>>()?;
    shown.sort();
    Ok(shown)
}

struct Options {
    rel: Option<String>,
    fmt: Option<String>,
}

impl Options {
    /// Positional arguments win; keywords fill the gaps.
    fn from_args(rel: Option<String>, fmt: Option<String>, kwargs: &Kwargs) -> Result<Self, Error> {
        Ok(Self {
            rel: rel.or(kwargs.get::<Option<String>>("rel")?),
            fmt: fmt.or(kwargs.get::<Option<String>>("fmt")?),
        })
    }

    fn present(&self, paths: Vec<PathBuf>) -> Result<Value, Error> {
        let found = present(paths, self.rel.as_deref().map(Path::new), self.fmt.as_deref())
            .map_err(helper_error)?;
        Ok(Value::from(found))
    }
}

/// `{% for img in glob("img/**/*.png", rel="img") %}`
pub fn glob(
    pattern: String,
    rel: Option<String>,
    fmt: Option<String>,
    kwargs: Kwargs,
) -> Result<Value, Error> {
    let options = Options::from_args(rel, fmt, &kwargs)?;
    let recursive = kwargs.get::<Option<bool>>("recursive")?.unwrap_or(true);
    kwargs.assert_all_used()?;

    options.present(expand(&pattern, recursive).map_err(helper_error)?)
}

/// `{% for post in globfile("posts.list", fmt="{:n}") %}`
pub fn globfile(
    list: String,
    rel: Option<String>,
    fmt: Option<String>,
    kwargs: Kwargs,
) -> Result<Value, Error> {
    let options = Options::from_args(rel, fmt, &kwargs)?;
    kwargs.assert_all_used()?;

    options.present(expand_file(Path::new(&list)).map_err(helper_error)?)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use minijinja::{Environment, context};

    fn tree() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        for file in ["posts/b.md", "posts/a.md", "posts/2020/c.md", "img/x.png"] {
            let path = dir.path().join(file);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, "").unwrap();
        }
        dir
    }

    fn root(dir: &tempfile::TempDir) -> String {
        Pattern::escape(&dir.path().to_string_lossy())
    }

    #[test]
    fn test_expand_sorted_and_recursive() {
        let dir = tree();
        let found = expand(&format!("{}/posts/**/*.md", root(&dir)), true).unwrap();
        let names: Vec<_> = present(found, Some(dir.path()), None).unwrap();
        assert_eq!(names, vec!["posts/2020/c.md", "posts/a.md", "posts/b.md"]);
    }

    #[test]
    fn test_expand_not_recursive() {
        let dir = tree();
        let found = expand(&format!("{}/posts/**/*.md", root(&dir)), false).unwrap();
        let names = present(found, Some(&dir.path().join("posts")), None).unwrap();
        assert_eq!(names, vec!["2020/c.md"]);
    }

    #[test]
    fn test_expand_no_match_is_empty() {
        let dir = tree();
        assert!(expand(&format!("{}/nothing/*.md", root(&dir)), true).unwrap().is_empty());
    }

    #[test]
    fn test_invalid_pattern() {
        assert!(matches!(expand("posts/[", true), Err(BuildError::Format(_))));
    }

    #[test]
    fn test_expand_file() {
        let dir = tree();
        let list = dir.path().join("assets.list");
        fs::write(&list, "# images\nimg/*.png\n\n  posts/a.md  \n").unwrap();

        let found = expand_file(&list).unwrap();
        let names = present(found, Some(dir.path()), Some("{:b}")).unwrap();
        assert_eq!(names, vec!["a.md", "x.png"]);
    }

    #[test]
    fn test_sorted_as_strings() {
        let dir = tempfile::tempdir().unwrap();
        for file in ["p/a/c.md", "p/a-b.md"] {
            let path = dir.path().join(file);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, "").unwrap();
        }

        let found = expand(&format!("{}/p/**/*.md", root(&dir)), true).unwrap();
        let names = present(found, Some(dir.path()), None).unwrap();
        assert_eq!(names, vec!["p/a-b.md", "p/a/c.md"]);
    }

    #[test]
    fn test_sorted_after_fmt() {
        let dir = tempfile::tempdir().unwrap();
        for file in ["a/2021-01-01-y.md", "b/2020-01-01-x.md"] {
            let path = dir.path().join(file);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, "").unwrap();
        }
        let list = dir.path().join("posts.list");
        fs::write(&list, "*/*.md\n").unwrap();

        let found = expand(&format!("{}/*/*.md", root(&dir)), true).unwrap();
        let names = present(found, None, Some("{:n}")).unwrap();
        assert_eq!(names, vec!["2020-01-01-x", "2021-01-01-y"]);

        let names = present(expand_file(&list).unwrap(), Some(dir.path()), Some("{:n}")).unwrap();
        assert_eq!(names, vec!["2020-01-01-x", "2021-01-01-y"]);
    }

    #[test]
    fn test_expand_file_missing() {
        let err = expand_file(Path::new("/nonexistent/list")).unwrap_err();
        assert!(matches!(err, BuildError::MissingFile(_)));
    }

    #[test]
    fn test_glob_in_template() {
        let dir = tree();
        let mut env = Environment::new();
        env.add_function("glob", glob);

        let out = env
            .render_str(
                "{{ glob(pattern, rel=base, fmt='{:n.html}') | join(' ') }}|{{ glob(none_pattern) | length }}",
                context! {
                    pattern => format!("{}/posts/*.md", root(&dir)),
                    base => dir.path().join("posts").to_string_lossy().into_owned(),
                    none_pattern => format!("{}/*.none", root(&dir)),
                },
            )
            .unwrap();
        assert_eq!(out, "a.html b.html|0");
    }

    #[test]
    fn test_glob_rejects_unknown_keyword() {
        let mut env = Environment::new();
        env.add_function("glob", glob);
        assert!(env.render_str("{{ glob('*.md', sort=false) }}", ()).is_err());
    }
}
