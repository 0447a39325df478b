//! Path format specifiers for the `fmt` argument of the glob helpers.
//!
//! | Spec                | `posts/2020-01-02-hi.md` renders as |
//! |---------------------|-------------------------------------|
//! | `{:b}` `{:basename}`| `2020-01-02-hi.md`                  |
//! | `{:n}` `{:name}`    | `2020-01-02-hi`                     |
//! | `{:n.html}`         | `2020-01-02-hi.html`                |
//! | `{:f}` `{:full}`    | `posts/2020-01-02-hi.md`            |
//! | `{:f.yml}`          | `posts/2020-01-02-hi.yml`           |
//! | `{:D}`              | `2020/01/02/hi`                     |
//!
//! `{:n.html, yml}` renders the whole format once per extension, and the
//! renderings are joined with spaces.

use crate::{error::BuildError, utils::path::to_slash};
use regex::Regex;
use std::{path::Path, sync::LazyLock};

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\{:([^}]*)\}").unwrap());
static DATED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d{4})-(\d{2})-(\d{2})-(.+)$").unwrap());

enum Spec {
    Basename,
    Name,
    Full,
    Dated,
    NameWith(Vec<String>),
    FullWith(Vec<String>),
}

impl Spec {
    fn parse(raw: &str) -> Result<Self, BuildError> {
        let raw = raw.trim();
        let spec = match raw {
            "b" | "basename" => Self::Basename,
            "n" | "name" => Self::Name,
            "f" | "full" => Self::Full,
            "D" => Self::Dated,
            _ => match raw.split_once('.') {
                Some(("n" | "name", exts)) => Self::NameWith(split_exts(exts)),
                Some(("f" | "full", exts)) => Self::FullWith(split_exts(exts)),
                _ => return Err(BuildError::format(format!("unknown path format `{{:{raw}}}`"))),
            },
        };
        Ok(spec)
    }

    fn rounds(&self) -> usize {
        match self {
            Self::NameWith(exts) | Self::FullWith(exts) => exts.len(),
            _ => 1,
        }
    }

    fn render(&self, path: &Path, round: usize) -> Result<String, BuildError> {
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let out = match self {
            Self::Basename => path
                .file_name()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default(),
            Self::Name => stem,
            Self::Full => to_slash(path),
            Self::Dated => {
                let caps = DATED.captures(&stem).ok_or_else(|| {
                    BuildError::format(format!(
                        "`{}` is not named YYYY-MM-DD-name",
                        path.display()
                    ))
                })?;
                format!("{}/{}/{}/{}", &caps[1], &caps[2], &caps[3], &caps[4])
            }
            Self::NameWith(exts) => format!("{stem}.{}", pick(exts, round)),
            Self::FullWith(exts) => to_slash(&path.with_extension(pick(exts, round))),
        };
        Ok(out)
    }
}

fn split_exts(exts: &str) -> Vec<String> {
    exts.split(',')
        .map(|e| e.trim().trim_start_matches('.').to_owned())
        .filter(|e| !e.is_empty())
        .collect()
}

/// Extension for `round`; shorter lists repeat their last entry.
fn pick(exts: &[String], round: usize) -> &str {
    exts.get(round)
        .or_else(|| exts.last())
        .map_or("", String::as_str)
}

/// Render `fmt` for `path`.
pub fn format_path(fmt: &str, path: &Path) -> Result<String, BuildError> {
    let specs = PLACEHOLDER
        .captures_iter(fmt)
        .map(|caps| Spec::parse(&caps[1]))
        .collect::<Result<Vec<_>, _>>()?;
    let rounds = specs.iter().map(Spec::rounds).max().unwrap_or(1).max(1);

    let mut renderings = Vec::with_capacity(rounds);
    for round in 0..rounds {
        let mut out = String::with_capacity(fmt.len() + 32);
        let mut last = 0;
        for (m, spec) in PLACEHOLDER.find_iter(fmt).zip(&specs) {
            out.push_str(&fmt[last..m.start()]);
            out.push_str(&spec.render(path, round)?);
            last = m.end();
        }
        out.push_str(&fmt[last..]);
        renderings.push(out);
    }
    Ok(renderings.join(" "))
}
