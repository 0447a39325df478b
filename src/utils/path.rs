//! Lexical path helpers.

use std::{
    env,
    path::{Component, Path, PathBuf},
};

/// Normalize `.` and `..` components without touching the filesystem.
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match out.components().next_back() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir | Component::Prefix(_)) => {}
                _ => out.push(".."),
            },
            other => out.push(other),
        }
    }
    out
}

/// `path` expressed relative to `base`, computed lexically.
///
/// Mixed absolute/relative inputs are resolved against the current directory
/// first. An identical path yields `.`.
pub fn relative_to(path: &Path, base: &Path) -> PathBuf {
    let (path, base) = if path.is_absolute() == base.is_absolute() {
        (normalize(path), normalize(base))
    } else {
        let cwd = env::current_dir().unwrap_or_default();
        (normalize(&cwd.join(path)), normalize(&cwd.join(base)))
    };

    let path_parts: Vec<_> = path.components().collect();
    let base_parts: Vec<_> = base.components().collect();
    let common = path_parts
        .iter()
        .zip(&base_parts)
        .take_while(|(a, b)| a == b)
        .count();

    let mut rel = PathBuf::new();
    for _ in common..base_parts.len() {
        rel.push("..");
    }
    for part in &path_parts[common..] {
        rel.push(part);
    }

    if rel.as_os_str().is_empty() {
        PathBuf::from(".")
    } else {
        rel
    }
}

/// Join URL-ish path segments with `/`, like `os.path.join` on POSIX.
///
/// An absolute later segment replaces what came before; an empty last
/// segment leaves a trailing slash.
pub fn join_url(base: &str, part: &str) -> String {
    if part.starts_with('/') || base.is_empty() {
        part.to_owned()
    } else if base.ends_with('/') {
        format!("{base}{part}")
    } else {
        format!("{base}/{part}")
    }
}

/// Render a path with forward slashes for URLs and templates.
pub fn to_slash(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
        .replacen("//", "/", 1)
}
