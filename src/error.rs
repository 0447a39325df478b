//! Error taxonomy shared by every subcommand.
//!
//! Command code propagates these through `anyhow`; template helpers wrap
//! them into `minijinja::Error` so they surface with template location.

use std::{path::PathBuf, process::ExitStatus};
use thiserror::Error;

/// Errors that abort a single invocation.
#[derive(Debug, Error)]
pub enum BuildError {
    /// Wrong arity or malformed command-line argument.
    #[error("invalid arguments: {0}")]
    Argument(String),

    /// Expected input or intermediate file absent.
    #[error("missing file `{}`", .0.display())]
    MissingFile(PathBuf),

    /// External generator or converter failed.
    #[error("`{tool}` failed ({status}){}", fmt_detail(.detail))]
    ExternalTool {
        tool: String,
        status: String,
        detail: String,
    },

    /// Input did not match the expected shape.
    #[error("{0}")]
    Format(String),
}

impl BuildError {
    pub fn argument(msg: impl Into<String>) -> Self {
        Self::Argument(msg.into())
    }

    pub fn format(msg: impl Into<String>) -> Self {
        Self::Format(msg.into())
    }

    pub fn tool(tool: impl Into<String>, status: ExitStatus, detail: impl Into<String>) -> Self {
        Self::ExternalTool {
            tool: tool.into(),
            status: status.to_string(),
            detail: detail.into(),
        }
    }

    /// Tool ran with a zero exit code but reported an error in its output.
    pub fn tool_output(tool: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::ExternalTool {
            tool: tool.into(),
            status: "error in output".into(),
            detail: detail.into(),
        }
    }
}

fn fmt_detail(detail: &str) -> String {
    if detail.is_empty() {
        String::new()
    } else {
        format!("\n{detail}")
    }
}

/// Fail with `MissingFile` unless `path` exists.
pub fn require_file(path: impl Into<PathBuf>) -> Result<PathBuf, BuildError> {
    let path = path.into();
    if path.exists() {
        Ok(path)
    } else {
        Err(BuildError::MissingFile(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_display() {
        let err = BuildError::MissingFile(PathBuf::from("posts/a.md"));
        assert_eq!(err.to_string(), "missing file `posts/a.md`");
    }

    #[test]
    fn test_tool_output_display() {
        let err = BuildError::tool_output("plantuml", "Syntax Error?");
        let display = err.to_string();
        assert!(display.starts_with("`plantuml` failed (error in output)"));
        assert!(display.ends_with("\nSyntax Error?"));
    }

    #[test]
    fn test_tool_without_detail() {
        let err = BuildError::tool_output("dot", "");
        assert_eq!(err.to_string(), "`dot` failed (error in output)");
    }

    #[test]
    fn test_require_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("site.yml");
        assert!(matches!(
            require_file(&file),
            Err(BuildError::MissingFile(p)) if p == file
        ));

        std::fs::write(&file, "title: x").unwrap();
        assert_eq!(require_file(&file).unwrap(), file);
    }
}
