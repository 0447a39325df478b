//! External command execution utilities.
//!
//! Provides the `exec!` macro for running generators and converters with
//! output filtering, plus `shell` for user-supplied rebuild commands.

use crate::{error::BuildError, log};
use anyhow::{Context, Result};
use regex::Regex;
use std::{
    ffi::{OsStr, OsString},
    path::Path,
    process::{Command, ExitStatus, Output},
    sync::OnceLock,
};

// ============================================================================
// Macros
// ============================================================================

/// Run an external command with arguments.
///
/// # Examples
/// ```ignore
/// // Without working directory
/// exec!(["dot"]; "-Tsvg", "-o", dst, src)?;
///
/// // With working directory
/// exec!(root; ["pdf2svg"]; pdf, svg)?;
///
/// // With custom filter
/// const MY_FILTER: FilterRule = FilterRule::new(&["Warning:"]);
/// exec!(filter=&MY_FILTER; ["optipng"]; "-o7", src)?;
/// ```
#[macro_export]
macro_rules! exec {
    (filter=$filter:expr; $($rest:tt)*) => {
        $crate::exec_internal!(@parse_root $filter; $($rest)*)
    };
    ($($rest:tt)*) => {
        $crate::exec_internal!(@parse_root &$crate::utils::exec::EMPTY_FILTER; $($rest)*)
    };
}

#[macro_export]
#[doc(hidden)]
macro_rules! exec_internal {
    // Parse root and command (with root)
    (@parse_root $filter:expr; $root:expr; $cmd:expr; $($arg:expr),* $(,)?) => {
        $crate::utils::exec::exec(
            Some($root),
            &$crate::utils::exec::internal::to_cmd_vec($cmd),
            &$crate::utils::exec::internal::filter_args(&[$($crate::utils::exec::internal::to_os($arg)),*]),
            $filter,
        )
    };
    // Parse command (without root)
    (@parse_root $filter:expr; $cmd:expr; $($arg:expr),* $(,)?) => {
        $crate::utils::exec::exec(
            None,
            &$crate::utils::exec::internal::to_cmd_vec($cmd),
            &$crate::utils::exec::internal::filter_args(&[$($crate::utils::exec::internal::to_os($arg)),*]),
            $filter,
        )
    };
}

// ============================================================================
// Argument Conversion
// ============================================================================

#[doc(hidden)]
#[allow(clippy::wildcard_imports)]
pub mod internal {
    use super::*;

    #[inline]
    pub fn to_os<S: Into<OsString>>(s: S) -> OsString {
        s.into()
    }

    /// Trait for converting to command vector.
    pub trait ToCmd {
        fn to_cmd(self) -> Vec<OsString>;
    }

    impl<const N: usize> ToCmd for [&str; N] {
        #[inline]
        fn to_cmd(self) -> Vec<OsString> {
            self.into_iter().map(OsString::from).collect()
        }
    }

    impl<const N: usize> ToCmd for [&OsStr; N] {
        #[inline]
        fn to_cmd(self) -> Vec<OsString> {
            self.into_iter().map(OsString::from).collect()
        }
    }

    impl ToCmd for &[String] {
        #[inline]
        fn to_cmd(self) -> Vec<OsString> {
            self.iter().map(OsString::from).collect()
        }
    }

    #[inline]
    pub fn to_cmd_vec<C: ToCmd>(cmd: C) -> Vec<OsString> {
        cmd.to_cmd()
    }

    /// Filter out empty args.
    #[inline]
    pub fn filter_args(args: &[OsString]) -> Vec<OsString> {
        args.iter().filter(|a| !a.is_empty()).cloned().collect()
    }
}

// ============================================================================
// Command Execution
// ============================================================================

/// Execute a command and capture its output.
///
/// # Errors
/// `BuildError::ExternalTool` if the command exits non-zero, an io error if it
/// cannot be started at all.
pub fn exec(
    root: Option<&Path>,
    cmd: &[OsString],
    args: &[OsString],
    filter: &'static FilterRule,
) -> Result<Output> {
    let (name, mut command) = prepare(root, cmd, args)?;

    let output = command
        .output()
        .with_context(|| format!("Failed to execute `{name}`"))?;

    if !output.status.success() {
        return Err(BuildError::tool(&name, output.status, format_error(&output, filter)).into());
    }

    // On success, only log stderr (warnings) to reduce noise
    let stderr = String::from_utf8_lossy(&output.stderr);
    filter.log(&name, stderr.trim());

    Ok(output)
}

/// Run a command line through `sh -c` with inherited stdio.
///
/// Extra environment variables are set on the child only.
pub fn shell(root: Option<&Path>, command_line: &str, envs: &[(&str, &OsStr)]) -> Result<ExitStatus> {
    let mut command = Command::new("sh");
    command.arg("-c").arg(command_line);
    for (key, value) in envs {
        command.env(key, value);
    }
    if let Some(dir) = root {
        command.current_dir(dir);
    }
    command
        .status()
        .with_context(|| format!("Failed to execute `{command_line}`"))
}

/// Prepare a Command from components.
fn prepare(root: Option<&Path>, cmd: &[OsString], args: &[OsString]) -> Result<(String, Command)> {
    let name = cmd
        .first()
        .and_then(|s| s.to_str())
        .context("Empty command")?
        .to_owned();

    let mut command = Command::new(&cmd[0]);
    command.args(&cmd[1..]).args(args);

    if let Some(dir) = root {
        command.current_dir(dir);
    }

    Ok((name, command))
}

// ============================================================================
// Output Filtering
// ============================================================================

fn strip_ansi(s: &str) -> std::borrow::Cow<'_, str> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"\x1b\[[0-9;]*m").unwrap());
    re.replace_all(s, "")
}

/// Filter rule for skipping known noise in tool output.
pub struct FilterRule {
    /// Prefixes to match at the start of output lines.
    pub skip_prefixes: &'static [&'static str],
}

impl FilterRule {
    pub const fn new(skip_prefixes: &'static [&'static str]) -> Self {
        Self { skip_prefixes }
    }

    /// Returns true if output is empty or starts with any of the skip prefixes.
    fn should_skip(&self, output: &str) -> bool {
        output.is_empty() || self.skip_prefixes.iter().any(|p| output.starts_with(p))
    }

    /// Lines that survive the filter, ANSI codes kept.
    fn keep<'a>(&self, output: &'a str) -> Vec<&'a str> {
        output
            .lines()
            .filter(|line| !self.should_skip(strip_ansi(line).trim()))
            .collect()
    }

    fn log(&self, name: &str, output: &str) {
        let lines = self.keep(output);
        if !lines.is_empty() {
            log!(name; "{}", lines.join("\n"));
        }
    }
}

/// Stdout filter: skip SVG and XML payloads.
const STDOUT_FILTER: FilterRule = FilterRule::new(&["<?xml", "<svg"]);

/// Empty filter (no skipping).
pub const EMPTY_FILTER: FilterRule = FilterRule::new(&[]);

/// Format the detail part of a failure: filtered stderr, then stdout.
fn format_error(output: &Output, filter: &'static FilterRule) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr);
    let stdout = String::from_utf8_lossy(&output.stdout);

    let mut msg = filter.keep(stderr.trim()).join("\n");

    let stdout_trimmed = stdout.trim();
    if !stdout_trimmed.is_empty() && !STDOUT_FILTER.should_skip(stdout_trimmed) {
        if !msg.is_empty() {
            msg.push('\n');
        }
        msg.push_str("Stdout:\n");
        msg.push_str(stdout_trimmed);
    }
    msg
}

// ============================================================================
// Tests
// ============================================================================
