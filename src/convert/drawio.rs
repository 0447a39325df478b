//! draw.io exports: PDF pages to SVG with a transparent background.

use crate::{
    error::BuildError,
    exec, log,
    templating::glob::expand,
};
use anyhow::{Context, Result};
use glob::Pattern;
use std::{
    fs,
    path::{Path, PathBuf},
};

/// White full-page `<path>` or `<rect>` that pdf2svg emits first.
pub fn is_background(line: &str) -> bool {
    let white = line.contains("stroke:none")
        && line.contains("fill:rgb(100%,100%,100%)")
        && line.contains("fill-opacity:1");
    let path = line.starts_with("<path ") && line.contains("fill-rule:nonzero") && line.contains("d=\"M 0 0");
    let rect = line.starts_with("<rect ") && line.contains("x=\"0\"") && line.contains("y=\"0\"");
    white && (path || rect)
}

/// Drop background lines; returns the SVG and how many were dropped.
pub fn strip_background(svg: &str) -> Result<(String, usize), BuildError> {
    let mut out = String::with_capacity(svg.len());
    let mut dropped = 0;
    for line in svg.split_inclusive('\n') {
        if is_background(line) {
            if !line.trim_end().ends_with("/>") {
                return Err(BuildError::format(format!(
                    "background element spans several lines: {}",
                    line.trim_end()
                )));
            }
            dropped += 1;
            continue;
        }
        out.push_str(line);
    }
    Ok((out, dropped))
}

fn find(dir: &Path, ext: &str) -> Result<Vec<PathBuf>, BuildError> {
    let pattern = format!("{}/*.{ext}", Pattern::escape(&dir.to_string_lossy()));
    expand(&pattern, false)
}

fn require_dir(dir: &Path) -> Result<(), BuildError> {
    if dir.is_dir() {
        Ok(())
    } else {
        Err(BuildError::MissingFile(dir.to_path_buf()))
    }
}

fn copy_drawio(drawio: &Path, dstdir: &Path) -> Result<()> {
    let name = drawio.file_name().unwrap_or_default();
    let dst = dstdir.join(name);
    fs::copy(drawio, &dst)
        .with_context(|| format!("Failed to copy {} to {}", drawio.display(), dst.display()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(&dst, fs::Permissions::from_mode(0o644))
            .with_context(|| format!("Failed to chmod {}", dst.display()))?;
    }
    Ok(())
}

fn convert_pdf(pdf: &Path, dstdir: &Path) -> Result<()> {
    let scratch = tempfile::tempdir().context("Failed to create scratch dir")?;
    let raw = scratch.path().join("page.svg");
    exec!(["pdf2svg"]; pdf, &raw)?;

    let svg = fs::read_to_string(&raw)
        .map_err(|_| BuildError::tool_output("pdf2svg", format!("no svg for {}", pdf.display())))?;
    let (svg, dropped) = strip_background(&svg)?;
    match dropped {
        0 => log!("warn"; "no background found in {}", pdf.display()),
        1 => {}
        n => log!("warn"; "{n} background lines found in {}", pdf.display()),
    }

    let stem = pdf.file_stem().unwrap_or_default();
    let dst = dstdir.join(format!("{}.svg", stem.to_string_lossy()));
    fs::write(&dst, svg).with_context(|| format!("Failed to write {}", dst.display()))?;
    log!("drawio"; "{}", dst.display());
    Ok(())
}

/// `quire drawio`
pub fn run(srcdir: &Path, dstdir: &Path) -> Result<()> {
    require_dir(srcdir)?;
    require_dir(dstdir)?;

    let drawios = find(srcdir, "drawio")?;
    let drawio = match drawios.as_slice() {
        [one] => one,
        [] => {
            return Err(BuildError::format(format!("no draw.io file in {}", srcdir.display())).into());
        }
        many => {
            return Err(BuildError::format(format!(
                "found {} draw.io files in {}, expected one",
                many.len(),
                srcdir.display()
            ))
            .into());
        }
    };

    let pdfs = find(srcdir, "pdf")?;
    if pdfs.is_empty() {
        return Err(BuildError::format(format!("no PDF file in {}", srcdir.display())).into());
    }

    copy_drawio(drawio, dstdir)?;
    for pdf in &pdfs {
        convert_pdf(pdf, dstdir)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const PATH_BG: &str = r#"<path style=" stroke:none;fill-rule:nonzero;fill:rgb(100%,100%,100%);fill-opacity:1;" d="M 0 0 L 391 0 L 391 241.945312 L 0 241.945312 Z M 0 0 "/>"#;
    const RECT_BG: &str = r#"<rect x="0" y="0" width="312" height="156" style="fill:rgb(100%,100%,100%);fill-opacity:1;stroke:none;"/>"#;

    #[test]
    fn test_is_background() {
        assert!(is_background(PATH_BG));
        assert!(is_background(RECT_BG));
        assert!(!is_background(r#"<path style="stroke:none;fill:rgb(0%,0%,0%);fill-opacity:1;" d="M 0 0"/>"#));
        assert!(!is_background(r#"<rect x="5" y="0" style="fill:rgb(100%,100%,100%);fill-opacity:1;stroke:none;"/>"#));
    }

    #[test]
    fn test_strip_background() {
        let svg = format!("<svg>\n{PATH_BG}\n<g>\n</g>\n</svg>\n");
        let (out, dropped) = strip_background(&svg).unwrap();
        assert_eq!(dropped, 1);
        assert_eq!(out, "<svg>\n<g>\n</g>\n</svg>\n");

        let (out, dropped) = strip_background("<svg>\n</svg>\n").unwrap();
        assert_eq!(dropped, 0);
        assert_eq!(out, "<svg>\n</svg>\n");
    }

    #[test]
    fn test_strip_background_multiline_element() {
        let svg = format!("{}\n", RECT_BG.trim_end_matches("/>"));
        assert!(strip_background(&svg).is_err());
    }

    #[test]
    fn test_run_requires_single_drawio() {
        let src = tempfile::tempdir().unwrap();
        let dst = tempfile::tempdir().unwrap();

        let err = run(src.path(), dst.path()).unwrap_err();
        assert!(err.to_string().contains("no draw.io file"));

        fs::write(src.path().join("a.drawio"), "").unwrap();
        let err = run(src.path(), dst.path()).unwrap_err();
        assert!(err.to_string().contains("no PDF file"));

        fs::write(src.path().join("b.drawio"), "").unwrap();
        let err = run(src.path(), dst.path()).unwrap_err();
        assert!(err.to_string().contains("found 2 draw.io files"));
    }

    #[test]
    fn test_run_requires_directories() {
        let dir = tempfile::tempdir().unwrap();
        let err = run(&dir.path().join("nope"), dir.path()).unwrap_err();
        assert!(matches!(err.downcast_ref::<BuildError>(), Some(BuildError::MissingFile(_))));
    }

    #[cfg(unix)]
    #[test]
    fn test_copy_drawio_mode() {
        use std::os::unix::fs::PermissionsExt;
        let src = tempfile::tempdir().unwrap();
        let dst = tempfile::tempdir().unwrap();
        let drawio = src.path().join("a.drawio");
        fs::write(&drawio, "<mxfile/>").unwrap();

        copy_drawio(&drawio, dst.path()).unwrap();
        let mode = fs::metadata(dst.path().join("a.drawio")).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o644);
    }
}
