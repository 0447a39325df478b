//! Reactive development server.
//!
//! A static file server built on `tiny_http` that can rebuild a page before
//! serving it:
//!
//! - Static files from `--directory`, content type by extension
//! - `index.html` resolution and a plain listing for directories
//! - Requests whose local path matches a `--trigger` glob first run
//!   `--command` through `sh -c`; a failing command answers 418
//! - Graceful shutdown on Ctrl+C
//!
//! Every request runs on its own [`Background`] thread. The accept loop owns
//! the handles, reaps finished ones as it goes, and cancels and joins the rest
//! on shutdown.

use crate::{
    generator::escape_xml,
    log,
    templating::glob::expand,
    utils::{
        exec::shell,
        path::normalize,
        worker::{self, Background, CancelToken},
    },
};
use anyhow::{Context, Result, anyhow};
use glob::Pattern;
use std::{
    borrow::Cow,
    ffi::OsStr,
    fs,
    net::{SocketAddr, ToSocketAddrs},
    path::{Path, PathBuf},
    sync::Arc,
};
use tiny_http::{Header, Method, Request, Response, Server, StatusCode};

// ============================================================================
// Constants
// ============================================================================

/// Directory listing page; `{path}` and `{entries}` are substituted.
const DIRECTORY_TEMPLATE: &str = r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<title>Directory listing for {path}</title>
</head>
<body>
<h1>Directory listing for {path}</h1>
<hr>
<ul>
{entries}
</ul>
<hr>
</body>
</html>
"#;

/// Body of the 418 answer when the rebuild command fails.
const REBUILD_FAILED: &str = "Recompilation failed";

// ============================================================================
// Options
// ============================================================================

/// Everything `quire serve` needs, straight from the command line.
#[derive(Debug, Clone)]
pub struct ServeOptions {
    pub bind: String,
    pub port: u16,
    pub directory: PathBuf,
    pub command: String,
    pub triggers: Vec<String>,
}

impl ServeOptions {
    /// Local path of a request URL under the served directory.
    ///
    /// The query string and fragment are dropped, the path is percent
    /// decoded, and `.`/`..`/empty segments are ignored so the result never
    /// leaves the directory.
    pub fn translate_path(&self, url: &str) -> PathBuf {
        let path = url.split(['?', '#']).next().unwrap_or_default();
        let decoded = urlencoding::decode(path).unwrap_or(Cow::Borrowed(path));

        decoded
            .split('/')
            .filter(|segment| !segment.is_empty() && *segment != "." && *segment != "..")
            .fold(self.directory.clone(), |local, segment| local.join(segment))
    }

    /// First trigger whose expansion contains `local`.
    ///
    /// Relative trigger patterns are resolved against the served directory.
    /// Only existing files can match.
    pub fn matching_trigger(&self, local: &Path) -> Result<Option<&str>> {
        let local = normalize(local);
        for trigger in &self.triggers {
            let pattern = if Path::new(trigger).is_absolute() {
                trigger.clone()
            } else {
                format!("{}/{trigger}", Pattern::escape(&self.directory.to_string_lossy()))
            };
            if expand(&pattern, true)?.iter().any(|p| normalize(p) == local) {
                return Ok(Some(trigger.as_str()));
            }
        }
        Ok(None)
    }

    /// Run the rebuild command for `local`; false when it exits non-zero.
    ///
    /// `PAGETARGET` is only passed for `.html` targets.
    fn rebuild(&self, local: &Path) -> Result<bool> {
        let target = [("PAGETARGET", local.as_os_str())];
        let envs: &[(&str, &OsStr)] = if local.extension() == Some(OsStr::new("html")) {
            log!("rebuild"; "recompiling {}", local.display());
            &target
        } else {
            log!("rebuild"; "recompiling <all>");
            &[]
        };

        let status = shell(None, &self.command, envs)?;
        if !status.success() {
            log!("error"; "`{}` failed with {status}", self.command);
        }
        Ok(status.success())
    }
}

// ============================================================================
// Server Entry Point
// ============================================================================

/// `quire serve`
///
/// Blocks until Ctrl+C is received.
pub fn run(options: ServeOptions) -> Result<()> {
    let addr = resolve(&options.bind, options.port)?;
    let server = Server::http(addr).map_err(|e| anyhow!("Failed to bind {addr}: {e}"))?;
    let server = Arc::new(server);

    // Set up Ctrl+C handler for graceful shutdown
    let server_for_signal = Arc::clone(&server);
    ctrlc::set_handler(move || {
        log!("serve"; "shutting down...");
        server_for_signal.unblock();
    })
    .context("Failed to set Ctrl+C handler")?;

    let addr = server.server_addr().to_ip().unwrap_or(addr);
    let host = addr.ip();
    let url_host = if host.is_ipv6() { format!("[{host}]") } else { host.to_string() };
    log!("serve"; "serving HTTP on {host} port {} (http://{url_host}:{}/)", addr.port(), addr.port());

    let options = Arc::new(options);
    let mut requests: Vec<Background<()>> = Vec::new();

    for (seq, request) in server.incoming_requests().enumerate() {
        report(worker::reap(&mut requests));

        let options = Arc::clone(&options);
        let spawned = worker::spawn(format!("request-{seq}"), move |token| {
            if let Err(e) = handle_request(request, &options, &token) {
                log!("serve"; "request error: {e:#}");
            }
        });
        match spawned {
            Ok(handle) => requests.push(handle),
            Err(e) => log!("error"; "{e:#}"),
        }
    }

    for handle in &requests {
        log!("serve"; "cancelling {}", handle.name());
        handle.cancel();
    }
    report(requests.into_iter().map(Background::join).collect());
    Ok(())
}

fn resolve(bind: &str, port: u16) -> Result<SocketAddr> {
    (bind, port)
        .to_socket_addrs()
        .with_context(|| format!("Invalid bind address `{bind}`"))?
        .next()
        .ok_or_else(|| anyhow!("No address found for `{bind}`"))
}

fn report(results: Vec<Result<()>>) {
    for result in results {
        if let Err(e) = result {
            log!("error"; "{e:#}");
        }
    }
}

// ============================================================================
// Request Handling
// ============================================================================

/// Handle a single HTTP request.
///
/// Resolution order:
/// 1. Anything but GET/HEAD → 501
/// 2. Path matched by a trigger → rebuild first, 418 on failure
/// 3. Exact file match → serve file
/// 4. Directory: redirect to the slash form, then `index.html`, then listing
/// 5. Nothing found → 404
fn handle_request(request: Request, options: &ServeOptions, token: &CancelToken) -> Result<()> {
    if !matches!(request.method(), Method::Get | Method::Head) {
        return serve_status(request, 501, "Unsupported method");
    }

    let url = request.url().to_owned();
    let local = options.translate_path(&url);

    if let Some(trigger) = options.matching_trigger(&local)? {
        log!("serve"; "target matched: {trigger}");
        if token.is_cancelled() {
            return serve_status(request, 503, "Server shutting down");
        }
        if !options.rebuild(&local)? {
            return serve_status(request, 418, REBUILD_FAILED);
        }
    }

    if local.is_file() {
        return serve_file(request, &local);
    }

    if local.is_dir() {
        let url_path = url.split(['?', '#']).next().unwrap_or_default();
        if !url_path.ends_with('/') {
            return serve_redirect(request, &format!("{url_path}/"));
        }

        let index_path = local.join("index.html");
        if index_path.is_file() {
            return serve_file(request, &index_path);
        }

        let decoded = urlencoding::decode(url_path).unwrap_or(Cow::Borrowed(url_path));
        let listing = directory_listing(&local, &decoded)
            .with_context(|| format!("Failed to list {}", local.display()))?;
        return serve_html(request, listing);
    }

    serve_status(request, 404, "File not found")
}

// ============================================================================
// Response Helpers
// ============================================================================

fn header(field: &str, value: &str) -> Result<Header> {
    Header::from_bytes(field, value).map_err(|()| anyhow!("Invalid header `{field}: {value}`"))
}

/// Serve a file with appropriate content type.
fn serve_file(request: Request, path: &Path) -> Result<()> {
    let content = fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let response =
        Response::from_data(content).with_header(header("Content-Type", guess_content_type(path))?);
    request.respond(response)?;
    Ok(())
}

/// Serve HTML content.
fn serve_html(request: Request, content: String) -> Result<()> {
    let response = Response::from_string(content)
        .with_header(header("Content-Type", "text/html; charset=utf-8")?);
    request.respond(response)?;
    Ok(())
}

fn serve_redirect(request: Request, location: &str) -> Result<()> {
    let response = Response::empty(StatusCode(301)).with_header(header("Location", location)?);
    request.respond(response)?;
    Ok(())
}

/// Plain-text answer with an explicit status.
fn serve_status(request: Request, status: u16, message: &str) -> Result<()> {
    let response = Response::from_string(message).with_status_code(status);
    request.respond(response)?;
    Ok(())
}

// ============================================================================
// Content Type Detection
// ============================================================================

/// Guess MIME content type from file extension.
///
/// Returns `application/octet-stream` for unknown extensions.
fn guess_content_type(path: &Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()) {
        // Web content
        Some("html" | "htm") => "text/html; charset=utf-8",
        Some("css") => "text/css; charset=utf-8",
        Some("js" | "mjs") => "application/javascript; charset=utf-8",
        Some("json") => "application/json; charset=utf-8",
        Some("xml") => "application/xml; charset=utf-8",

        // Images
        Some("svg") => "image/svg+xml",
        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("ico") => "image/x-icon",

        // Fonts
        Some("woff") => "font/woff",
        Some("woff2") => "font/woff2",
        Some("ttf") => "font/ttf",
        Some("otf") => "font/otf",

        // Documents
        Some("pdf") => "application/pdf",
        Some("txt") => "text/plain; charset=utf-8",
        Some("md") => "text/markdown; charset=utf-8",
        Some("drawio") => "application/xml",

        // Default binary
        _ => "application/octet-stream",
    }
}

// ============================================================================
// Directory Listing
// ============================================================================

/// HTML listing of `dir`, sorted by name, directories marked with `/`.
fn directory_listing(dir: &Path, url_path: &str) -> std::io::Result<String> {
    let mut names: Vec<String> = fs::read_dir(dir)?
        .filter_map(Result::ok)
        .map(|entry| {
            let name = entry.file_name().to_string_lossy().into_owned();
            let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
            if is_dir { format!("{name}/") } else { name }
        })
        .collect();
    names.sort_by_key(|name| name.to_lowercase());

    let entries: Vec<String> = names
        .iter()
        .map(|name| {
            let href = urlencoding::encode(name).replace("%2F", "/");
            format!(r#"<li><a href="{href}">{}</a></li>"#, escape_xml(name))
        })
        .collect();

    #[allow(clippy::literal_string_with_formatting_args)]
    // These are template placeholders, not format args
    Ok(DIRECTORY_TEMPLATE
        .replace("{path}", &escape_xml(url_path))
        .replace("{entries}", &entries.join("\n")))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::{
        io::{Read, Write},
        net::TcpStream,
        thread,
    };

    fn options(dir: &Path, command: &str, triggers: &[&str]) -> ServeOptions {
        ServeOptions {
            bind: "127.0.0.1".into(),
            port: 0,
            directory: dir.to_path_buf(),
            command: command.into(),
            triggers: triggers.iter().map(|t| t.to_string()).collect(),
        }
    }

    /// Send one raw request through a real server and return the raw answer.
    fn roundtrip(options: ServeOptions, raw: &str) -> String {
        let server = Server::http("127.0.0.1:0").unwrap();
        let addr = server.server_addr().to_ip().unwrap();
        let handle = thread::spawn(move || {
            let request = server.recv().unwrap();
            handle_request(request, &options, &CancelToken::default()).unwrap();
        });

        let mut stream = TcpStream::connect(addr).unwrap();
        stream.write_all(raw.as_bytes()).unwrap();
        let mut answer = String::new();
        stream.read_to_string(&mut answer).unwrap();
        handle.join().unwrap();
        answer
    }

    fn get(options: ServeOptions, path: &str) -> String {
        roundtrip(
            options,
            &format!("GET {path} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n"),
        )
    }

    #[test]
    fn test_translate_path() {
        let opts = options(Path::new("/srv/site"), "make", &[]);
        assert_eq!(opts.translate_path("/"), PathBuf::from("/srv/site"));
        assert_eq!(
            opts.translate_path("/a/b.html?x=1#top"),
            PathBuf::from("/srv/site/a/b.html")
        );
        assert_eq!(
            opts.translate_path("/my%20post.html"),
            PathBuf::from("/srv/site/my post.html")
        );
        assert_eq!(
            opts.translate_path("/../../etc/./passwd"),
            PathBuf::from("/srv/site/etc/passwd")
        );
    }

    #[test]
    fn test_matching_trigger() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("posts")).unwrap();
        fs::write(dir.path().join("posts/a.html"), "").unwrap();
        fs::write(dir.path().join("style.css"), "").unwrap();

        let opts = options(dir.path(), "make", &["*.txt", "**/*.html"]);
        assert_eq!(
            opts.matching_trigger(&dir.path().join("posts/a.html")).unwrap(),
            Some("**/*.html")
        );
        assert_eq!(opts.matching_trigger(&dir.path().join("style.css")).unwrap(), None);
        assert_eq!(opts.matching_trigger(&dir.path().join("missing.html")).unwrap(), None);
    }

    #[test]
    fn test_matching_trigger_absolute_pattern() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.html"), "").unwrap();
        let pattern = format!("{}/*.html", Pattern::escape(&dir.path().to_string_lossy()));

        let opts = options(Path::new("/elsewhere"), "make", &[&pattern]);
        assert!(opts.matching_trigger(&dir.path().join("a.html")).unwrap().is_some());
    }

    #[test]
    fn test_guess_content_type() {
        assert_eq!(guess_content_type(Path::new("a.html")), "text/html; charset=utf-8");
        assert_eq!(guess_content_type(Path::new("a.svg")), "image/svg+xml");
        assert_eq!(guess_content_type(Path::new("a.woff2")), "font/woff2");
        assert_eq!(guess_content_type(Path::new("a")), "application/octet-stream");
    }

    #[test]
    fn test_directory_listing() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("b & c.txt"), "").unwrap();

        let html = directory_listing(dir.path(), "/docs/").unwrap();
        assert!(html.contains("<title>Directory listing for /docs/</title>"));
        assert!(html.contains(r#"<li><a href="sub/">sub/</a></li>"#));
        assert!(html.contains(r#"<li><a href="b%20%26%20c.txt">b &amp; c.txt</a></li>"#));
    }

    #[test]
    fn test_serves_file_and_404() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.html"), "<p>hi</p>").unwrap();

        let answer = get(options(dir.path(), "make", &[]), "/a.html");
        assert!(answer.starts_with("HTTP/1.1 200"));
        assert!(answer.contains("text/html; charset=utf-8"));
        assert!(answer.ends_with("<p>hi</p>"));

        let answer = get(options(dir.path(), "make", &[]), "/nope.html");
        assert!(answer.starts_with("HTTP/1.1 404"));
    }

    #[test]
    fn test_directory_index_and_redirect() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("blog")).unwrap();
        fs::write(dir.path().join("blog/index.html"), "index").unwrap();

        let answer = get(options(dir.path(), "make", &[]), "/blog");
        assert!(answer.starts_with("HTTP/1.1 301"));
        assert!(answer.contains("Location: /blog/"));

        let answer = get(options(dir.path(), "make", &[]), "/blog/");
        assert!(answer.ends_with("index"));
    }

    #[test]
    fn test_trigger_runs_command_with_pagetarget() {
        let dir = tempfile::tempdir().unwrap();
        let page = dir.path().join("a.html");
        fs::write(&page, "old").unwrap();
        let command = format!(
            "printf new > \"{0}\" && printf %s \"$PAGETARGET\" > \"{1}\"",
            page.display(),
            dir.path().join("target").display()
        );

        let answer = get(options(dir.path(), &command, &["*.html"]), "/a.html");
        assert!(answer.starts_with("HTTP/1.1 200"));
        assert!(answer.ends_with("new"));
        assert_eq!(
            fs::read_to_string(dir.path().join("target")).unwrap(),
            page.display().to_string()
        );
    }

    #[test]
    fn test_non_html_target_has_no_pagetarget() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.css"), "body{}").unwrap();
        let marker = dir.path().join("marker");
        let command = format!("test -z \"$PAGETARGET\" && touch \"{}\"", marker.display());

        let answer = get(options(dir.path(), &command, &["*.css"]), "/a.css");
        assert!(answer.starts_with("HTTP/1.1 200"));
        assert!(marker.is_file());
    }

    #[test]
    fn test_failed_rebuild_is_teapot() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.html"), "stale").unwrap();

        let answer = get(options(dir.path(), "exit 1", &["*.html"]), "/a.html");
        assert!(answer.starts_with("HTTP/1.1 418"));
        assert!(answer.ends_with(REBUILD_FAILED));
    }

    #[test]
    fn test_head_and_unsupported_method() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.txt"), "body").unwrap();

        let answer = roundtrip(
            options(dir.path(), "make", &[]),
            "HEAD /a.txt HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n",
        );
        assert!(answer.starts_with("HTTP/1.1 200"));
        assert!(!answer.ends_with("body"));

        let answer = roundtrip(
            options(dir.path(), "make", &[]),
            "POST /a.txt HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\nContent-Length: 0\r\n\r\n",
        );
        assert!(answer.starts_with("HTTP/1.1 501"));
    }
}
