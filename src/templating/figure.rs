//! Figure, margin note and asset helpers.
//!
//! The emitted markdown mixes raw HTML blocks with a deferred caption block
//! that a later markdown pass converts to HTML in place. The caption travels
//! base64-encoded so nothing interprets it before that pass.

use super::helper_error;
use crate::{error::BuildError, utils::path::join_url};
use base64::{Engine as _, engine::general_purpose::STANDARD};
use minijinja::{
    Error, ErrorKind, State,
    value::{Kwargs, Value},
};

/// Where a figure is placed on the page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Location {
    /// In the margin, caption below.
    Margin,
    /// Across the whole page, caption below.
    Full,
    /// Across the main column, caption in the margin.
    Main,
}

impl Location {
    pub fn parse(name: &str) -> Result<Self, BuildError> {
        match name {
            "margin" | "marginfig" => Ok(Self::Margin),
            "full" | "fullfig" => Ok(Self::Full),
            "main" | "mainfig" => Ok(Self::Main),
            other => Err(BuildError::format(format!(
                "unknown figure location `{other}` (expected margin, full or main)"
            ))),
        }
    }

    pub const fn kind(self) -> &'static str {
        match self {
            Self::Margin => "marginfig",
            Self::Full => "fullfig",
            Self::Main => "mainfig",
        }
    }
}

/// Everything needed to emit one figure.
#[derive(Debug, Clone)]
pub struct Figure<'a> {
    /// Already resolved image URL.
    pub src: &'a str,
    pub caption: &'a str,
    pub max_width: Option<&'a str>,
    pub class: &'a str,
    pub alt: &'a str,
    pub location: Location,
}

impl Figure<'_> {
    pub fn to_html(&self) -> String {
        let Self { src, caption, class, alt, location, .. } = self;
        let id = element_id(&[src, caption, location.kind()]);
        let style = self
            .max_width
            .map(|w| format!("style=\"max-width: {w}\""))
            .unwrap_or_default();
        let img = format!("<img {style} class='{class}' alt='{alt}' src='{src}' />");
        let caption = deferred_markdown(caption);

        match location {
            Location::Margin => [
                html_block(&format!(
                    "<p><label for='{id}' class='margin-toggle'>&#8853;</label>\n\
                     <input type='checkbox' id='{id}' class='margin-toggle'/>\n\
                     <span class='marginnote'>\n{img}"
                )),
                caption,
                html_block("</span></p>"),
            ]
            .concat(),
            Location::Full => [
                html_block(&format!("<p><figure class='{class}'>{img}\n<figcaption>")),
                caption,
                html_block("</figcaption></figure></p>"),
            ]
            .concat(),
            Location::Main => [
                html_block("<p><figure><figcaption><span markdown='1'>"),
                caption,
                html_block(&format!("</span></figcaption>\n{img}</figure></p>")),
            ]
            .concat(),
        }
    }
}

/// Margin note with the same toggle structure as a margin figure.
pub fn note_html(caption: &str) -> String {
    let id = element_id(&[caption, "marginnotes"]);
    [
        html_block(&format!(
            "<p><label for='{id}' class='margin-toggle'> &#8853;</label>\n\
             <input type='checkbox' id='{id}' class='margin-toggle'/>\n\
             <span class='marginnote'>"
        )),
        deferred_markdown(caption),
        html_block("</span></p>"),
    ]
    .concat()
}

/// Raw HTML fenced so the markdown pass leaves it alone.
///
/// The surrounding newlines keep the fence on its own lines.
pub fn html_block(html: &str) -> String {
    format!("\n```{{=html}}\n{html}\n```\n")
}

/// Caption block for the post-processing hook, payload base64-encoded.
pub fn deferred_markdown(markdown: &str) -> String {
    format!(
        "\n```{{.post_process_by_hook input_format=markdown output_format=plain-block encoding=base64}}\n{}\n```\n",
        STANDARD.encode(markdown)
    )
}

/// Absolute URLs pass through; anything else lives under `home`.
pub fn url_from(src: &str, home: &str) -> String {
    if ["http://", "https://", "//"].iter().any(|p| src.starts_with(p)) {
        src.to_owned()
    } else {
        join_url(home, src)
    }
}

pub fn element_id(parts: &[&str]) -> String {
    STANDARD.encode(parts.concat())
}

// ============================================================================
// Template Functions
// ============================================================================

/// `key` from the top-level context, else from `page`.
pub fn lookup_home(state: &State, key: &str) -> Result<String, Error> {
    let direct = state.lookup(key).filter(|v| !v.is_undefined() && !v.is_none());
    let from_page = || {
        state
            .lookup("page")
            .and_then(|page| page.get_attr(key).ok())
            .filter(|v| !v.is_undefined() && !v.is_none())
    };
    direct
        .or_else(from_page)
        .and_then(|v| v.as_str().map(str::to_owned))
        .ok_or_else(|| {
            Error::new(
                ErrorKind::UndefinedError,
                format!("`{key}` is not set (neither top-level nor in `page`)"),
            )
        })
}

/// `{{ figure("a.png", "caption", location="margin", max_width="60%") }}`
pub fn figure(
    state: &State,
    src: String,
    caption: Option<String>,
    kwargs: Kwargs,
) -> Result<Value, Error> {
    let location = kwargs.get::<Option<String>>("location")?;
    let location = Location::parse(location.as_deref().unwrap_or("main")).map_err(helper_error)?;
    emit_figure(state, &src, caption, location, &kwargs)
}

pub fn marginfig(state: &State, src: String, caption: Option<String>, kwargs: Kwargs) -> Result<Value, Error> {
    emit_figure(state, &src, caption, Location::Margin, &kwargs)
}

pub fn fullfig(state: &State, src: String, caption: Option<String>, kwargs: Kwargs) -> Result<Value, Error> {
    emit_figure(state, &src, caption, Location::Full, &kwargs)
}

pub fn mainfig(state: &State, src: String, caption: Option<String>, kwargs: Kwargs) -> Result<Value, Error> {
    emit_figure(state, &src, caption, Location::Main, &kwargs)
}

fn emit_figure(
    state: &State,
    src: &str,
    caption: Option<String>,
    location: Location,
    kwargs: &Kwargs,
) -> Result<Value, Error> {
    let caption = match caption {
        Some(caption) => caption,
        None => kwargs.get::<Option<String>>("caption")?.unwrap_or_default(),
    };
    let max_width = kwargs.get::<Option<String>>("max_width")?;
    let class = kwargs.get::<Option<String>>("class")?;
    let cls = kwargs.get::<Option<String>>("cls")?;
    let class = class.or(cls).unwrap_or_default();
    let alt = kwargs.get::<Option<String>>("alt")?.unwrap_or_default();
    kwargs.assert_all_used()?;

    let src = url_from(src, &lookup_home(state, "imghome")?);
    let html = Figure {
        src: &src,
        caption: &caption,
        max_width: max_width.as_deref(),
        class: &class,
        alt: &alt,
        location,
    }
    .to_html();
    Ok(Value::from_safe_string(html))
}

/// `{{ marginnote("a *short* aside") }}`
pub fn marginnote(caption: String) -> Value {
    Value::from_safe_string(note_html(&caption))
}

/// `{{ asset("demo.tar.gz") }}` resolved against `assestshome`.
pub fn asset(state: &State, src: String) -> Result<String, Error> {
    Ok(url_from(&src, &lookup_home(state, "assestshome")?))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use minijinja::{Environment, context};

    fn env() -> Environment<'static> {
        let mut env = Environment::new();
        env.add_function("figure", figure);
        env.add_function("marginfig", marginfig);
        env.add_function("fullfig", fullfig);
        env.add_function("mainfig", mainfig);
        env.add_function("marginnote", marginnote);
        env.add_function("asset", asset);
        env
    }

    #[test]
    fn test_url_from() {
        assert_eq!(url_from("a.png", "/img/"), "/img/a.png");
        assert_eq!(url_from("a.png", "/img/2020"), "/img/2020/a.png");
        assert_eq!(url_from("https://x.test/a.png", "/img"), "https://x.test/a.png");
        assert_eq!(url_from("//cdn/a.png", "/img"), "//cdn/a.png");
    }

    #[test]
    fn test_location_parse() {
        assert_eq!(Location::parse("margin").unwrap(), Location::Margin);
        assert_eq!(Location::parse("fullfig").unwrap(), Location::Full);
        assert!(Location::parse("aside").is_err());
    }

    #[test]
    fn test_margin_figure_html() {
        let html = Figure {
            src: "/img/a.png",
            caption: "A *cat*",
            max_width: Some("60%"),
            class: "fig",
            alt: "cat",
            location: Location::Margin,
        }
        .to_html();
        let id = STANDARD.encode("/img/a.pngA *cat*marginfig");

        assert!(html.starts_with("\n```{=html}\n<p><label for='"));
        assert!(html.contains(&format!("id='{id}'")));
        assert!(html.contains("<img style=\"max-width: 60%\" class='fig' alt='cat' src='/img/a.png' />"));
        assert!(html.contains(&STANDARD.encode("A *cat*")));
        assert!(!html.contains("A *cat*"));
        assert!(html.ends_with("\n```{=html}\n</span></p>\n```\n"));
    }

    #[test]
    fn test_main_figure_puts_caption_first() {
        let html = Figure {
            src: "/img/a.png",
            caption: "c",
            max_width: None,
            class: "",
            alt: "",
            location: Location::Main,
        }
        .to_html();
        let caption_at = html.find("post_process_by_hook").unwrap();
        let img_at = html.find("<img").unwrap();
        assert!(caption_at < img_at);
        assert!(html.contains("<img  class='' alt='' src='/img/a.png' /></figure></p>"));
    }

    #[test]
    fn test_deferred_markdown_block() {
        assert_eq!(
            deferred_markdown("*x*"),
            "\n```{.post_process_by_hook input_format=markdown output_format=plain-block encoding=base64}\nKngq\n```\n"
        );
    }

    #[test]
    fn test_figure_uses_page_imghome() {
        let out = env()
            .render_str(
                "{{ fullfig('b.svg', 'cap', cls='wide') }}",
                context! { page => context! { imghome => "/img/2020" } },
            )
            .unwrap();
        assert!(out.contains("<p><figure class='wide'><img  class='wide' alt='' src='/img/2020/b.svg' />"));
    }

    #[test]
    fn test_class_wins_over_cls() {
        let out = env()
            .render_str(
                "{{ mainfig('b.svg', class='wide', cls='narrow') }}",
                context! { imghome => "/img/" },
            )
            .unwrap();
        assert!(out.contains("class='wide'"));
        assert!(!out.contains("narrow"));
    }

    #[test]
    fn test_figure_generic_location() {
        let out = env()
            .render_str(
                "{{ figure('a.png', caption='x', location='margin') }}",
                context! { imghome => "/img/" },
            )
            .unwrap();
        assert!(out.contains("<span class='marginnote'>\n<img  class='' alt='' src='/img/a.png' />"));
        assert!(env().render_str("{{ figure('a.png', location='side') }}", context! { imghome => "/img/" }).is_err());
    }

    #[test]
    fn test_figure_without_home_fails() {
        assert!(env().render_str("{{ mainfig('a.png') }}", ()).is_err());
    }

    #[test]
    fn test_marginnote() {
        let out = env().render_str("{{ marginnote('aside') }}", ()).unwrap();
        let id = STANDARD.encode("asidemarginnotes");
        assert!(out.contains(&format!("<label for='{id}' class='margin-toggle'> &#8853;</label>")));
        assert!(out.contains(&STANDARD.encode("aside")));
    }

    #[test]
    fn test_asset() {
        let out = env()
            .render_str(
                "{{ asset('code.zip') }} {{ asset('https://x.test/z') }}",
                context! { assestshome => "/assets/2020" },
            )
            .unwrap();
        assert_eq!(out, "/assets/2020/code.zip https://x.test/z");
        assert!(env().render_str("{{ asset('a') }}", ()).is_err());
    }
}
