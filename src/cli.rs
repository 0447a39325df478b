//! Command-line interface definitions.
//!
//! Every subcommand is one batch transform; the build orchestrator passes
//! all paths positionally.

use crate::config::defaults;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Quire static blog toolkit CLI
#[derive(Parser, Debug, Clone)]
#[command(version, about, long_about = None, arg_required_else_help = true)]
pub struct Cli {
    /// subcommands
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Split a markdown source into content, bare content, excerpt and metadata
    Front {
        /// Markdown source with optional YAML front matter
        source: PathBuf,
        /// Layout-wrapped template output
        content: PathBuf,
        /// Layout-free template output
        bare: PathBuf,
        /// Excerpt template output
        excerpt: PathBuf,
        /// Metadata sidecar output (YAML)
        metadata: PathBuf,
        /// Site configuration (YAML)
        site: PathBuf,
    },

    /// Render a template with environment, site and data files as context
    Render {
        /// Template to render
        template: PathBuf,
        /// Rendered output
        output: PathBuf,
        /// YAML files merged into the context, later files win
        data: Vec<PathBuf>,
        /// Template search root (default: the template's directory)
        #[arg(long)]
        templates: Option<PathBuf>,
        /// Site configuration exposed as `site`
        #[arg(long)]
        site: Option<PathBuf>,
    },

    /// Combine post sidecars into one list, newest first
    Combine {
        /// Combined sidecar output
        output: PathBuf,
        /// Sidecar whose `posts` key receives the list
        main: PathBuf,
        /// Post sidecars
        posts: Vec<PathBuf>,
    },

    /// Attach files as `refs` of a sidecar
    AddRefs {
        /// Sidecar to extend
        main: PathBuf,
        /// Extended sidecar output
        output: PathBuf,
        /// Pairs of reference name and file
        #[arg(value_name = "NAME FILE")]
        refs: Vec<String>,
    },

    /// List the drafts of a combined sidecar
    ListDrafts {
        /// Combined sidecar
        combined: PathBuf,
        /// Drafts listing output
        output: PathBuf,
    },

    /// Generate the RSS and Atom feeds
    Feed {
        /// RSS 2.0 output
        rss: PathBuf,
        /// Atom 1.0 output
        atom: PathBuf,
        /// Site configuration (YAML)
        site: PathBuf,
        /// Post sidecars
        posts: Vec<PathBuf>,
    },

    /// Generate the XML sitemap
    Sitemap {
        /// Sitemap output
        output: PathBuf,
        /// Site configuration (YAML)
        site: PathBuf,
        /// Post sidecars
        posts: Vec<PathBuf>,
    },

    /// Serve a directory, rebuilding pages that match a trigger
    Serve {
        /// Address to bind on
        #[arg(short, long, default_value_t = defaults::serve::bind())]
        bind: String,

        /// Directory to serve (default: current directory)
        #[arg(short, long)]
        directory: Option<PathBuf>,

        /// Command run when a trigger matches
        #[arg(short, long, default_value_t = defaults::serve::command())]
        command: String,

        /// Glob of targets to rebuild before serving (repeatable)
        #[arg(short, long = "trigger")]
        triggers: Vec<String>,

        /// Port to listen on
        #[arg(default_value_t = defaults::serve::port())]
        port: u16,
    },

    /// Quantize, resize and optimize a PNG
    MinifyPng {
        /// Source image
        src: PathBuf,
        /// Transform, `T:Q<colors>-S<percent>`
        spec: String,
        /// Scratch directory
        tmpdir: PathBuf,
        /// Optimized image output
        dst: PathBuf,
    },

    /// Convert draw.io PDF exports to SVG
    Drawio {
        /// Directory with one .drawio file and its PDF exports
        srcdir: PathBuf,
        /// Output directory
        dstdir: PathBuf,
    },
}
