//! Quire - a toolkit of batch transforms for a static blog.

mod cache;
mod cli;
mod config;
mod convert;
mod error;
mod front;
mod generator;
mod logger;
mod serve;
mod templating;
mod utils;

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Commands};
use front::FrontOutputs;
use generator::{feed, sidecar, sitemap};
use serve::ServeOptions;
use std::{env, process};
use templating::RenderJob;

fn main() -> Result<()> {
    // Usage errors exit with 1 like every other failure; help and version with 0.
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            e.print()?;
            process::exit(if e.use_stderr() { 1 } else { 0 });
        }
    };

    match cli.command {
        Commands::Front { source, content, bare, excerpt, metadata, site } => front::run(
            &source,
            FrontOutputs {
                content: &content,
                bare: &bare,
                excerpt: &excerpt,
                metadata: &metadata,
            },
            &site,
        ),
        Commands::Render { template, output, data, templates, site } => templating::run(RenderJob {
            template: &template,
            output: &output,
            data: &data,
            templates: templates.as_deref(),
            site: site.as_deref(),
        }),
        Commands::Combine { output, main, posts } => sidecar::run_combine(&output, &main, &posts),
        Commands::AddRefs { main, output, refs } => sidecar::run_add_refs(&main, &output, &refs),
        Commands::ListDrafts { combined, output } => sidecar::run_list_drafts(&combined, &output),
        Commands::Feed { rss, atom, site, posts } => feed::run(&rss, &atom, &site, &posts),
        Commands::Sitemap { output, site, posts } => sitemap::run(&output, &site, &posts),
        Commands::Serve { bind, directory, command, triggers, port } => {
            let directory = match directory {
                Some(dir) => dir,
                None => env::current_dir().context("Failed to read current directory")?,
            };
            serve::run(ServeOptions { bind, port, directory, command, triggers })
        }
        Commands::MinifyPng { src, spec, tmpdir, dst } => convert::png::run(&src, &spec, &tmpdir, &dst),
        Commands::Drawio { srcdir, dstdir } => convert::drawio::run(&srcdir, &dstdir),
    }
}
