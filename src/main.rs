//! Cloister - a small content site server for plaintext documents.

mod article;
mod cli;
mod config;
mod document;
mod index;
mod logger;
mod render;
mod serve;
mod watch;

use anyhow::{Context, Result, bail};
use clap::Parser;
use cli::{Cli, Commands};
use config::SiteConfig;
use serve::serve_site;
use walkdir::WalkDir;

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;

    match &cli.command {
        Commands::Serve { .. } => serve_site(&config),
        Commands::Check => check_content(&config),
    }
}

/// Load and validate configuration from CLI arguments.
///
/// A missing config file is not an error; defaults apply and the CLI can
/// still override the content root.
fn load_config(cli: &Cli) -> Result<SiteConfig> {
    let mut config = if cli.config.exists() {
        SiteConfig::from_path(&cli.config)?
    } else {
        SiteConfig::default()
    };
    config.update_with_cli(cli);
    config.validate()?;

    Ok(config)
}

/// Generate every visible document under the content root and report
/// per-article diagnostics. Exits non-zero if any document failed.
fn check_content(config: &SiteConfig) -> Result<()> {
    let root = &config.content.root;
    let mut failed = 0usize;

    let walker = WalkDir::new(root)
        .into_iter()
        .filter_entry(|entry| entry.depth() == 0 || !index::is_hidden(entry.path()));
    for entry in walker {
        let entry = entry.with_context(|| format!("failed to walk {}", root.display()))?;
        if entry.file_type().is_dir() {
            continue;
        }

        let article = article::generate_article(root, entry.path());
        match article.err() {
            None => log!("check"; "status=ok route={}", article.route),
            Some(err) => {
                failed += 1;
                log!("check"; "status=fail route={} err={err}", article.route);
            }
        }
    }

    if failed > 0 {
        bail!("{failed} document(s) failed to generate");
    }
    Ok(())
}
