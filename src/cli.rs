//! Command-line interface definitions.
//!
//! Defines all CLI arguments and subcommands using clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Cloister content site server CLI
#[derive(Parser, Debug, Clone)]
#[command(version, about, long_about = None, arg_required_else_help = true)]
pub struct Cli {
    /// Content directory path (overrides the config file)
    #[arg(short, long)]
    pub root: Option<PathBuf>,

    /// Config file name (default: cloister.toml)
    #[arg(short = 'C', long, default_value = "cloister.toml")]
    pub config: PathBuf,

    /// subcommands
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Serve articles over HTTP, refreshing the index on file changes
    Serve {
        /// Interface to bind on
        #[arg(short, long)]
        interface: Option<String>,

        /// The port to listen on
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Generate every document under the content root and report diagnostics
    Check,
}
