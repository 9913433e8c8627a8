//! # wasp CLI
//!
//! Command-line interface for wasp, the personal web archive search.
//!
//! ## Commands
//!
//! - `wasp index` - Watch the archive directory and index every record
//! - `wasp query <terms>` - Search pages, optionally within a time window
//! - `wasp interactive` - Start interactive TUI mode
//! - `wasp status` - Show snapshot status and statistics
//! - `wasp clear` - Delete the snapshot data
//!
//! ## Example Usage
//!
//! ```bash
//! # Index the directory the archiving proxy writes to
//! wasp index --directory ~/.wasp/archives
//!
//! # Pages about webis visited in May 2024
//! wasp query webis --from 2024-05-01 --to 2024-05-31
//!
//! # Interactive search
//! wasp interactive
//! ```

mod app;
mod commands;
mod tui;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// wasp - Search the web pages you visited
#[derive(Parser)]
#[command(name = "wasp")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Watch the archive directory and index its records
    Index {
        /// Archive directory (overrides archive.directory)
        #[arg(short, long)]
        directory: Option<PathBuf>,

        /// Only index records written after startup
        #[arg(long)]
        no_backfill: bool,
    },

    /// Search the indexed pages
    Query {
        /// Search terms (all must occur in content or title)
        terms: String,

        /// Earliest visit time (RFC 3339, YYYY-MM-DDTHH:MM:SS or YYYY-MM-DD)
        #[arg(short, long)]
        from: Option<String>,

        /// Latest visit time
        #[arg(short, long)]
        to: Option<String>,

        /// Result page to show (1-based)
        #[arg(short, long, default_value = "1")]
        page: usize,

        /// Results per page (overrides search.page_size)
        #[arg(short = 'n', long)]
        page_size: Option<usize>,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        output: OutputFormat,
    },

    /// Start interactive TUI mode
    #[command(alias = "i")]
    Interactive {
        /// Earliest visit time
        #[arg(short, long)]
        from: Option<String>,

        /// Latest visit time
        #[arg(short, long)]
        to: Option<String>,
    },

    /// Show snapshot status and statistics
    Status,

    /// Delete all snapshot data
    Clear {
        /// Skip confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            _ => Err(format!("Unknown output format: {}", s)),
        }
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration first, it carries the default log level
    let config = match &cli.config {
        Some(path) => wasp_core::Config::load_from(path)?,
        None => wasp_core::Config::load()?,
    };

    let log_level = if cli.quiet {
        "error"
    } else {
        match cli.verbose {
            0 => config.general.log_level.as_str(),
            1 => "debug",
            _ => "trace",
        }
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level)))
        .init();

    match cli.command {
        Commands::Index {
            directory,
            no_backfill,
        } => commands::index::run(config, directory, no_backfill),
        Commands::Query {
            terms,
            from,
            to,
            page,
            page_size,
            output,
        } => commands::query::run(
            config,
            &terms,
            from.as_deref(),
            to.as_deref(),
            page,
            page_size,
            output,
        ),
        Commands::Interactive { from, to } => tui::run(config, from.as_deref(), to.as_deref()),
        Commands::Status => commands::status::run(config),
        Commands::Clear { yes } => commands::clear::run(config, yes),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_query_command() {
        let cli = Cli::try_parse_from([
            "wasp", "-v", "query", "webis", "--from", "2024-05-01", "-n", "5", "-o", "json",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 1);
        match cli.command {
            Commands::Query {
                terms,
                from,
                to,
                page,
                page_size,
                output,
            } => {
                assert_eq!(terms, "webis");
                assert_eq!(from.as_deref(), Some("2024-05-01"));
                assert!(to.is_none());
                assert_eq!(page, 1);
                assert_eq!(page_size, Some(5));
                assert_eq!(output, OutputFormat::Json);
            }
            _ => panic!("expected query command"),
        }
    }

    #[test]
    fn test_parse_index_command() {
        let cli = Cli::try_parse_from(["wasp", "index", "-d", "/srv/archives", "--no-backfill"])
            .unwrap();
        assert!(matches!(
            cli.command,
            Commands::Index { directory: Some(_), no_backfill: true }
        ));
    }

    #[test]
    fn test_unknown_output_format() {
        assert!("xml".parse::<OutputFormat>().is_err());
    }
}
