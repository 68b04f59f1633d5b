//! bookmirror CLI
//!
//! Command-line interface for bookmirror - mirror an ebook library into
//! note-taking backends.

use std::fs::File;
use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use bookmirror_core::{Config, JobKind, Mirror, SearchRequest};

mod commands;
mod output;

use output::{Output, OutputFormat};

#[derive(Parser)]
#[command(name = "bookmirror")]
#[command(about = "bookmirror - Mirror an ebook library into note-taking backends")]
#[command(version)]
#[command(propagate_version = true)]
struct Cli {
    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Quiet mode - minimal output
    #[arg(short, long, global = true)]
    quiet: bool,

    /// More log output (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Use this config file instead of the default
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the mirrored library as a tree
    Tree {
        /// Only show the subtree under this folder
        #[arg(long)]
        root: Option<String>,
    },
    /// Start a sync job on the server
    Sync {
        /// full_sync, incremental_sync, sync_book or cleanup_orphans
        #[arg(default_value = "incremental_sync")]
        kind: JobKind,
        /// Book to sync (required for sync_book)
        #[arg(short, long)]
        book: Option<String>,
        /// Rewrite notes even if they look unchanged
        #[arg(long)]
        force: bool,
        /// Print the job id and exit without waiting
        #[arg(long)]
        no_wait: bool,
    },
    /// Show the status of a sync job
    Job {
        /// Job ID
        id: String,
    },
    /// Manage the search queue
    Search {
        #[command(subcommand)]
        command: SearchCommands,
    },
    /// Show or set configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
    /// Show configuration and queue status
    Status,
}

#[derive(Subcommand)]
enum SearchCommands {
    /// Queue a keyword search
    #[command(alias = "keyword")]
    Add {
        /// Search query
        query: String,
        /// Result pages to fetch
        #[arg(short, long, default_value_t = 1)]
        pages: u32,
    },
    /// Queue a search for chapters of a book that were never mirrored
    Missing {
        /// Book ID
        book_id: String,
        /// Book title to search for
        title: String,
        /// Result pages to fetch
        #[arg(short, long, default_value_t = 1)]
        pages: u32,
    },
    /// List queued searches
    #[command(alias = "ls")]
    List,
    /// Show a search and its results
    Show {
        /// Queue item ID
        id: u64,
    },
    /// Remove a search from the queue
    #[command(alias = "rm")]
    Remove {
        /// Queue item ID
        id: u64,
    },
    /// Retry a failed search
    Retry {
        /// Queue item ID
        id: u64,
    },
    /// Remove completed and failed searches
    Clear,
    /// Run pending searches
    Run,
}

#[derive(Subcommand, Clone)]
enum ConfigCommands {
    /// Show current configuration
    Show,
    /// Set a configuration value
    Set {
        /// Configuration key (api_url, access_token, backend, data_dir, ...)
        key: String,
        /// Configuration value ("none" clears optional values)
        value: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let output = Output::new(OutputFormat::from_flags(cli.json, cli.quiet));
    let config_path = cli.config.as_deref();

    // Config commands work even when the file is broken
    if let Commands::Config { command } = &cli.command {
        return match command.clone() {
            Some(ConfigCommands::Show) | None => commands::config::show(config_path, &output),
            Some(ConfigCommands::Set { key, value }) => {
                commands::config::set(key, value, config_path, &output)
            }
        };
    }

    let config =
        Config::load_with_cli_override(config_path).context("Failed to load configuration")?;
    init_logging(&config, cli.verbose);

    if let Commands::Status = cli.command {
        return commands::status::show(config, &output);
    }

    config.ensure_data_dir()?;
    let mirror = Mirror::open(config).map_err(|e| anyhow::anyhow!(e.user_message()))?;
    debug!("Using {} backend", mirror.config().backend);

    match cli.command {
        Commands::Tree { root } => commands::tree::show(&mirror, root, &output).await,
        Commands::Sync {
            kind,
            book,
            force,
            no_wait,
        } => commands::sync::run(&mirror, kind, book, force, no_wait, &output).await,
        Commands::Job { id } => commands::job::show(&mirror, id, &output).await,
        Commands::Search { command } => handle_search_command(command, &mirror, &output).await,
        Commands::Config { .. } | Commands::Status => unreachable!(), // Handled above
    }
}

async fn handle_search_command(
    command: SearchCommands,
    mirror: &Mirror,
    output: &Output,
) -> Result<()> {
    match command {
        SearchCommands::Add { query, pages } => {
            commands::search::add(mirror, SearchRequest::keyword(query, pages), output).await
        }
        SearchCommands::Missing {
            book_id,
            title,
            pages,
        } => {
            let request = SearchRequest::missing_chapters(book_id, title, pages);
            commands::search::add(mirror, request, output).await
        }
        SearchCommands::List => commands::search::list(mirror, output),
        SearchCommands::Show { id } => commands::search::show(mirror, id, output),
        SearchCommands::Remove { id } => commands::search::remove(mirror, id, output),
        SearchCommands::Retry { id } => commands::search::retry(mirror, id, output).await,
        SearchCommands::Clear => commands::search::clear(mirror, output),
        SearchCommands::Run => commands::search::run(mirror, output).await,
    }
}

/// Initialize logging
///
/// `RUST_LOG` wins over `-v`. Logs go to `config.log_file` when set,
/// otherwise to stderr.
fn init_logging(config: &Config, verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("bookmirror_core={},bookmirror_cli={}", level, level))
    });

    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false);

    // Ignore errors if already initialized
    match config.log_file {
        Some(ref path) => match File::create(path) {
            Ok(file) => {
                let _ = builder.with_ansi(false).with_writer(Mutex::new(file)).try_init();
            }
            Err(e) => {
                eprintln!("Warning: Could not create log file {:?}: {}", path, e);
                let _ = builder.with_writer(std::io::stderr).try_init();
            }
        },
        None => {
            let _ = builder.with_writer(std::io::stderr).try_init();
        }
    }
}
