//! Docstore CLI
//!
//! Command-line interface for docstore - versioned documents with
//! soft-delete, restore and retention vacuum.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use docstore_core::{Config, LinkDirection, Store, StoreError};

mod commands;
mod editor;
mod output;

use output::{Output, OutputFormat};

#[derive(Parser)]
#[command(name = "docstore")]
#[command(about = "Docstore - versioned document storage")]
#[command(version)]
struct Cli {
    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Quiet mode - minimal output
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Author recorded on changes (defaults to config, then $USER)
    #[arg(long, global = true)]
    author: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a new version of a document
    Write {
        /// Document path (or key of an existing version)
        path: String,
        /// Content (reads stdin or opens the editor if not provided)
        #[arg(short, long)]
        content: Option<String>,
        /// Message describing the change
        #[arg(short, long)]
        message: Option<String>,
    },
    /// Show a document or one of its versions
    #[command(alias = "cat")]
    Show {
        /// Path or key
        id: String,
        /// Version number
        #[arg(short = 'v', long)]
        version: Option<u32>,
    },
    /// Show a document's version history
    #[command(alias = "log")]
    History {
        /// Path or key
        id: String,
        /// Version range such as 2..5
        #[arg(short, long, conflicts_with = "deleted")]
        range: Option<String>,
        /// Include deleted versions
        #[arg(long)]
        deleted: bool,
    },
    /// List documents
    #[command(alias = "list")]
    Ls {
        /// Only paths starting with this prefix
        prefix: Option<String>,
        /// Include deleted documents
        #[arg(long)]
        deleted: bool,
    },
    /// Delete a document, a single version, or a whole prefix
    #[command(alias = "delete")]
    Rm {
        /// Path, key, or prefix with --recursive
        id: String,
        /// Delete only this version
        #[arg(short = 'v', long, conflicts_with = "recursive")]
        version: Option<u32>,
        /// Delete every document under the prefix
        #[arg(short, long)]
        recursive: bool,
    },
    /// Restore a deleted document
    Restore {
        /// Path or key
        id: String,
    },
    /// Move a document and its history
    #[command(alias = "move")]
    Mv {
        /// Current path or key
        from: String,
        /// New path
        to: String,
    },
    /// Copy a document into a new one
    #[command(alias = "copy")]
    Cp {
        /// Source path or key
        from: String,
        /// Destination path
        to: String,
    },
    /// Write a new version with an earlier version's content
    Revert {
        /// Path or key
        id: String,
        /// Version number (3 or v3) or key to revert to
        target: String,
        /// Message describing the change
        #[arg(short, long)]
        message: Option<String>,
    },
    /// Link two documents
    Link {
        /// Source path or key
        from: String,
        /// Target path or key
        to: String,
        /// Link tag
        #[arg(short, long)]
        tag: Option<String>,
    },
    /// Remove links between two documents
    Unlink {
        /// Source path or key
        from: String,
        /// Target path or key
        to: String,
        /// Only links with this tag
        #[arg(short, long)]
        tag: Option<String>,
    },
    /// List links touching a document
    Links {
        /// Path or key
        id: String,
        /// Only links pointing at the document
        #[arg(long, conflicts_with = "outgoing")]
        incoming: bool,
        /// Only links from the document
        #[arg(long)]
        outgoing: bool,
        /// Include removed links
        #[arg(long)]
        deleted: bool,
    },
    /// List documents with no links
    Orphans,
    /// Permanently remove deleted versions
    Vacuum {
        /// Only versions deleted at least this long ago (e.g. 30d, 12h)
        #[arg(long)]
        older_than: Option<String>,
        /// Only paths starting with this prefix
        #[arg(long, default_value = "")]
        prefix: String,
        /// Report what would be removed without removing it
        #[arg(long)]
        dry_run: bool,
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
    /// Show configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand, Clone)]
enum ConfigCommands {
    /// Show current configuration
    Show,
}

fn main() {
    let cli = Cli::parse();
    let output = Output::new(OutputFormat::from_flags(cli.json, cli.quiet));

    if let Err(e) = run(cli, &output) {
        eprintln!("Error: {:#}", e);
        if let Some(hint) = recovery_hint(&e) {
            eprintln!("Hint: {}", hint);
        }
        std::process::exit(1);
    }
}

fn run(cli: Cli, output: &Output) -> Result<()> {
    let config = Config::load().context("Failed to load configuration")?;
    init_logging(&config);

    if let Commands::Config { command } = &cli.command {
        return match command {
            Some(ConfigCommands::Show) | None => commands::config::show(&config, output),
        };
    }

    let author = resolve_author(cli.author, &config);
    debug!("Opening database at {}", config.sqlite_path().display());
    let store = Store::open_with_config(config)?;

    let result = match cli.command {
        Commands::Write {
            path,
            content,
            message,
        } => commands::document::write(&store, &author?, path, content, message, output),
        Commands::Show { id, version } => commands::document::show(&store, id, version, output),
        Commands::History { id, range, deleted } => {
            commands::document::history(&store, id, range, deleted, output)
        }
        Commands::Ls { prefix, deleted } => {
            commands::document::list(&store, prefix, deleted, output)
        }
        Commands::Rm {
            id,
            version,
            recursive,
        } => commands::document::delete(&store, &author?, id, version, recursive, output),
        Commands::Restore { id } => commands::document::restore(&store, &author?, id, output),
        Commands::Mv { from, to } => {
            commands::document::move_document(&store, &author?, from, to, output)
        }
        Commands::Cp { from, to } => commands::document::copy(&store, &author?, from, to, output),
        Commands::Revert {
            id,
            target,
            message,
        } => commands::document::revert(&store, &author?, id, target, message, output),
        Commands::Link { from, to, tag } => commands::link::create(&store, from, to, tag, output),
        Commands::Unlink { from, to, tag } => {
            commands::link::remove(&store, from, to, tag, output)
        }
        Commands::Links {
            id,
            incoming,
            outgoing,
            deleted,
        } => {
            let direction = match (incoming, outgoing) {
                (true, _) => LinkDirection::Incoming,
                (_, true) => LinkDirection::Outgoing,
                _ => LinkDirection::Both,
            };
            commands::link::list(&store, id, direction, deleted, output)
        }
        Commands::Orphans => commands::link::orphans(&store, output),
        Commands::Vacuum {
            older_than,
            prefix,
            dry_run,
            yes,
        } => commands::vacuum::run(&store, older_than, prefix, dry_run, yes, output),
        Commands::Config { .. } => unreachable!(), // Handled above
    };

    store.close()?;
    result
}

/// Install a stderr subscriber filtered to this workspace's crates
fn init_logging(config: &Config) {
    let level = config.log_level.as_deref().unwrap_or("warn");
    let env_filter = EnvFilter::new(format!(
        "docstore_core={},docstore_cli={}",
        level, level
    ));

    // Ignore error if already initialized
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Author for mutating commands: flag, then config, then the login name
fn resolve_author(flag: Option<String>, config: &Config) -> Result<String> {
    let from_env = || {
        ["USER", "USERNAME"]
            .iter()
            .find_map(|var| std::env::var(var).ok())
    };

    let author = flag
        .or_else(|| config.author.clone())
        .or_else(from_env)
        .map(|a| a.trim().to_string())
        .filter(|a| !a.is_empty());

    match author {
        Some(author) => Ok(author),
        None => bail!("No author configured. Pass --author or set DOCSTORE_AUTHOR."),
    }
}

/// Guidance for the first store error in the chain, if any
fn recovery_hint(error: &anyhow::Error) -> Option<&'static str> {
    error
        .chain()
        .find_map(|cause| cause.downcast_ref::<StoreError>())
        .and_then(StoreError::recovery_suggestion)
}
