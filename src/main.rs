//! # Atelier CLI (`atelier`)
//!
//! The `atelier` binary initializes the database, serves the HTTP API and
//! exposes the same operations from the terminal.
//!
//! ## Usage
//!
//! ```bash
//! atelier --config ./config/atelier.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `atelier init` | Create the SQLite database and run schema migrations |
//! | `atelier serve` | Start the HTTP API server |
//! | `atelier tags list` | Show the tag catalog with usage counts |
//! | `atelier tags create <name>` | Add a tag to the catalog |
//! | `atelier tags merge <target> <ids...>` | Fold tags into one |
//! | `atelier list <collection>` | List records, optionally by `--tag` |
//! | `atelier generate "<prompt>"` | One completion through the provider chain |
//! | `atelier feed <path-or-url>` | Parse an RSS/Atom feed |
//! | `atelier trending` | Rank papers across the configured feeds |
//!
//! Log verbosity follows `RUST_LOG` (default `info`). Logs go to stderr so
//! command output on stdout stays clean.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use atelier::config::{self, Config};
use atelier::models::Collection;
use atelier::{completion, feed, migrate, server, tags_cmd, trending};

#[derive(Parser)]
#[command(
    name = "atelier",
    about = "Atelier: a personal workspace for tasks, papers, notes and journal entries",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/atelier.toml`. Provider API keys are read from
    /// the environment variables the file names, never from the file.
    #[arg(long, global = true, default_value = "./config/atelier.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Safe to run more than once.
    Init,

    /// Start the HTTP API server on `[server].bind`.
    Serve,

    /// Manage the tag catalog.
    Tags {
        #[command(subcommand)]
        action: TagsAction,
    },

    /// List records in a collection (`tasks`, `papers`, `notes`, `journal`).
    List {
        collection: String,

        /// Only records carrying this tag.
        #[arg(long)]
        tag: Option<String>,
    },

    /// Run a completion through the configured providers.
    ///
    /// Gemini is tried first, then the OpenAI-compatible endpoint. Works
    /// without a config file as long as a provider key is in the
    /// environment.
    Generate {
        prompt: String,

        /// Ask for a JSON answer and pretty-print it.
        #[arg(long)]
        json: bool,
    },

    /// Parse an RSS or Atom feed from a file or URL and print its items.
    Feed { source: String },

    /// Rank papers mentioned across the `[feeds].trending` URLs.
    Trending {
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
}

#[derive(Subcommand)]
enum TagsAction {
    /// Show every tag with the number of records using it.
    List,
    /// Add a tag (no-op if the name already exists).
    Create { name: String },
    /// Merge source tags into a target tag.
    ///
    /// Every record carrying a source tag is rewritten to carry the target
    /// instead, then the source tags are removed from the catalog. The
    /// target is created if it does not exist.
    Merge {
        /// Name of the tag to keep.
        target: String,
        /// Ids of the tags to fold into it.
        #[arg(required = true)]
        ids: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    // Commands that don't require a config file
    match &cli.command {
        Commands::Generate { prompt, json } => {
            let cfg = config::load_config(&cli.config).unwrap_or_else(|_| Config::minimal());
            return completion::run_generate(&cfg, prompt, *json).await;
        }
        Commands::Feed { source } => {
            let cfg = config::load_config(&cli.config).unwrap_or_else(|_| Config::minimal());
            return feed::run_feed(&cfg.feeds, source).await;
        }
        _ => {}
    }

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
        Commands::Tags { action } => match action {
            TagsAction::List => tags_cmd::run_list_tags(&cfg).await?,
            TagsAction::Create { name } => tags_cmd::run_create_tag(&cfg, &name).await?,
            TagsAction::Merge { target, ids } => {
                tags_cmd::run_merge(&cfg, &target, &ids).await?
            }
        },
        Commands::List { collection, tag } => {
            let collection: Collection = collection.parse()?;
            tags_cmd::run_list_records(&cfg, collection, tag.as_deref()).await?;
        }
        Commands::Trending { limit } => {
            trending::run_trending(&cfg.feeds, limit).await?;
        }
        Commands::Generate { .. } | Commands::Feed { .. } => {
            // Handled above (before config loading)
            unreachable!()
        }
    }

    Ok(())
}
