//! # Segue CLI (`segue`)
//!
//! ## Usage
//!
//! ```bash
//! segue --config ./config/segue.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `segue init` | Create the search database and run schema migrations |
//! | `segue versions` | List content versions, marking indexed and live ones |
//! | `segue index <version>` | Build the search indices of a version (`head` for the newest) |
//! | `segue get <id>` | Print one content object as JSON |
//! | `segue search "<query>"` | Fuzzy search content |
//! | `segue problems` | List content problems found while indexing |
//! | `segue serve` | Start the HTTP server |

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use segue_content::{commands, config, migrate, server};

/// Segue content CLI: index git-versioned content and serve it.
#[derive(Parser)]
#[command(name = "segue", version, about = "Versioned content store and search indexer")]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/segue.toml")]
    config: PathBuf,

    /// Log at debug level unless RUST_LOG is set.
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the search database schema. Idempotent.
    Init,

    /// List content versions, most recent first.
    Versions,

    /// Build the search indices of a version.
    Index {
        /// Commit id, or `head` for the newest commit on the tracked branch.
        version: String,

        /// Also make this the live version.
        #[arg(long)]
        live: bool,
    },

    /// Print one content object as JSON.
    Get {
        id: String,

        /// Version to read; defaults to the live version.
        #[arg(long)]
        version: Option<String>,
    },

    /// Fuzzy search content.
    Search {
        query: String,

        /// Restrict to content types (repeatable).
        #[arg(long = "type")]
        types: Vec<String>,

        /// Restrict to tags (repeatable).
        #[arg(long = "tag")]
        tags: Vec<String>,

        #[arg(long, default_value_t = 0)]
        start: usize,

        #[arg(long)]
        limit: Option<usize>,

        #[arg(long)]
        version: Option<String>,
    },

    /// List content problems recorded for a version.
    Problems {
        #[arg(long)]
        version: Option<String>,
    },

    /// Start the HTTP server.
    Serve,
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Versions => {
            commands::run_versions(&cfg).await?;
        }
        Commands::Index { version, live } => {
            commands::run_index(&cfg, &version, live).await?;
        }
        Commands::Get { id, version } => {
            commands::run_get(&cfg, &id, version.as_deref()).await?;
        }
        Commands::Search {
            query,
            types,
            tags,
            start,
            limit,
            version,
        } => {
            commands::run_search(&cfg, &query, types, tags, start, limit, version.as_deref())
                .await?;
        }
        Commands::Problems { version } => {
            commands::run_problems(&cfg, version.as_deref()).await?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}
