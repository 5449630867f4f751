//! # Catalog Search Sync CLI (`catsync`)
//!
//! ## Usage
//!
//! ```bash
//! catsync --config ./config/catsync.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `catsync init` | Create the SQLite database and run schema migrations |
//! | `catsync catalog import <file>` | Load catalog items from a JSON array |
//! | `catsync catalog set-status <id> <status>` | Change an item's status and re-sync it |
//! | `catsync catalog delete <id>` | Delete an item and remove it from the index |
//! | `catsync ping` | Test the connection to the search engine |
//! | `catsync tick` | Index one batch and print the tick report |
//! | `catsync index` | Tick until the collection is complete |
//! | `catsync status` | Show collection progress |
//! | `catsync search "<query>"` | Search the collection |
//! | `catsync search --live "<query>"` | Top five suggestions, relevance order |
//! | `catsync sync-item <id>` | Re-index one item |
//! | `catsync remove-item <id>` | Remove one item from the index |
//! | `catsync serve` | Start the HTTP server |
//!
//! ## Examples
//!
//! ```bash
//! # Full reindex with JSON progress on stderr
//! catsync index --force --progress json
//!
//! # Today's auctions in the comics category, graded 9.8
//! catsync search "" --category comics --attr grade=9.8 --auctions-only --sort auction_started
//! ```

use catalog_search_sync::commands::{self, SearchArgs};
use catalog_search_sync::{config, server};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Catalog Search Sync: incremental catalog indexing and filtered search
/// on Typesense.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/catsync.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "catsync",
    about = "Catalog Search Sync: incremental catalog indexing and filtered search on Typesense",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/catsync.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and all required tables
    /// (catalog_items, index_flags, index_state). Safe to run repeatedly.
    Init,

    /// Manage the local catalog mirror.
    Catalog {
        #[command(subcommand)]
        action: CatalogAction,
    },

    /// Test the connection to the search engine.
    Ping,

    /// Index one batch.
    ///
    /// Ensures the collection exists, upserts up to `batch_size` unindexed
    /// items and prints the tick report (`in_progress`, `complete` or
    /// `error`). Exits non-zero on `error`.
    Tick {
        /// Reset progress first and overwrite existing documents.
        #[arg(long)]
        force: bool,

        /// Override `[indexing].batch_size`.
        #[arg(long)]
        batch_size: Option<usize>,
    },

    /// Tick repeatedly until the collection is complete or a tick fails.
    Index {
        /// Reset progress first and overwrite existing documents.
        #[arg(long)]
        force: bool,

        /// Override `[indexing].batch_size`.
        #[arg(long)]
        batch_size: Option<usize>,

        /// Progress on stderr: `human`, `json` or `off`. Defaults to human
        /// on a TTY, off otherwise.
        #[arg(long)]
        progress: Option<String>,
    },

    /// Show collection progress and engine state.
    Status,

    /// Search the collection.
    Search {
        /// Free-text query. Empty matches everything.
        query: String,

        /// Category name. `Category` means no filter.
        #[arg(long)]
        category: Option<String>,

        /// Attribute filter as `name=value`. Repeat for several values.
        #[arg(long = "attr", value_parser = parse_key_val)]
        attributes: Vec<(String, String)>,

        /// Only auction items.
        #[arg(long)]
        auctions_only: bool,

        /// Sort key: price, price-desc, alpha_a, alpha_z, auction_started, auction_end.
        #[arg(long)]
        sort: Option<String>,

        /// 1-based result page.
        #[arg(long, default_value_t = 1)]
        page: u32,

        /// Restrict to one seller's items.
        #[arg(long)]
        seller: Option<String>,

        /// Search-as-you-type suggestions: free text only, top five hits.
        /// Other filters are ignored.
        #[arg(long)]
        live: bool,
    },

    /// Re-index one item after a catalog change. Unpublished or missing
    /// items are removed instead.
    SyncItem {
        id: String,
    },

    /// Remove one item from the index.
    RemoveItem {
        id: String,
    },

    /// Start the HTTP server on `[server].bind`.
    Serve,
}

#[derive(Subcommand)]
enum CatalogAction {
    /// Insert or update catalog items from a JSON array file.
    Import {
        file: PathBuf,
    },

    /// Change an item's status (e.g. `publish`, `draft`, `trash`) and
    /// re-sync its search document.
    SetStatus {
        id: String,
        status: String,
    },

    /// Delete an item from the catalog and from the search index.
    Delete {
        id: String,
    },
}

fn parse_key_val(s: &str) -> Result<(String, String), String> {
    let pos = s
        .find('=')
        .ok_or_else(|| format!("invalid KEY=VALUE: no '=' found in '{}'", s))?;
    Ok((s[..pos].to_string(), s[pos + 1..].to_string()))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let cfg = config::load_config(&cli.config)?;
    commands::init_logging(&cfg)?;

    match cli.command {
        Commands::Init => commands::run_init(&cfg).await?,
        Commands::Catalog {
            action: CatalogAction::Import { file },
        } => commands::run_import(&cfg, &file).await?,
        Commands::Catalog {
            action: CatalogAction::SetStatus { id, status },
        } => commands::run_catalog_set_status(&cfg, &id, &status).await?,
        Commands::Catalog {
            action: CatalogAction::Delete { id },
        } => commands::run_catalog_delete(&cfg, &id).await?,
        Commands::Ping => commands::run_ping(&cfg).await?,
        Commands::Tick { force, batch_size } => {
            commands::run_tick(&cfg, force, batch_size).await?
        }
        Commands::Index {
            force,
            batch_size,
            progress,
        } => commands::run_index(&cfg, force, batch_size, progress.as_deref()).await?,
        Commands::Status => commands::run_status(&cfg).await?,
        Commands::Search {
            query,
            live: true,
            ..
        } => commands::run_live_search(&cfg, &query).await?,
        Commands::Search {
            query,
            category,
            attributes,
            auctions_only,
            sort,
            page,
            seller,
            ..
        } => {
            commands::run_search(
                &cfg,
                SearchArgs {
                    query,
                    category,
                    attributes,
                    auctions_only,
                    sort,
                    page,
                    seller,
                },
            )
            .await?
        }
        Commands::SyncItem { id } => commands::run_sync_item(&cfg, &id).await?,
        Commands::RemoveItem { id } => commands::run_remove_item(&cfg, &id).await?,
        Commands::Serve => server::run_server(&cfg).await?,
    }

    Ok(())
}
