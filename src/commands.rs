//! CLI command implementations.
//!
//! Each `run_*` function backs one `catsync` subcommand. Human-readable
//! lines and JSON payloads go to stdout; logs and progress go to stderr.

use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::info;

use crate::app::App;
use crate::catalog::{self, CatalogRepository};
use crate::config::Config;
use crate::engine::SearchEngineClient;
use crate::filter::{AttributeSelection, FilterSelection, SortKey};
use crate::indexer::TickStatus;
use crate::migrate;
use crate::report::ProgressMode;
use crate::typesense::TypesenseClient;

/// Install the stderr `tracing` subscriber. `RUST_LOG` wins over
/// `[logging].level`.
pub fn init_logging(config: &Config) -> Result<()> {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.level)),
        )
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;
    Ok(())
}

pub async fn run_init(config: &Config) -> Result<()> {
    migrate::run_migrations(config).await?;
    println!("Database initialized successfully.");
    Ok(())
}

pub async fn run_import(config: &Config, path: &Path) -> Result<()> {
    let app = App::open(config).await?;
    let count = catalog::import_file(&app.catalog, path).await?;
    info!(count, file = %path.display(), "Catalog imported");
    println!("Imported {} catalog item(s).", count);
    Ok(())
}

/// Change one item's status in the mirror, then bring its search document
/// in line (re-indexed when published, removed otherwise).
pub async fn run_catalog_set_status(config: &Config, id: &str, status: &str) -> Result<()> {
    let app = App::open(config).await?;
    if !app.catalog.set_status(id, status).await? {
        anyhow::bail!("No catalog item with id '{}'", id);
    }
    info!(item_id = %id, status = %status, "Catalog status changed");

    let outcome = app.indexer.sync_item(id).await?;
    println!(
        "{}",
        serde_json::to_string_pretty(
            &serde_json::json!({ "id": id, "status": status, "outcome": outcome })
        )?
    );
    Ok(())
}

/// Delete one item from the mirror and its document from the index.
pub async fn run_catalog_delete(config: &Config, id: &str) -> Result<()> {
    let app = App::open(config).await?;
    if !app.catalog.delete_item(id).await? {
        anyhow::bail!("No catalog item with id '{}'", id);
    }
    info!(item_id = %id, "Catalog item deleted");

    let removed = app.indexer.remove_item(id).await?;
    println!(
        "{}",
        serde_json::to_string_pretty(
            &serde_json::json!({ "id": id, "deleted": true, "removed": removed })
        )?
    );
    Ok(())
}

pub async fn run_ping(config: &Config) -> Result<()> {
    let client = TypesenseClient::new(&config.engine)?;
    match client.health().await {
        Ok(()) => {
            println!("ok: connected to {}", config.engine.base_url());
            Ok(())
        }
        Err(e) => anyhow::bail!("Connection failed: {}", e),
    }
}

pub async fn run_tick(config: &Config, force: bool, batch_size: Option<usize>) -> Result<()> {
    let app = App::open(config).await?;
    let batch_size = resolve_batch_size(&app, batch_size)?;

    let report = if force {
        app.indexer.force_reindex(batch_size).await
    } else {
        app.indexer.tick(batch_size, false).await
    };

    println!("{}", serde_json::to_string_pretty(&report)?);
    if report.status == TickStatus::Error {
        anyhow::bail!("{}", report.message);
    }
    Ok(())
}

pub async fn run_index(
    config: &Config,
    force: bool,
    batch_size: Option<usize>,
    progress: Option<&str>,
) -> Result<()> {
    let mode = match progress {
        Some(s) => ProgressMode::parse(s)
            .with_context(|| format!("Unknown progress mode: '{}'. Use human, json or off.", s))?,
        None => ProgressMode::default_for_tty(),
    };

    let app = App::open(config).await?;
    let batch_size = resolve_batch_size(&app, batch_size)?;
    let reporter = mode.reporter();

    let summary = app
        .indexer
        .run_until_complete(batch_size, force, reporter.as_ref())
        .await;

    println!("{}", serde_json::to_string_pretty(&summary)?);
    if summary.status == TickStatus::Error {
        anyhow::bail!("{}", summary.message);
    }
    Ok(())
}

pub async fn run_status(config: &Config) -> Result<()> {
    let app = App::open(config).await?;
    let status = app.indexer.status().await?;
    println!("{}", serde_json::to_string_pretty(&status)?);
    Ok(())
}

/// Flags of `catsync search`.
#[derive(Debug, Default)]
pub struct SearchArgs {
    pub query: String,
    pub category: Option<String>,
    pub attributes: Vec<(String, String)>,
    pub auctions_only: bool,
    pub sort: Option<String>,
    pub page: u32,
    pub seller: Option<String>,
}

impl SearchArgs {
    pub fn into_selection(self) -> FilterSelection {
        let mut attributes: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for (name, value) in self.attributes {
            attributes.entry(name).or_default().push(value);
        }

        FilterSelection {
            query: self.query,
            category: self.category,
            attributes: attributes
                .into_iter()
                .map(|(name, values)| (name, AttributeSelection::Many(values)))
                .collect(),
            auctions_only: self.auctions_only,
            sort: self.sort.as_deref().map(SortKey::parse).unwrap_or_default(),
            page: self.page,
            seller_id: self.seller,
        }
    }
}

pub async fn run_search(config: &Config, args: SearchArgs) -> Result<()> {
    let app = App::open(config).await?;
    let selection = args.into_selection();

    let page = app.search.search(&selection).await?;

    if page.is_empty() {
        println!("No results.");
    } else {
        for (i, id) in page.items.iter().enumerate() {
            let title = app
                .catalog
                .get_item(id)
                .await?
                .map(|item| item.title)
                .unwrap_or_default();
            println!("{}. {}  {}", i + 1, id, title);
        }
    }
    println!(
        "Total listings: {}  (page {} of {})",
        page.total,
        page.current_page,
        page.total_pages.max(1)
    );
    Ok(())
}

pub async fn run_live_search(config: &Config, query: &str) -> Result<()> {
    let app = App::open(config).await?;
    let hits = app.search.live(query).await?;

    if hits.is_empty() {
        println!("No results found.");
    }
    for hit in &hits {
        match hit.price {
            Some(price) => println!("{}  {}  {:.2}", hit.id, hit.title, price),
            None => println!("{}  {}", hit.id, hit.title),
        }
    }
    Ok(())
}

pub async fn run_sync_item(config: &Config, id: &str) -> Result<()> {
    let app = App::open(config).await?;
    let outcome = app.indexer.sync_item(id).await?;
    println!(
        "{}",
        serde_json::to_string_pretty(&serde_json::json!({ "id": id, "outcome": outcome }))?
    );
    Ok(())
}

pub async fn run_remove_item(config: &Config, id: &str) -> Result<()> {
    let app = App::open(config).await?;
    let removed = app.indexer.remove_item(id).await?;
    println!(
        "{}",
        serde_json::to_string_pretty(&serde_json::json!({ "id": id, "removed": removed }))?
    );
    Ok(())
}

fn resolve_batch_size(app: &App, batch_size: Option<usize>) -> Result<usize> {
    match batch_size {
        Some(0) => anyhow::bail!("--batch-size must be > 0"),
        Some(n) => Ok(n),
        None => Ok(app.batch_size()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_attr_flags_group_by_name() {
        let args = SearchArgs {
            query: "hulk".to_string(),
            attributes: vec![
                ("grade".to_string(), "9.8".to_string()),
                ("publisher".to_string(), "Marvel".to_string()),
                ("grade".to_string(), "9.6".to_string()),
            ],
            sort: Some("auction_end".to_string()),
            page: 2,
            ..Default::default()
        };

        let selection = args.into_selection();
        assert_eq!(
            selection.attributes["grade"],
            AttributeSelection::Many(vec!["9.8".to_string(), "9.6".to_string()])
        );
        assert_eq!(selection.attributes.len(), 2);
        assert_eq!(selection.sort, SortKey::AuctionEnd);
        assert_eq!(selection.page(), 2);
    }
}
