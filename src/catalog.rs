//! Catalog access.
//!
//! The host catalog is an external collaborator reached through
//! [`CatalogRepository`]. [`SqliteCatalog`] is the implementation the
//! `catsync` binary ships with: a local mirror table filled by
//! `catsync catalog import`, sharing a database with the progress flags so
//! eligibility is a single join.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::DateTime;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use std::collections::HashSet;
use std::path::Path;

use crate::models::{AuctionFields, CatalogItem, ItemKind, STATUS_PUBLISHED};
use crate::progress::indexed_flag_key;

/// Read-only view of the catalog.
#[async_trait]
pub trait CatalogRepository: Send + Sync {
    /// Up to `limit` published items that are not flagged as indexed for
    /// `collection`, in catalog order (newest first).
    async fn fetch_eligible(&self, collection: &str, limit: usize) -> Result<Vec<CatalogItem>>;

    /// Number of items [`fetch_eligible`](CatalogRepository::fetch_eligible)
    /// would return without a limit.
    async fn count_eligible(&self, collection: &str) -> Result<u64>;

    /// Look up one item regardless of status.
    async fn get_item(&self, id: &str) -> Result<Option<CatalogItem>>;

    /// The subset of `ids` that still resolve to catalog items.
    async fn existing_ids(&self, ids: &[String]) -> Result<HashSet<String>>;
}

/// Published items with no indexed flag for the collection. A flag row may
/// exist with a value other than '1'; that still means "needs indexing".
/// Binds: flag key, published status.
const ELIGIBLE_FROM: &str = r#"
    FROM catalog_items c
    LEFT JOIN index_flags f ON f.item_id = c.id AND f.meta_key = ?
    WHERE c.status = ?
      AND (f.item_id IS NULL OR f.value != '1')
"#;

pub struct SqliteCatalog {
    pool: SqlitePool,
}

impl SqliteCatalog {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert or replace catalog items. Returns the number written.
    ///
    /// Ids are stored trimmed; that stored form is the one flags, documents
    /// and lookups use.
    pub async fn upsert_items(&self, items: &[CatalogItem]) -> Result<usize> {
        let mut tx = self.pool.begin().await?;

        for item in items {
            let id = item.id.trim();
            if id.is_empty() {
                anyhow::bail!("catalog item with empty id (title: '{}')", item.title);
            }

            sqlx::query(
                r#"
                INSERT INTO catalog_items (id, title, description, short_description, price, kind,
                                           visibility, stock_status, status, author, created_at,
                                           image_url, image_html, auction_dates_from, auction_dates_to,
                                           auction_start_price, auction_has_started,
                                           categories_json, attribute_terms_json)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(id) DO UPDATE SET
                    title = excluded.title,
                    description = excluded.description,
                    short_description = excluded.short_description,
                    price = excluded.price,
                    kind = excluded.kind,
                    visibility = excluded.visibility,
                    stock_status = excluded.stock_status,
                    status = excluded.status,
                    author = excluded.author,
                    created_at = excluded.created_at,
                    image_url = excluded.image_url,
                    image_html = excluded.image_html,
                    auction_dates_from = excluded.auction_dates_from,
                    auction_dates_to = excluded.auction_dates_to,
                    auction_start_price = excluded.auction_start_price,
                    auction_has_started = excluded.auction_has_started,
                    categories_json = excluded.categories_json,
                    attribute_terms_json = excluded.attribute_terms_json
                "#,
            )
            .bind(id)
            .bind(&item.title)
            .bind(&item.description)
            .bind(&item.short_description)
            .bind(item.price)
            .bind(item.kind.as_str())
            .bind(&item.visibility)
            .bind(&item.stock_status)
            .bind(&item.status)
            .bind(&item.author)
            .bind(item.created_at.timestamp())
            .bind(&item.image_url)
            .bind(&item.image_html)
            .bind(&item.auction.dates_from)
            .bind(&item.auction.dates_to)
            .bind(item.auction.start_price)
            .bind(item.auction.has_started)
            .bind(serde_json::to_string(&item.categories)?)
            .bind(serde_json::to_string(&item.attribute_terms)?)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(items.len())
    }

    /// Change the publication status of one item.
    pub async fn set_status(&self, id: &str, status: &str) -> Result<bool> {
        let result = sqlx::query("UPDATE catalog_items SET status = ? WHERE id = ?")
            .bind(status)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Remove one item from the mirror.
    pub async fn delete_item(&self, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM catalog_items WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

/// Load a JSON array of catalog items from disk into the mirror.
pub async fn import_file(catalog: &SqliteCatalog, path: &Path) -> Result<usize> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read catalog file: {}", path.display()))?;
    let items: Vec<CatalogItem> = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse catalog file: {}", path.display()))?;
    catalog.upsert_items(&items).await
}

fn item_from_row(row: &SqliteRow) -> Result<CatalogItem> {
    let id: String = row.get("id");
    let created_at: i64 = row.get("created_at");
    let categories_json: String = row.get("categories_json");
    let attribute_terms_json: String = row.get("attribute_terms_json");
    let kind: String = row.get("kind");

    Ok(CatalogItem {
        created_at: DateTime::from_timestamp(created_at, 0)
            .with_context(|| format!("item {}: created_at out of range", id))?,
        categories: serde_json::from_str(&categories_json)
            .with_context(|| format!("item {}: malformed categories", id))?,
        attribute_terms: serde_json::from_str(&attribute_terms_json)
            .with_context(|| format!("item {}: malformed attribute terms", id))?,
        title: row.get("title"),
        description: row.get("description"),
        short_description: row.get("short_description"),
        price: row.get("price"),
        kind: ItemKind::parse(&kind),
        visibility: row.get("visibility"),
        stock_status: row.get("stock_status"),
        status: row.get("status"),
        author: row.get("author"),
        image_url: row.get("image_url"),
        image_html: row.get("image_html"),
        auction: AuctionFields {
            dates_from: row.get("auction_dates_from"),
            dates_to: row.get("auction_dates_to"),
            start_price: row.get("auction_start_price"),
            has_started: row.get("auction_has_started"),
        },
        id,
    })
}

#[async_trait]
impl CatalogRepository for SqliteCatalog {
    async fn fetch_eligible(&self, collection: &str, limit: usize) -> Result<Vec<CatalogItem>> {
        let sql = format!(
            "SELECT c.* {} ORDER BY c.created_at DESC, c.id ASC LIMIT ?",
            ELIGIBLE_FROM
        );
        let rows = sqlx::query(&sql)
            .bind(indexed_flag_key(collection))
            .bind(STATUS_PUBLISHED)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(item_from_row).collect()
    }

    async fn count_eligible(&self, collection: &str) -> Result<u64> {
        let sql = format!("SELECT COUNT(*) {}", ELIGIBLE_FROM);
        let count: i64 = sqlx::query_scalar(&sql)
            .bind(indexed_flag_key(collection))
            .bind(STATUS_PUBLISHED)
            .fetch_one(&self.pool)
            .await?;
        Ok(count.max(0) as u64)
    }

    async fn get_item(&self, id: &str) -> Result<Option<CatalogItem>> {
        let row = sqlx::query("SELECT * FROM catalog_items WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(item_from_row).transpose()
    }

    async fn existing_ids(&self, ids: &[String]) -> Result<HashSet<String>> {
        if ids.is_empty() {
            return Ok(HashSet::new());
        }

        let placeholders = vec!["?"; ids.len()].join(", ");
        let sql = format!("SELECT id FROM catalog_items WHERE id IN ({})", placeholders);
        let mut query = sqlx::query_scalar::<_, String>(&sql);
        for id in ids {
            query = query.bind(id);
        }

        Ok(query.fetch_all(&self.pool).await?.into_iter().collect())
    }
}
