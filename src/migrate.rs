use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    migrate_pool(&pool).await?;
    pool.close().await;
    Ok(())
}

/// Create every table and index on an open pool. Safe to run repeatedly.
pub async fn migrate_pool(pool: &SqlitePool) -> Result<()> {
    // Local mirror of the host catalog
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS catalog_items (
            id TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            description TEXT NOT NULL DEFAULT '',
            short_description TEXT NOT NULL DEFAULT '',
            price REAL,
            kind TEXT NOT NULL DEFAULT 'simple',
            visibility TEXT NOT NULL DEFAULT 'visible',
            stock_status TEXT NOT NULL DEFAULT 'instock',
            status TEXT NOT NULL DEFAULT 'publish',
            author TEXT,
            created_at INTEGER NOT NULL,
            image_url TEXT,
            image_html TEXT,
            auction_dates_from TEXT,
            auction_dates_to TEXT,
            auction_start_price REAL,
            auction_has_started INTEGER,
            categories_json TEXT NOT NULL DEFAULT '[]',
            attribute_terms_json TEXT NOT NULL DEFAULT '[]'
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Per-item indexed flags, one row per (item, collection key)
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS index_flags (
            item_id TEXT NOT NULL,
            meta_key TEXT NOT NULL,
            value TEXT NOT NULL,
            updated_at INTEGER NOT NULL,
            PRIMARY KEY (item_id, meta_key)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Per-collection aggregate state
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS index_state (
            collection TEXT PRIMARY KEY,
            complete INTEGER NOT NULL DEFAULT 0,
            completed_at INTEGER,
            indexed_count INTEGER NOT NULL DEFAULT 0
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_index_flags_meta_key ON index_flags(meta_key)")
        .execute(pool)
        .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_catalog_items_status ON catalog_items(status, created_at DESC)",
    )
    .execute(pool)
    .await?;

    Ok(())
}
