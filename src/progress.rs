//! Indexing progress store.
//!
//! Two kinds of record survive restarts:
//!
//! - a per-item flag keyed by `{collection}_search_indexed`, value `'1'`
//!   once the item has been written to that collection;
//! - a per-collection row with the completion flag, the moment it was set,
//!   and a running count of indexed items.
//!
//! Everything is keyed by collection name, so resetting one environment's
//! collection never touches another's flags.

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Row, SqlitePool};
use std::sync::Arc;

use crate::catalog::CatalogRepository;
use crate::models::IndexState;

const INDEXED_FLAG_SUFFIX: &str = "_search_indexed";
const INDEXED_VALUE: &str = "1";

/// Per-item flag key for a collection, e.g. `products_production_search_indexed`.
pub fn indexed_flag_key(collection: &str) -> String {
    format!("{}{}", collection, INDEXED_FLAG_SUFFIX)
}

#[async_trait]
pub trait ProgressStore: Send + Sync {
    async fn is_complete(&self, collection: &str) -> Result<bool>;

    /// Set the completion flag and record the current time.
    async fn mark_complete(&self, collection: &str) -> Result<()>;

    /// Clear the completion flag, the counter, and every per-item flag of
    /// `collection`. Returns the number of item flags removed.
    async fn reset(&self, collection: &str) -> Result<u64>;

    /// Flag one item as indexed. Idempotent; the counter only moves when
    /// the flag actually changes.
    async fn mark_item_indexed(&self, collection: &str, item_id: &str) -> Result<()>;

    /// Remove the indexed flag of one item so it becomes eligible again.
    async fn clear_item(&self, collection: &str, item_id: &str) -> Result<()>;

    async fn is_item_indexed(&self, collection: &str, item_id: &str) -> Result<bool>;

    async fn state(&self, collection: &str) -> Result<IndexState>;

    /// Eligible catalog items not yet flagged for `collection`.
    async fn remaining_count(&self, collection: &str) -> Result<u64>;
}

/// Flags and state in SQLite. Remaining counts come from the catalog,
/// which must see the same flags table.
pub struct SqliteProgressStore {
    pool: SqlitePool,
    catalog: Arc<dyn CatalogRepository>,
}

impl SqliteProgressStore {
    pub fn new(pool: SqlitePool, catalog: Arc<dyn CatalogRepository>) -> Self {
        Self { pool, catalog }
    }
}

#[async_trait]
impl ProgressStore for SqliteProgressStore {
    async fn is_complete(&self, collection: &str) -> Result<bool> {
        let complete: Option<i64> =
            sqlx::query_scalar("SELECT complete FROM index_state WHERE collection = ?")
                .bind(collection)
                .fetch_optional(&self.pool)
                .await?;
        Ok(complete.unwrap_or(0) != 0)
    }

    async fn mark_complete(&self, collection: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO index_state (collection, complete, completed_at, indexed_count)
            VALUES (?, 1, ?, 0)
            ON CONFLICT(collection) DO UPDATE SET
                complete = 1,
                completed_at = excluded.completed_at
            "#,
        )
        .bind(collection)
        .bind(Utc::now().timestamp())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn reset(&self, collection: &str) -> Result<u64> {
        let mut tx = self.pool.begin().await?;

        let cleared = sqlx::query("DELETE FROM index_flags WHERE meta_key = ?")
            .bind(indexed_flag_key(collection))
            .execute(&mut *tx)
            .await?
            .rows_affected();

        sqlx::query(
            r#"
            INSERT INTO index_state (collection, complete, completed_at, indexed_count)
            VALUES (?, 0, NULL, 0)
            ON CONFLICT(collection) DO UPDATE SET
                complete = 0,
                completed_at = NULL,
                indexed_count = 0
            "#,
        )
        .bind(collection)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(cleared)
    }

    async fn mark_item_indexed(&self, collection: &str, item_id: &str) -> Result<()> {
        // The first statement is a write, so the transaction takes the write
        // lock up front (and waits on busy_timeout) instead of upgrading a
        // read snapshot, which SQLite refuses under WAL contention.
        let mut tx = self.pool.begin().await?;

        let changed = sqlx::query(
            r#"
            INSERT INTO index_flags (item_id, meta_key, value, updated_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(item_id, meta_key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at
            WHERE index_flags.value != excluded.value
            "#,
        )
        .bind(item_id)
        .bind(indexed_flag_key(collection))
        .bind(INDEXED_VALUE)
        .bind(Utc::now().timestamp())
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if changed == 0 {
            tx.commit().await?;
            return Ok(());
        }

        sqlx::query(
            r#"
            INSERT INTO index_state (collection, complete, completed_at, indexed_count)
            VALUES (?, 0, NULL, 1)
            ON CONFLICT(collection) DO UPDATE SET
                indexed_count = indexed_count + 1
            "#,
        )
        .bind(collection)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn clear_item(&self, collection: &str, item_id: &str) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let removed = sqlx::query(
            "DELETE FROM index_flags WHERE item_id = ? AND meta_key = ? AND value = ?",
        )
        .bind(item_id)
        .bind(indexed_flag_key(collection))
        .bind(INDEXED_VALUE)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        // Stray flags with other values carry no count.
        sqlx::query("DELETE FROM index_flags WHERE item_id = ? AND meta_key = ?")
            .bind(item_id)
            .bind(indexed_flag_key(collection))
            .execute(&mut *tx)
            .await?;

        if removed > 0 {
            sqlx::query(
                r#"
                UPDATE index_state
                SET indexed_count = MAX(indexed_count - 1, 0)
                WHERE collection = ?
                "#,
            )
            .bind(collection)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn is_item_indexed(&self, collection: &str, item_id: &str) -> Result<bool> {
        let value: Option<String> = sqlx::query_scalar(
            "SELECT value FROM index_flags WHERE item_id = ? AND meta_key = ?",
        )
        .bind(item_id)
        .bind(indexed_flag_key(collection))
        .fetch_optional(&self.pool)
        .await?;
        Ok(value.as_deref() == Some(INDEXED_VALUE))
    }

    async fn state(&self, collection: &str) -> Result<IndexState> {
        let row = sqlx::query(
            "SELECT complete, completed_at, indexed_count FROM index_state WHERE collection = ?",
        )
        .bind(collection)
        .fetch_optional(&self.pool)
        .await?;

        Ok(match row {
            Some(row) => IndexState {
                complete: row.get::<i64, _>("complete") != 0,
                completed_at: row.get("completed_at"),
                indexed_count: row.get::<i64, _>("indexed_count").max(0) as u64,
            },
            None => IndexState::default(),
        })
    }

    async fn remaining_count(&self, collection: &str) -> Result<u64> {
        self.catalog.count_eligible(collection).await
    }
}
