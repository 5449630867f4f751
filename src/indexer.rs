//! Incremental indexing engine.
//!
//! [`IndexingEngine::tick`] is one bounded unit of work: make sure the
//! collection exists, fetch one batch of unindexed items, upsert each one,
//! and report whether the caller should tick again. Nothing survives
//! between ticks except the progress store, so a tick can be cut short at
//! any point and the next one picks up the items still unflagged.
//!
//! States: `Idle → Ticking → {Idle, Complete}`. `Complete` only goes back to
//! `Idle` through a reset ([`IndexingEngine::force_reindex`]).

use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::catalog::CatalogRepository;
use crate::cursor::CatalogCursor;
use crate::engine::SearchEngineClient;
use crate::error::{EngineError, IndexError};
use crate::mapper::DocumentMapper;
use crate::models::IndexedDocument;
use crate::progress::ProgressStore;
use crate::report::{IndexProgressEvent, IndexProgressReporter};
use crate::schema::SchemaManager;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TickStatus {
    InProgress,
    Complete,
    Error,
}

/// Response of one tick, shaped for a polling caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TickReport {
    pub status: TickStatus,
    pub message: String,
    /// Items written to the engine during this tick.
    pub processed: u64,
    /// Items that failed and stay eligible for the next tick.
    pub failed: u64,
    /// Eligible items left after this tick.
    pub remaining: u64,
}

impl TickReport {
    fn error(message: impl Into<String>, processed: u64, failed: u64, remaining: u64) -> Self {
        Self {
            status: TickStatus::Error,
            message: message.into(),
            processed,
            failed,
            remaining,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineState {
    Idle,
    Ticking,
    Complete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UpsertOutcome {
    Created,
    Updated,
    /// The collection is complete and the upsert was not forced.
    Skipped,
}

/// Result of a catalog change hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncOutcome {
    Created,
    Updated,
    /// The item is gone or unpublished, so its document was removed.
    Removed,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndexStatus {
    pub collection: String,
    pub state: EngineState,
    pub complete: bool,
    pub completed_at: Option<i64>,
    pub indexed_count: u64,
    pub remaining: u64,
}

/// Totals of a [`run_until_complete`](IndexingEngine::run_until_complete) loop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub status: TickStatus,
    pub message: String,
    pub ticks: u64,
    pub indexed: u64,
    pub failed: u64,
    pub remaining: u64,
}

pub struct IndexingEngine {
    client: Arc<dyn SearchEngineClient>,
    catalog: Arc<dyn CatalogRepository>,
    progress: Arc<dyn ProgressStore>,
    cursor: CatalogCursor,
    schema: SchemaManager,
    mapper: DocumentMapper,
    ticking: Mutex<()>,
}

impl IndexingEngine {
    pub fn new(
        client: Arc<dyn SearchEngineClient>,
        catalog: Arc<dyn CatalogRepository>,
        progress: Arc<dyn ProgressStore>,
        schema: SchemaManager,
        mapper: DocumentMapper,
    ) -> Self {
        Self {
            cursor: CatalogCursor::new(catalog.clone()),
            client,
            catalog,
            progress,
            schema,
            mapper,
            ticking: Mutex::new(()),
        }
    }

    pub fn collection(&self) -> &str {
        self.schema.collection()
    }

    /// Process one batch. Concurrent calls are serialized.
    pub async fn tick(&self, batch_size: usize, force: bool) -> TickReport {
        let _guard = self.ticking.lock().await;
        self.tick_locked(batch_size, force).await
    }

    /// Clear all progress for the collection, then run a forced tick.
    pub async fn force_reindex(&self, batch_size: usize) -> TickReport {
        let _guard = self.ticking.lock().await;
        if let Err(report) = self.reset_progress().await {
            return report;
        }
        self.tick_locked(batch_size, true).await
    }

    async fn reset_progress(&self) -> Result<(), TickReport> {
        match self.progress.reset(self.collection()).await {
            Ok(cleared) => {
                info!(collection = %self.collection(), cleared, "Indexing status reset");
                Ok(())
            }
            Err(e) => {
                error!(collection = %self.collection(), error = %e, "Failed to reset indexing status");
                Err(TickReport::error(
                    format!("Failed to reset indexing status: {}", e),
                    0,
                    0,
                    0,
                ))
            }
        }
    }

    async fn tick_locked(&self, batch_size: usize, force: bool) -> TickReport {
        let collection = self.collection();

        if let Err(e) = self.schema.ensure_collection(self.client.as_ref()).await {
            let remaining = self.remaining_or_zero().await;
            return TickReport::error(format!("Error creating collection: {}", e), 0, 0, remaining);
        }

        let batch = match self.cursor.next_batch(collection, batch_size).await {
            Ok(batch) => batch,
            Err(e) => {
                error!(collection = %collection, error = %e, "Failed to fetch catalog batch");
                return TickReport::error(format!("Failed to fetch catalog items: {}", e), 0, 0, 0);
            }
        };

        if batch.is_empty() {
            return self.complete(0, 0).await;
        }

        debug!(collection = %collection, size = batch.len(), force, "Processing batch");

        let mut processed = 0u64;
        let mut failed = 0u64;
        let mut skipped = 0usize;

        for item in &batch {
            let doc = match self.mapper.map(item) {
                Ok(doc) => doc,
                Err(e) => {
                    warn!(collection = %collection, item_id = %item.id, error = %e, "Skipping malformed item");
                    failed += 1;
                    continue;
                }
            };

            match self.upsert(&doc, force).await {
                Ok(UpsertOutcome::Skipped) => skipped += 1,
                Ok(_) => processed += 1,
                Err(IndexError::Engine(e)) if e.is_connection() => {
                    error!(collection = %collection, item_id = %doc.id, error = %e, "Search engine unreachable, aborting batch");
                    let remaining = self.remaining_or_zero().await;
                    return TickReport::error(e.to_string(), processed, failed + 1, remaining);
                }
                Err(e) => {
                    warn!(collection = %collection, item_id = %doc.id, error = %e, "Error adding/updating item");
                    failed += 1;
                }
            }
        }

        // Every item hit the already-complete short-circuit: nothing more
        // will happen until a reset.
        if skipped == batch.len() {
            return self.complete(processed, failed).await;
        }

        let remaining = match self.progress.remaining_count(collection).await {
            Ok(n) => n,
            Err(e) => {
                error!(collection = %collection, error = %e, "Failed to count remaining items");
                return TickReport::error(
                    format!("Failed to count remaining items: {}", e),
                    processed,
                    failed,
                    0,
                );
            }
        };

        info!(collection = %collection, processed, failed, remaining, "Batch processed");
        TickReport {
            status: TickStatus::InProgress,
            message: format!(
                "Indexed {} item(s), {} failed, {} remaining.",
                processed, failed, remaining
            ),
            processed,
            failed,
            remaining,
        }
    }

    async fn complete(&self, processed: u64, failed: u64) -> TickReport {
        let collection = self.collection();
        if let Err(e) = self.progress.mark_complete(collection).await {
            error!(collection = %collection, error = %e, "Failed to mark indexing complete");
            return TickReport::error(
                format!("Failed to mark indexing complete: {}", e),
                processed,
                failed,
                0,
            );
        }
        info!(collection = %collection, "Indexing complete");
        TickReport {
            status: TickStatus::Complete,
            message: "Indexing complete.".to_string(),
            processed,
            failed,
            remaining: 0,
        }
    }

    async fn remaining_or_zero(&self) -> u64 {
        match self.progress.remaining_count(self.collection()).await {
            Ok(n) => n,
            Err(e) => {
                warn!(collection = %self.collection(), error = %e, "Failed to count remaining items");
                0
            }
        }
    }

    /// Create the document, falling back to an update when it already
    /// exists, then flag the item as indexed.
    pub async fn upsert(
        &self,
        doc: &IndexedDocument,
        force: bool,
    ) -> Result<UpsertOutcome, IndexError> {
        let collection = self.collection();

        if !force && self.progress.is_complete(collection).await? {
            debug!(collection = %collection, item_id = %doc.id, "Indexing is complete, skipping");
            return Ok(UpsertOutcome::Skipped);
        }

        let outcome = match self.client.create_document(collection, doc).await {
            Ok(()) => UpsertOutcome::Created,
            Err(EngineError::Conflict(_)) => {
                self.client
                    .update_document(collection, &doc.id, doc)
                    .await?;
                UpsertOutcome::Updated
            }
            Err(e) => return Err(e.into()),
        };

        self.progress
            .mark_item_indexed(collection, &doc.id)
            .await?;

        match outcome {
            UpsertOutcome::Created => {
                info!(collection = %collection, item_id = %doc.id, "Item added to search index")
            }
            _ => info!(collection = %collection, item_id = %doc.id, "Item re-indexed"),
        }
        Ok(outcome)
    }

    /// Bring one item's document in line with the catalog: forced upsert
    /// when published, removal otherwise.
    pub async fn sync_item(&self, id: &str) -> Result<SyncOutcome, IndexError> {
        let item = self.catalog.get_item(id).await?;

        let item = match item {
            Some(item) if item.is_published() => item,
            _ => {
                self.remove_item(id).await?;
                return Ok(SyncOutcome::Removed);
            }
        };

        self.schema.ensure_collection(self.client.as_ref()).await?;
        let doc = self.mapper.map(&item)?;

        match self.upsert(&doc, true).await? {
            UpsertOutcome::Created => Ok(SyncOutcome::Created),
            _ => Ok(SyncOutcome::Updated),
        }
    }

    /// Delete one item's document and clear its flag. Returns `false` when
    /// the engine had no such document.
    pub async fn remove_item(&self, id: &str) -> Result<bool, IndexError> {
        let collection = self.collection();

        let existed = match self.client.delete_document(collection, id).await {
            Ok(()) => {
                info!(collection = %collection, item_id = %id, "Item removed from search index");
                true
            }
            Err(EngineError::NotFound(_)) => {
                info!(collection = %collection, item_id = %id, "Item was not in the search index");
                false
            }
            Err(e) => {
                error!(collection = %collection, item_id = %id, error = %e, "Error removing item");
                return Err(e.into());
            }
        };

        self.progress.clear_item(collection, id).await?;
        Ok(existed)
    }

    pub async fn state(&self) -> anyhow::Result<EngineState> {
        if self.ticking.try_lock().is_err() {
            return Ok(EngineState::Ticking);
        }
        if self.progress.is_complete(self.collection()).await? {
            Ok(EngineState::Complete)
        } else {
            Ok(EngineState::Idle)
        }
    }

    pub async fn status(&self) -> anyhow::Result<IndexStatus> {
        let collection = self.collection();
        let state = self.state().await?;
        let progress = self.progress.state(collection).await?;
        let remaining = self.progress.remaining_count(collection).await?;

        Ok(IndexStatus {
            collection: collection.to_string(),
            state,
            complete: progress.complete,
            completed_at: progress.completed_at,
            indexed_count: progress.indexed_count,
            remaining,
        })
    }

    /// Tick until the collection is complete or a tick errors. With `force`,
    /// progress is reset first. Stops early when a tick makes no progress
    /// at all, since repeating it would fail on the same items.
    pub async fn run_until_complete(
        &self,
        batch_size: usize,
        force: bool,
        reporter: &dyn IndexProgressReporter,
    ) -> RunSummary {
        let mut summary = RunSummary {
            status: TickStatus::InProgress,
            message: String::new(),
            ticks: 0,
            indexed: 0,
            failed: 0,
            remaining: 0,
        };

        if force {
            let _guard = self.ticking.lock().await;
            if let Err(report) = self.reset_progress().await {
                summary.status = report.status;
                summary.message = report.message;
                return summary;
            }
        }

        let collection = self.collection().to_string();
        let total = self.remaining_or_zero().await;
        summary.remaining = total;
        reporter.report(IndexProgressEvent::Started {
            collection: collection.clone(),
            total,
        });

        loop {
            let report = self.tick(batch_size, force).await;

            summary.ticks += 1;
            summary.indexed += report.processed;
            summary.failed += report.failed;
            summary.remaining = report.remaining;
            summary.status = report.status;
            summary.message = report.message.clone();

            reporter.report(IndexProgressEvent::Batch {
                collection: collection.clone(),
                indexed: summary.indexed,
                total: total.max(summary.indexed),
                failed: summary.failed,
            });

            match report.status {
                TickStatus::InProgress if report.processed == 0 && report.failed > 0 => {
                    summary.status = TickStatus::Error;
                    summary.message = format!(
                        "No progress: all {} item(s) in the batch failed.",
                        report.failed
                    );
                    return summary;
                }
                TickStatus::InProgress => continue,
                _ => return summary,
            }
        }
    }
}
