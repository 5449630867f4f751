//! Restartable batch enumeration over the catalog.
//!
//! A [`CatalogCursor`] holds no position. Every call to
//! [`next_batch`](CatalogCursor::next_batch) re-queries the catalog against
//! the current progress flags, so items flagged since the previous call drop
//! out on their own and a restarted process picks up where the last one
//! stopped.

use anyhow::Result;
use std::sync::Arc;

use crate::catalog::CatalogRepository;
use crate::models::CatalogItem;

#[derive(Clone)]
pub struct CatalogCursor {
    catalog: Arc<dyn CatalogRepository>,
}

impl CatalogCursor {
    pub fn new(catalog: Arc<dyn CatalogRepository>) -> Self {
        Self { catalog }
    }

    /// Up to `batch_size` items still needing indexing in `collection`.
    /// An empty result means the collection is fully indexed, so a zero
    /// batch size is treated as one.
    pub async fn next_batch(&self, collection: &str, batch_size: usize) -> Result<Vec<CatalogItem>> {
        self.catalog
            .fetch_eligible(collection, batch_size.max(1))
            .await
    }
}
