//! Search service.
//!
//! Compiles a [`FilterSelection`], runs it against the collection, and
//! resolves hits back to catalog items. Any failure along the way is a
//! single [`SearchError`]; partial results are never returned.
//!
//! [`SearchService::live`] is the search-as-you-type variant: free text
//! only, relevance order, a handful of hits with enough catalog data to
//! render a suggestion.

use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, error};

use crate::catalog::CatalogRepository;
use crate::engine::{SearchEngineClient, SearchParams};
use crate::error::SearchError;
use crate::filter::{CompiledQuery, FilterCompiler, FilterSelection};
use crate::results::{hit_ids, map_results, ResultPage};

pub const QUERY_BY: &str = "title,description,short_description";
pub const FACET_BY: &str =
    "categories,attribute_terms,product_type,product_visibility,stock_status,author";
pub const INCLUDE_FIELDS: &str = "id";
/// Suggestions returned by a live search.
pub const LIVE_PER_PAGE: u32 = 5;

/// One live-search suggestion, resolved against the catalog.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LiveHit {
    pub id: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

pub struct SearchService {
    client: Arc<dyn SearchEngineClient>,
    catalog: Arc<dyn CatalogRepository>,
    compiler: FilterCompiler,
    collection: String,
    per_page: u32,
}

impl SearchService {
    pub fn new(
        client: Arc<dyn SearchEngineClient>,
        catalog: Arc<dyn CatalogRepository>,
        compiler: FilterCompiler,
        collection: String,
        per_page: u32,
    ) -> Self {
        Self {
            client,
            catalog,
            compiler,
            collection,
            per_page,
        }
    }

    /// Engine parameters for a selection.
    pub fn params(&self, selection: &FilterSelection) -> SearchParams {
        let CompiledQuery {
            query,
            filter_by,
            sort_by,
        } = self.compiler.compile(selection);

        SearchParams {
            q: query,
            query_by: QUERY_BY.to_string(),
            filter_by,
            facet_by: FACET_BY.to_string(),
            sort_by,
            per_page: self.per_page,
            page: selection.page(),
            include_fields: INCLUDE_FIELDS.to_string(),
        }
    }

    pub async fn search(&self, selection: &FilterSelection) -> Result<ResultPage, SearchError> {
        let params = self.params(selection);
        debug!(
            collection = %self.collection,
            q = %params.q,
            filter_by = %params.filter_by,
            sort_by = %params.sort_by,
            page = params.page,
            "Searching"
        );

        let response = self
            .client
            .search(&self.collection, &params)
            .await
            .map_err(|e| {
                error!(collection = %self.collection, error = %e, "Search request failed");
                SearchError::from(e)
            })?;

        let known = self.catalog.existing_ids(&hit_ids(&response)).await?;
        Ok(map_results(&response, params.page, self.per_page, &known))
    }

    /// Engine parameters for a live search. Only the visibility and stock
    /// clauses apply; no sort, so hits come back by relevance.
    pub fn live_params(&self, query: &str) -> SearchParams {
        let selection = FilterSelection {
            query: query.to_string(),
            ..Default::default()
        };
        let CompiledQuery {
            query, filter_by, ..
        } = self.compiler.compile(&selection);

        SearchParams {
            q: query,
            query_by: QUERY_BY.to_string(),
            filter_by,
            facet_by: String::new(),
            sort_by: String::new(),
            per_page: LIVE_PER_PAGE,
            page: 1,
            include_fields: INCLUDE_FIELDS.to_string(),
        }
    }

    /// Up to [`LIVE_PER_PAGE`] suggestions for `query`, in engine order.
    /// A blank query returns nothing without calling the engine.
    pub async fn live(&self, query: &str) -> Result<Vec<LiveHit>, SearchError> {
        if query.trim().is_empty() {
            return Ok(Vec::new());
        }

        let params = self.live_params(query.trim());
        let response = self
            .client
            .search(&self.collection, &params)
            .await
            .map_err(|e| {
                error!(collection = %self.collection, error = %e, "Live search request failed");
                SearchError::from(e)
            })?;

        let mut hits = Vec::with_capacity(response.hits.len());
        for id in hit_ids(&response) {
            // Hits whose item left the catalog are dropped.
            if let Some(item) = self.catalog.get_item(&id).await? {
                hits.push(LiveHit {
                    id: item.id,
                    title: item.title,
                    price: item.price,
                    image_url: item.image_url.filter(|u| !u.trim().is_empty()),
                });
            }
        }
        debug!(collection = %self.collection, q = %params.q, hits = hits.len(), "Live search");
        Ok(hits)
    }
}
