//! Search engine abstraction.
//!
//! The [`SearchEngineClient`] trait is the only way the pipeline talks to
//! the document-search engine. [`TypesenseClient`](crate::typesense::TypesenseClient)
//! is the production implementation; tests plug in an in-process fake.
//!
//! | Method | Purpose |
//! |--------|---------|
//! | [`ensure_collection`](SearchEngineClient::ensure_collection) | Create a collection from a schema |
//! | [`collection_exists`](SearchEngineClient::collection_exists) | Retrieve a collection by name |
//! | [`create_document`](SearchEngineClient::create_document) | Insert a document, `Conflict` if the id exists |
//! | [`update_document`](SearchEngineClient::update_document) | Replace an existing document as a whole |
//! | [`delete_document`](SearchEngineClient::delete_document) | Remove a document by id |
//! | [`search`](SearchEngineClient::search) | Run a filtered, sorted, paginated query |
//! | [`health`](SearchEngineClient::health) | Connection test |

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::models::IndexedDocument;
use crate::schema::CollectionSchema;

/// Query parameters of one search request, serialized as the engine's
/// query string.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchParams {
    pub q: String,
    pub query_by: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub filter_by: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub facet_by: String,
    /// Empty means relevance order.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub sort_by: String,
    pub per_page: u32,
    pub page: u32,
    pub include_fields: String,
}

/// Document fields returned for a hit. Searches request only `id`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct HitDocument {
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SearchHit {
    pub document: HitDocument,
}

/// Engine response: hits in engine order plus the total match count.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SearchResponse {
    #[serde(default)]
    pub found: u64,
    #[serde(default)]
    pub hits: Vec<SearchHit>,
}

#[async_trait]
pub trait SearchEngineClient: Send + Sync {
    /// Create the collection. An existing collection is reported as
    /// [`EngineError::Conflict`].
    async fn ensure_collection(&self, schema: &CollectionSchema) -> Result<(), EngineError>;

    async fn collection_exists(&self, collection: &str) -> Result<bool, EngineError>;

    /// Insert a new document. A document with the same id is reported as
    /// [`EngineError::Conflict`].
    async fn create_document(
        &self,
        collection: &str,
        doc: &IndexedDocument,
    ) -> Result<(), EngineError>;

    /// Replace the stored document with `doc`. Fields absent from `doc`
    /// do not survive.
    async fn update_document(
        &self,
        collection: &str,
        id: &str,
        doc: &IndexedDocument,
    ) -> Result<(), EngineError>;

    async fn delete_document(&self, collection: &str, id: &str) -> Result<(), EngineError>;

    async fn search(
        &self,
        collection: &str,
        params: &SearchParams,
    ) -> Result<SearchResponse, EngineError>;

    /// Cheap round trip used to test connectivity.
    async fn health(&self) -> Result<(), EngineError>;
}
