//! Core data models.
//!
//! [`CatalogItem`] is what the catalog hands us, [`IndexedDocument`] is what
//! the search engine receives, and [`IndexState`] is the per-collection
//! aggregate kept by the progress store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Item kind tag. Only auctions carry kind-specific fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    #[default]
    Simple,
    Variable,
    Auction,
    #[serde(untagged)]
    Other(String),
}

impl ItemKind {
    pub fn as_str(&self) -> &str {
        match self {
            ItemKind::Simple => "simple",
            ItemKind::Variable => "variable",
            ItemKind::Auction => "auction",
            ItemKind::Other(s) => s,
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "simple" => ItemKind::Simple,
            "variable" => ItemKind::Variable,
            "auction" => ItemKind::Auction,
            other => ItemKind::Other(other.to_string()),
        }
    }

    pub fn is_auction(&self) -> bool {
        matches!(self, ItemKind::Auction)
    }
}

/// Publication status. Only published items are eligible for indexing.
pub const STATUS_PUBLISHED: &str = "publish";

/// Kind-specific fields of an auction item, as stored by the catalog.
///
/// Timestamps are kept as the raw catalog strings; the document mapper
/// parses them and rejects malformed values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuctionFields {
    #[serde(default)]
    pub dates_from: Option<String>,
    #[serde(default)]
    pub dates_to: Option<String>,
    #[serde(default)]
    pub start_price: Option<f64>,
    #[serde(default)]
    pub has_started: Option<bool>,
}

/// One sellable item from the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogItem {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub short_description: String,
    #[serde(default)]
    pub price: Option<f64>,
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(default)]
    pub attribute_terms: Vec<String>,
    #[serde(default)]
    pub kind: ItemKind,
    #[serde(default = "default_visibility")]
    pub visibility: String,
    #[serde(default = "default_stock_status")]
    pub stock_status: String,
    #[serde(default = "default_status")]
    pub status: String,
    #[serde(default)]
    pub author: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub image_html: Option<String>,
    #[serde(default)]
    pub auction: AuctionFields,
}

fn default_visibility() -> String {
    "visible".to_string()
}
fn default_stock_status() -> String {
    "instock".to_string()
}
fn default_status() -> String {
    STATUS_PUBLISHED.to_string()
}

impl CatalogItem {
    pub fn is_published(&self) -> bool {
        self.status == STATUS_PUBLISHED
    }
}

/// Search-engine-ready representation of a catalog item.
///
/// Optional fields are skipped when absent; the engine never sees `null`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexedDocument {
    pub id: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub short_description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    pub categories: Vec<String>,
    pub attribute_terms: Vec<String>,
    pub product_type: String,
    pub product_visibility: String,
    pub stock_status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    pub publish_date: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auction_dates_from: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auction_dates_to: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auction_start_price: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auction_has_started: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub product_image_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub product_image_html: Option<String>,
}

/// Aggregate indexing state of one collection.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IndexState {
    pub complete: bool,
    /// Epoch seconds of the moment the collection was marked complete.
    pub completed_at: Option<i64>,
    pub indexed_count: u64,
}
