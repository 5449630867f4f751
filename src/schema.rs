//! Collection schema and idempotent collection creation.
//!
//! The product collection is declared once in [`product_schema`]. Creating
//! it is safe to repeat: an engine "already exists" answer counts as
//! success, so every tick can call [`SchemaManager::ensure_collection`]
//! before touching documents.

use serde::Serialize;
use tracing::{error, info};

use crate::engine::SearchEngineClient;
use crate::error::EngineError;

/// Build the physical collection name for an environment, e.g.
/// `products_staging`.
pub fn collection_name(base: &str, environment: &str) -> String {
    format!("{}_{}", base, environment)
}

/// Field types understood by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FieldType {
    #[serde(rename = "string")]
    String,
    #[serde(rename = "string[]")]
    StringArray,
    #[serde(rename = "float")]
    Float,
    #[serde(rename = "int64")]
    Int64,
    #[serde(rename = "bool")]
    Bool,
}

/// One field definition. Flags left `None` are omitted from the payload so
/// the engine applies its defaults.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldDef {
    pub name: &'static str,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub facet: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sort: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub optional: Option<bool>,
    #[serde(rename = "index", skip_serializing_if = "Option::is_none")]
    pub indexed: Option<bool>,
}

impl FieldDef {
    fn new(name: &'static str, field_type: FieldType) -> Self {
        Self {
            name,
            field_type,
            facet: None,
            sort: None,
            optional: None,
            indexed: None,
        }
    }

    fn facet(mut self) -> Self {
        self.facet = Some(true);
        self
    }

    fn sort(mut self) -> Self {
        self.sort = Some(true);
        self
    }

    fn optional(mut self) -> Self {
        self.optional = Some(true);
        self
    }

    fn unindexed(mut self) -> Self {
        self.indexed = Some(false);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CollectionSchema {
    pub name: String,
    pub fields: Vec<FieldDef>,
    pub default_sorting_field: &'static str,
}

/// Schema of the product collection.
pub fn product_schema(name: &str) -> CollectionSchema {
    CollectionSchema {
        name: name.to_string(),
        fields: vec![
            FieldDef::new("id", FieldType::String),
            FieldDef::new("title", FieldType::String).sort(),
            FieldDef::new("description", FieldType::String).optional(),
            FieldDef::new("short_description", FieldType::String).optional(),
            FieldDef::new("price", FieldType::Float).optional().sort(),
            FieldDef::new("categories", FieldType::StringArray).facet(),
            FieldDef::new("attribute_terms", FieldType::StringArray).facet(),
            FieldDef::new("auction_dates_from", FieldType::Int64)
                .optional()
                .sort()
                .facet(),
            FieldDef::new("auction_dates_to", FieldType::Int64).optional().sort().facet(),
            FieldDef::new("auction_start_price", FieldType::Float).optional().sort(),
            FieldDef::new("auction_has_started", FieldType::Bool).optional().facet(),
            FieldDef::new("product_type", FieldType::String).facet(),
            FieldDef::new("product_visibility", FieldType::String).facet(),
            FieldDef::new("stock_status", FieldType::String).facet(),
            FieldDef::new("author", FieldType::String).optional().facet(),
            FieldDef::new("product_image_url", FieldType::String)
                .optional()
                .unindexed(),
            FieldDef::new("product_image_html", FieldType::String)
                .optional()
                .unindexed(),
            FieldDef::new("publish_date", FieldType::Int64).sort().facet(),
        ],
        default_sorting_field: "title",
    }
}

/// Result of [`SchemaManager::ensure_collection`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnsureOutcome {
    Created,
    AlreadyExists,
}

/// Creates the collection on demand. Holds no state besides the schema.
pub struct SchemaManager {
    schema: CollectionSchema,
}

impl SchemaManager {
    pub fn new(schema: CollectionSchema) -> Self {
        Self { schema }
    }

    pub fn schema(&self) -> &CollectionSchema {
        &self.schema
    }

    pub fn collection(&self) -> &str {
        &self.schema.name
    }

    /// Issue a create-collection call. No retries; the next tick tries again.
    pub async fn ensure_collection(
        &self,
        client: &dyn SearchEngineClient,
    ) -> Result<EnsureOutcome, EngineError> {
        match client.ensure_collection(&self.schema).await {
            Ok(()) => {
                info!(collection = %self.schema.name, "Collection created");
                Ok(EnsureOutcome::Created)
            }
            Err(EngineError::Conflict(_)) => {
                info!(collection = %self.schema.name, "Collection already exists");
                Ok(EnsureOutcome::AlreadyExists)
            }
            Err(e) => {
                error!(collection = %self.schema.name, error = %e, "Error creating collection");
                Err(e)
            }
        }
    }
}
