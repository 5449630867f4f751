//! Service wiring.
//!
//! Builds the pipeline from a [`Config`] once per process: one SQLite pool
//! shared by the catalog mirror and the progress store, one engine client,
//! and the indexing and search services on top. Commands and the HTTP
//! server receive an [`App`] instead of looking anything up globally.

use anyhow::Result;
use std::sync::Arc;

use crate::catalog::SqliteCatalog;
use crate::config::Config;
use crate::db;
use crate::engine::SearchEngineClient;
use crate::filter::FilterCompiler;
use crate::indexer::IndexingEngine;
use crate::mapper::DocumentMapper;
use crate::migrate::migrate_pool;
use crate::progress::SqliteProgressStore;
use crate::schema::{product_schema, SchemaManager};
use crate::search::SearchService;
use crate::typesense::TypesenseClient;

pub struct App {
    pub config: Config,
    pub client: Arc<dyn SearchEngineClient>,
    pub catalog: Arc<SqliteCatalog>,
    pub progress: Arc<SqliteProgressStore>,
    pub indexer: IndexingEngine,
    pub search: SearchService,
}

impl App {
    /// Open the database and connect to the configured Typesense server.
    pub async fn open(config: &Config) -> Result<Self> {
        let client = Arc::new(TypesenseClient::new(&config.engine)?);
        Self::with_client(config, client).await
    }

    /// Like [`App::open`] with a caller-supplied engine client.
    pub async fn with_client(config: &Config, client: Arc<dyn SearchEngineClient>) -> Result<Self> {
        let pool = db::connect(config).await?;
        migrate_pool(&pool).await?;

        let timezone = config.search.parse_timezone()?;
        let collection = config.collection.scoped_name();

        let catalog = Arc::new(SqliteCatalog::new(pool.clone()));
        let progress = Arc::new(SqliteProgressStore::new(pool, catalog.clone()));

        let indexer = IndexingEngine::new(
            client.clone(),
            catalog.clone(),
            progress.clone(),
            SchemaManager::new(product_schema(&collection)),
            DocumentMapper::new(timezone),
        );
        let search = SearchService::new(
            client.clone(),
            catalog.clone(),
            FilterCompiler::new(timezone),
            collection,
            config.search.per_page,
        );

        Ok(Self {
            config: config.clone(),
            client,
            catalog,
            progress,
            indexer,
            search,
        })
    }

    pub fn batch_size(&self) -> usize {
        self.config.indexing.batch_size
    }
}
