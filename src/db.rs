//! Single entry point to the configured storage engine.
//!
//! Construct one [`Database`] at process start and hand it by reference to
//! callers; it owns the engine lifecycle so callers never manage connection
//! state themselves. The engine is built from configuration and connected
//! lazily on first use; `disconnect` drops it so a later `init` rebuilds
//! cleanly.

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::debug;

use crate::config::DbConfig;
use crate::error::{DbError, Result};
use crate::metrics::CacheStatsSnapshot;
use crate::query::{FindOptions, Query};
use crate::storage::{
    DeleteResult, Document, IndexInfo, IndexOptions, StorageBackend, StorageBackendType,
    UpdateResult,
};

#[derive(Default)]
struct FacadeState {
    engine: Option<Arc<StorageBackendType>>,
    initialized: bool,
}

pub struct Database {
    config: DbConfig,
    state: Mutex<FacadeState>,
}

impl Database {
    pub fn new(config: DbConfig) -> Self {
        Self {
            config,
            state: Mutex::new(FacadeState::default()),
        }
    }

    /// Build the configured engine and connect it. Idempotent while
    /// connected. On failure the facade is left engine-less and retryable.
    pub async fn init(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        if state.initialized && state.engine.as_ref().is_some_and(|e| e.initialized()) {
            return Ok(());
        }
        state.engine = None;
        state.initialized = false;

        let engine = StorageBackendType::from_config(&self.config.storage, &self.config.cache)?;
        engine.connect().await?;
        debug!(engine = %self.config.storage.engine, "database connected");
        state.engine = Some(Arc::new(engine));
        state.initialized = true;
        Ok(())
    }

    /// Whether the facade has initialized and its engine reports ready.
    pub async fn is_connected(&self) -> bool {
        let state = self.state.lock().await;
        state.initialized && state.engine.as_ref().is_some_and(|e| e.initialized())
    }

    /// Connect if necessary and hand out the engine. Called by every CRUD
    /// method so callers never manage connection state.
    async fn ensure_connection(&self) -> Result<Arc<StorageBackendType>> {
        {
            let state = self.state.lock().await;
            if state.initialized {
                if let Some(engine) = &state.engine {
                    if engine.initialized() {
                        return Ok(engine.clone());
                    }
                }
            }
        }
        self.init().await?;
        let state = self.state.lock().await;
        state.engine.clone().ok_or(DbError::NotConnected)
    }

    /// Disconnect the engine, clear the initialized flag and drop the
    /// engine reference so a later `init` rebuilds from configuration.
    pub async fn disconnect(&self) -> Result<()> {
        let engine = {
            let mut state = self.state.lock().await;
            state.initialized = false;
            state.engine.take()
        };
        if let Some(engine) = engine {
            engine.disconnect().await?;
        }
        Ok(())
    }

    pub async fn find(
        &self,
        collection: &str,
        query: &Query,
        options: &FindOptions,
    ) -> Result<Vec<Document>> {
        let engine = self.ensure_connection().await?;
        let mut docs = engine.find(collection, query, options).await?;
        // Guard for engines that return the sequence unordered.
        options.apply(&mut docs);
        Ok(docs)
    }

    pub async fn find_one(&self, collection: &str, query: &Query) -> Result<Option<Document>> {
        let engine = self.ensure_connection().await?;
        engine.find_one(collection, query).await
    }

    pub async fn create(&self, collection: &str, data: Document) -> Result<Document> {
        let engine = self.ensure_connection().await?;
        engine.create(collection, data).await
    }

    pub async fn update(
        &self,
        collection: &str,
        query: &Query,
        data: Document,
    ) -> Result<UpdateResult> {
        let engine = self.ensure_connection().await?;
        engine.update(collection, query, data).await
    }

    pub async fn delete(&self, collection: &str, query: &Query) -> Result<DeleteResult> {
        let engine = self.ensure_connection().await?;
        engine.delete(collection, query).await
    }

    pub async fn delete_collection(&self, collection: &str) -> Result<()> {
        let engine = self.ensure_connection().await?;
        engine.delete_collection(collection).await
    }

    pub async fn create_collection(&self, collection: &str) -> Result<()> {
        let engine = self.ensure_connection().await?;
        engine.create_collection(collection).await
    }

    pub async fn create_index(
        &self,
        collection: &str,
        fields: &[String],
        options: &IndexOptions,
    ) -> Result<()> {
        let engine = self.ensure_connection().await?;
        engine.create_index(collection, fields, options).await
    }

    pub async fn list_indexes(&self, collection: &str) -> Result<Vec<IndexInfo>> {
        let engine = self.ensure_connection().await?;
        engine.list_indexes(collection).await
    }

    /// Whether the configured engine manages explicit secondary indexes.
    pub async fn supports_explicit_indexes(&self) -> bool {
        let state = self.state.lock().await;
        state
            .engine
            .as_ref()
            .is_some_and(|e| e.supports_explicit_indexes())
    }

    /// Cache statistics, when the configured engine is cache-wrapped.
    pub async fn cache_stats(&self) -> Option<CacheStatsSnapshot> {
        let state = self.state.lock().await;
        state.engine.as_ref().and_then(|e| e.cache_stats())
    }
}
