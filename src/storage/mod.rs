//! Storage backends for the session database.
//!
//! This module provides the storage backend implementations:
//! - `memory`: transient in-memory store, also the test double
//! - `duckdb`: embedded DuckDB document store
//! - `cached`: caching decorator adding a byte-budgeted read cache and
//!   per-collection traffic statistics around any other backend
//!
//! Each backend implements the [`StorageBackend`] trait, providing a
//! consistent interface for document CRUD, collection management and index
//! management, so callers never branch on backend identity.

pub mod cache;
pub mod cached;
pub mod duckdb;
pub mod memory;

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use uuid::Uuid;

use self::cached::CachedStorageBackend;
use self::duckdb::DuckDbBackend;
use self::memory::MemoryBackend;
use crate::config::{CacheConfig, StorageConfig};
use crate::error::{DbError, Result};
use crate::metrics::CacheStatsSnapshot;
use crate::query::{FindOptions, Query};

/// A stored document: a JSON object carrying a synthetic `_id` string field.
pub type Document = serde_json::Map<String, Value>;

/// Collection names are case-normalized once at every public entry point so
/// backends and cache keys agree on the same name.
pub(crate) fn normalize_collection(name: &str) -> String {
    name.to_ascii_lowercase()
}

/// Assign a fresh `_id` when the document does not carry one.
pub(crate) fn ensure_document_id(doc: &mut Document) {
    if !doc.contains_key("_id") {
        doc.insert("_id".to_string(), Value::String(Uuid::new_v4().to_string()));
    }
}

/// Approximate deep size of a document: its serialized JSON byte length.
pub(crate) fn document_size(doc: &Document) -> usize {
    match serde_json::to_vec(doc) {
        Ok(bytes) => bytes.len(),
        Err(err) => {
            tracing::warn!(error = %err, "failed to size document");
            0
        }
    }
}

/// Apply an update payload to one document: a payload carrying `_id`
/// replaces the document wholesale, otherwise its fields are merged in.
/// Returns whether the document actually changed.
pub(crate) fn apply_update(existing: &mut Document, data: &Document) -> bool {
    let before = existing.clone();
    if data.contains_key("_id") {
        *existing = data.clone();
    } else {
        for (field, value) in data {
            existing.insert(field.clone(), value.clone());
        }
    }
    *existing != before
}

/// Result of an update operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateResult {
    pub matched_count: u64,
    pub modified_count: u64,
}

/// Result of a delete operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeleteResult {
    pub deleted_count: u64,
}

/// Options for index creation.
#[derive(Debug, Clone, Default)]
pub struct IndexOptions {
    /// Reject duplicate values over the indexed fields.
    pub unique: bool,
    /// Explicit index name; derived from the fields when absent.
    pub name: Option<String>,
}

/// Metadata describing an index registered on a collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexInfo {
    pub name: String,
    pub fields: Vec<String>,
    pub unique: bool,
}

/// Storage backend trait for document CRUD operations.
///
/// Operations a backend does not support keep the default implementations,
/// which fail with [`DbError::NotImplemented`]; this lets the decorator and
/// the facade be written once and backends filled in independently.
#[async_trait]
pub trait StorageBackend: Send + Sync + 'static {
    /// Establish the backend connection.
    async fn connect(&self) -> Result<()>;

    /// Tear down the backend connection.
    async fn disconnect(&self) -> Result<()>;

    /// Whether the backend has completed initialization.
    fn initialized(&self) -> bool;

    /// Whether the backend manages explicit secondary indexes.
    fn supports_explicit_indexes(&self) -> bool {
        false
    }

    /// Every document matching `query`, materialized, with `options` applied.
    async fn find(
        &self,
        collection: &str,
        query: &Query,
        options: &FindOptions,
    ) -> Result<Vec<Document>>;

    /// The first document matching `query`, if any.
    async fn find_one(&self, collection: &str, query: &Query) -> Result<Option<Document>>;

    /// Insert a document, assigning `_id` when absent; returns the stored
    /// document.
    async fn create(&self, collection: &str, data: Document) -> Result<Document>;

    /// Update the first document matching `query`. A `data` payload carrying
    /// `_id` replaces the document wholesale; otherwise fields are merged.
    async fn update(
        &self,
        collection: &str,
        query: &Query,
        data: Document,
    ) -> Result<UpdateResult>;

    /// Delete every document matching `query`.
    async fn delete(&self, collection: &str, query: &Query) -> Result<DeleteResult>;

    /// Drop a collection and all of its documents.
    async fn delete_collection(&self, collection: &str) -> Result<()>;

    /// Create an empty collection.
    async fn create_collection(&self, collection: &str) -> Result<()>;

    /// Create an index over `fields`.
    async fn create_index(
        &self,
        _collection: &str,
        _fields: &[String],
        _options: &IndexOptions,
    ) -> Result<()> {
        Err(DbError::NotImplemented("create_index"))
    }

    /// List the indexes registered for a collection.
    async fn list_indexes(&self, _collection: &str) -> Result<Vec<IndexInfo>> {
        Err(DbError::NotImplemented("list_indexes"))
    }
}

/// The configured storage engine, possibly wrapped in the caching decorator.
#[derive(Clone)]
pub enum StorageBackendType {
    Memory(MemoryBackend),
    DuckDb(DuckDbBackend),
    Cached(CachedStorageBackend),
}

impl StorageBackendType {
    /// Construct a backend from configuration, wrapping it in the caching
    /// decorator when the cache is enabled.
    pub fn from_config(storage: &StorageConfig, cache: &CacheConfig) -> Result<Self> {
        let backend = match storage.engine.as_str() {
            "memory" => StorageBackendType::Memory(MemoryBackend::new()),
            "duckdb" => StorageBackendType::DuckDb(DuckDbBackend::new(
                storage.connection.clone(),
                storage.options.clone(),
            )),
            other => return Err(DbError::UnknownEngine(other.to_string())),
        };

        if cache.enabled {
            let inner: Arc<dyn StorageBackend> = match backend {
                StorageBackendType::Memory(backend) => Arc::new(backend),
                StorageBackendType::DuckDb(backend) => Arc::new(backend),
                StorageBackendType::Cached(backend) => Arc::new(backend),
            };
            Ok(StorageBackendType::Cached(CachedStorageBackend::new(
                inner, cache,
            )))
        } else {
            Ok(backend)
        }
    }

    /// Cache statistics snapshot, when the caching decorator is active.
    pub fn cache_stats(&self) -> Option<CacheStatsSnapshot> {
        match self {
            StorageBackendType::Cached(backend) => Some(backend.cache_stats()),
            _ => None,
        }
    }
}

impl AsRef<dyn StorageBackend> for StorageBackendType {
    fn as_ref(&self) -> &(dyn StorageBackend + 'static) {
        match self {
            StorageBackendType::Memory(backend) => backend,
            StorageBackendType::DuckDb(backend) => backend,
            StorageBackendType::Cached(backend) => backend,
        }
    }
}

#[async_trait]
impl StorageBackend for StorageBackendType {
    async fn connect(&self) -> Result<()> {
        self.as_ref().connect().await
    }

    async fn disconnect(&self) -> Result<()> {
        self.as_ref().disconnect().await
    }

    fn initialized(&self) -> bool {
        self.as_ref().initialized()
    }

    fn supports_explicit_indexes(&self) -> bool {
        self.as_ref().supports_explicit_indexes()
    }

    async fn find(
        &self,
        collection: &str,
        query: &Query,
        options: &FindOptions,
    ) -> Result<Vec<Document>> {
        self.as_ref().find(collection, query, options).await
    }

    async fn find_one(&self, collection: &str, query: &Query) -> Result<Option<Document>> {
        self.as_ref().find_one(collection, query).await
    }

    async fn create(&self, collection: &str, data: Document) -> Result<Document> {
        self.as_ref().create(collection, data).await
    }

    async fn update(
        &self,
        collection: &str,
        query: &Query,
        data: Document,
    ) -> Result<UpdateResult> {
        self.as_ref().update(collection, query, data).await
    }

    async fn delete(&self, collection: &str, query: &Query) -> Result<DeleteResult> {
        self.as_ref().delete(collection, query).await
    }

    async fn delete_collection(&self, collection: &str) -> Result<()> {
        self.as_ref().delete_collection(collection).await
    }

    async fn create_collection(&self, collection: &str) -> Result<()> {
        self.as_ref().create_collection(collection).await
    }

    async fn create_index(
        &self,
        collection: &str,
        fields: &[String],
        options: &IndexOptions,
    ) -> Result<()> {
        self.as_ref().create_index(collection, fields, options).await
    }

    async fn list_indexes(&self, collection: &str) -> Result<Vec<IndexInfo>> {
        self.as_ref().list_indexes(collection).await
    }
}
