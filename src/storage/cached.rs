//! Caching decorator around a storage backend.
//!
//! Adds a byte-budgeted read cache for single-document lookups, coarse
//! per-collection invalidation on every write, and per-collection traffic
//! statistics, while preserving the wrapped backend's contract. Backend
//! errors propagate unchanged: all cache and stats bookkeeping happens only
//! after a successful backend result, and bookkeeping problems are logged
//! rather than surfaced.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::config::CacheConfig;
use crate::error::Result;
use crate::metrics::{CacheStatsSnapshot, OverallSnapshot, StatsRecorder};
use crate::query::{FindOptions, Query};
use crate::storage::cache::QueryCache;
use crate::storage::{
    document_size, normalize_collection, DeleteResult, Document, IndexInfo, IndexOptions,
    StorageBackend, UpdateResult,
};

#[derive(Clone)]
pub struct CachedStorageBackend {
    inner: Arc<dyn StorageBackend>,
    cache: Arc<Mutex<QueryCache>>,
    stats: Arc<Mutex<StatsRecorder>>,
}

impl CachedStorageBackend {
    pub fn new(inner: Arc<dyn StorageBackend>, config: &CacheConfig) -> Self {
        Self {
            inner,
            cache: Arc::new(Mutex::new(QueryCache::new(config.max_size_bytes))),
            stats: Arc::new(Mutex::new(StatsRecorder::new(config.interval_secs))),
        }
    }

    fn cache_key(collection: &str, query: &Query) -> String {
        format!("{collection}:{}", query.fingerprint())
    }

    /// Drop every cached entry for `collection` and account the removal.
    fn invalidate_collection(&self, collection: &str) {
        let (entries, bytes) = self.cache.lock().remove_collection(collection);
        if entries > 0 {
            debug!(collection, entries, bytes, "invalidated cached entries");
        }
        self.stats
            .lock()
            .record_invalidation(collection, entries as u64, bytes as u64);
    }

    /// Point-in-time statistics: overall cache occupancy plus counters and
    /// time series for every collection seen so far.
    pub fn cache_stats(&self) -> CacheStatsSnapshot {
        let overall = {
            let cache = self.cache.lock();
            OverallSnapshot {
                entries: cache.len(),
                current_size: cache.current_size_bytes(),
                max_size: cache.max_size_bytes(),
                utilization: if cache.max_size_bytes() == 0 {
                    0.0
                } else {
                    cache.current_size_bytes() as f64 / cache.max_size_bytes() as f64 * 100.0
                },
            }
        };
        CacheStatsSnapshot {
            overall,
            collections: self.stats.lock().snapshot(),
        }
    }
}

#[async_trait]
impl StorageBackend for CachedStorageBackend {
    async fn connect(&self) -> Result<()> {
        self.inner.connect().await
    }

    async fn disconnect(&self) -> Result<()> {
        let result = self.inner.disconnect().await;
        self.cache.lock().clear();
        self.stats.lock().clear();
        result
    }

    fn initialized(&self) -> bool {
        self.inner.initialized()
    }

    fn supports_explicit_indexes(&self) -> bool {
        self.inner.supports_explicit_indexes()
    }

    /// Multi-document reads always bypass the cache: they cannot be
    /// invalidated coherently with single-key bookkeeping. Every call is
    /// recorded as a miss served by the backend.
    async fn find(
        &self,
        collection: &str,
        query: &Query,
        options: &FindOptions,
    ) -> Result<Vec<Document>> {
        let collection = normalize_collection(collection);
        let docs = self.inner.find(&collection, query, options).await?;
        let bytes: usize = docs.iter().map(document_size).sum();
        self.stats.lock().record_miss(&collection, bytes as u64);
        Ok(docs)
    }

    async fn find_one(&self, collection: &str, query: &Query) -> Result<Option<Document>> {
        let collection = normalize_collection(collection);
        let key = Self::cache_key(&collection, query);

        let cached = {
            let cache = self.cache.lock();
            cache
                .get(&key)
                .map(|entry| (entry.value.clone(), entry.size_bytes))
        };
        if let Some((value, size)) = cached {
            self.stats.lock().record_hit(&collection, size as u64);
            return Ok(value);
        }

        let result = self.inner.find_one(&collection, query).await?;
        let size = QueryCache::entry_size(&result);
        self.stats.lock().record_miss(&collection, size as u64);
        self.cache.lock().insert(key, result.clone());
        Ok(result)
    }

    async fn create(&self, collection: &str, data: Document) -> Result<Document> {
        let collection = normalize_collection(collection);
        let write_bytes = document_size(&data);
        let created = self.inner.create(&collection, data).await?;
        self.stats.lock().record_write(&collection, write_bytes as u64);
        // A create can affect any previously cached query over the
        // collection, so the whole collection is invalidated.
        self.invalidate_collection(&collection);
        Ok(created)
    }

    async fn update(
        &self,
        collection: &str,
        query: &Query,
        data: Document,
    ) -> Result<UpdateResult> {
        let collection = normalize_collection(collection);
        let write_bytes = document_size(&data);
        let result = self.inner.update(&collection, query, data).await?;
        self.stats.lock().record_write(&collection, write_bytes as u64);
        self.invalidate_collection(&collection);

        // Write-through refill: re-read the document for this exact query
        // so the common update-then-read pattern stays a hit. A missing
        // document just leaves the key uncached.
        match self.inner.find_one(&collection, query).await {
            Ok(Some(doc)) => {
                self.cache
                    .lock()
                    .insert(Self::cache_key(&collection, query), Some(doc));
            }
            Ok(None) => {}
            Err(err) => {
                warn!(collection = %collection, error = %err, "cache refill read failed");
            }
        }
        Ok(result)
    }

    async fn delete(&self, collection: &str, query: &Query) -> Result<DeleteResult> {
        let collection = normalize_collection(collection);
        let result = self.inner.delete(&collection, query).await?;
        // The recorded write volume is the size of the request, not of
        // whatever was deleted; the documents are gone and were never sized.
        self.stats
            .lock()
            .record_write(&collection, query.fingerprint().len() as u64);

        let removed = self.cache.lock().remove(&Self::cache_key(&collection, query));
        if let Some(bytes) = removed {
            self.stats
                .lock()
                .record_invalidation(&collection, 1, bytes as u64);
        }
        // Other cached queries may have matched the deleted documents.
        self.invalidate_collection(&collection);
        Ok(result)
    }

    async fn delete_collection(&self, collection: &str) -> Result<()> {
        let collection = normalize_collection(collection);
        self.invalidate_collection(&collection);
        self.inner.delete_collection(&collection).await
    }

    async fn create_collection(&self, collection: &str) -> Result<()> {
        self.inner
            .create_collection(&normalize_collection(collection))
            .await
    }

    async fn create_index(
        &self,
        collection: &str,
        fields: &[String],
        options: &IndexOptions,
    ) -> Result<()> {
        self.inner
            .create_index(&normalize_collection(collection), fields, options)
            .await
    }

    async fn list_indexes(&self, collection: &str) -> Result<Vec<IndexInfo>> {
        self.inner
            .list_indexes(&normalize_collection(collection))
            .await
    }
}
