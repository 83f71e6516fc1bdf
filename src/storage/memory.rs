//! Transient in-memory storage backend.
//!
//! Collections are plain vectors of documents behind a mutex. Nothing
//! survives the process; this is the configured `"memory"` engine and the
//! test double for the caching decorator and the facade.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::Result;
use crate::query::{FindOptions, Query};
use crate::storage::{
    apply_update, ensure_document_id, normalize_collection, DeleteResult, Document,
    StorageBackend, UpdateResult,
};

#[derive(Clone, Default)]
pub struct MemoryBackend {
    collections: Arc<Mutex<HashMap<String, Vec<Document>>>>,
    initialized: Arc<AtomicBool>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    async fn connect(&self) -> Result<()> {
        self.initialized.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        self.initialized.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    async fn find(
        &self,
        collection: &str,
        query: &Query,
        options: &FindOptions,
    ) -> Result<Vec<Document>> {
        let collection = normalize_collection(collection);
        let mut docs: Vec<Document> = {
            let collections = self.collections.lock();
            collections
                .get(&collection)
                .map(|docs| docs.iter().filter(|doc| query.matches(doc)).cloned().collect())
                .unwrap_or_default()
        };
        options.apply(&mut docs);
        Ok(docs)
    }

    async fn find_one(&self, collection: &str, query: &Query) -> Result<Option<Document>> {
        let collection = normalize_collection(collection);
        let collections = self.collections.lock();
        Ok(collections
            .get(&collection)
            .and_then(|docs| docs.iter().find(|doc| query.matches(doc)).cloned()))
    }

    async fn create(&self, collection: &str, mut data: Document) -> Result<Document> {
        let collection = normalize_collection(collection);
        ensure_document_id(&mut data);
        let mut collections = self.collections.lock();
        collections.entry(collection).or_default().push(data.clone());
        Ok(data)
    }

    async fn update(
        &self,
        collection: &str,
        query: &Query,
        data: Document,
    ) -> Result<UpdateResult> {
        let collection = normalize_collection(collection);
        let mut collections = self.collections.lock();
        let docs = match collections.get_mut(&collection) {
            Some(docs) => docs,
            None => return Ok(UpdateResult::default()),
        };
        match docs.iter_mut().find(|doc| query.matches(doc)) {
            Some(doc) => {
                let modified = apply_update(doc, &data);
                Ok(UpdateResult {
                    matched_count: 1,
                    modified_count: u64::from(modified),
                })
            }
            None => Ok(UpdateResult::default()),
        }
    }

    async fn delete(&self, collection: &str, query: &Query) -> Result<DeleteResult> {
        let collection = normalize_collection(collection);
        let mut collections = self.collections.lock();
        let docs = match collections.get_mut(&collection) {
            Some(docs) => docs,
            None => return Ok(DeleteResult::default()),
        };
        let before = docs.len();
        docs.retain(|doc| !query.matches(doc));
        Ok(DeleteResult {
            deleted_count: (before - docs.len()) as u64,
        })
    }

    async fn delete_collection(&self, collection: &str) -> Result<()> {
        self.collections.lock().remove(&normalize_collection(collection));
        Ok(())
    }

    async fn create_collection(&self, collection: &str) -> Result<()> {
        self.collections
            .lock()
            .entry(normalize_collection(collection))
            .or_default();
        Ok(())
    }
}
