//! Byte-budgeted FIFO cache for single-document query results.

use std::collections::{HashMap, VecDeque};

use tracing::{debug, warn};

use crate::storage::Document;

/// A cached query result. `None` records a query that matched nothing.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub value: Option<Document>,
    pub size_bytes: usize,
}

/// Bounded store of cached `find_one` results with FIFO eviction.
///
/// Eviction is insertion-ordered, not recency-ordered; reads do no queue
/// bookkeeping. The aggregate size is maintained incrementally and always
/// equals the sum of the resident entries' sizes.
#[derive(Debug)]
pub struct QueryCache {
    entries: HashMap<String, CacheEntry>,
    order: VecDeque<String>,
    current_size_bytes: usize,
    max_size_bytes: usize,
}

impl QueryCache {
    pub fn new(max_size_bytes: usize) -> Self {
        Self {
            entries: HashMap::new(),
            order: VecDeque::new(),
            current_size_bytes: 0,
            max_size_bytes,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn current_size_bytes(&self) -> usize {
        self.current_size_bytes
    }

    pub fn max_size_bytes(&self) -> usize {
        self.max_size_bytes
    }

    /// Serialized size of a cached value, computed once per residency.
    pub fn entry_size(value: &Option<Document>) -> usize {
        match value {
            Some(doc) => match serde_json::to_vec(doc) {
                Ok(bytes) => bytes.len(),
                Err(err) => {
                    warn!(error = %err, "failed to size cache value");
                    0
                }
            },
            // Serialized `null`.
            None => 4,
        }
    }

    pub fn get(&self, key: &str) -> Option<&CacheEntry> {
        self.entries.get(key)
    }

    /// Insert a value, evicting oldest-inserted entries until it fits. A
    /// value larger than the whole budget is never stored and evicts
    /// nothing. Re-inserting an existing key refreshes its queue position.
    pub fn insert(&mut self, key: String, value: Option<Document>) {
        let size = Self::entry_size(&value);
        if size > self.max_size_bytes {
            debug!(key = %key, size, "value exceeds cache budget, skipping");
            return;
        }
        self.remove(&key);
        self.evict_if_needed(size);
        self.current_size_bytes += size;
        self.order.push_back(key.clone());
        self.entries.insert(
            key,
            CacheEntry {
                value,
                size_bytes: size,
            },
        );
    }

    fn evict_if_needed(&mut self, required_bytes: usize) {
        while self.current_size_bytes + required_bytes > self.max_size_bytes {
            let oldest = match self.order.pop_front() {
                Some(key) => key,
                None => break,
            };
            if let Some(entry) = self.entries.remove(&oldest) {
                self.current_size_bytes -= entry.size_bytes;
            }
        }
    }

    /// Remove one entry, returning its size.
    pub fn remove(&mut self, key: &str) -> Option<usize> {
        let entry = self.entries.remove(key)?;
        self.order.retain(|k| k != key);
        self.current_size_bytes -= entry.size_bytes;
        Some(entry.size_bytes)
    }

    /// Remove every entry belonging to `collection`. Returns the removed
    /// entry count and their summed sizes.
    pub fn remove_collection(&mut self, collection: &str) -> (usize, usize) {
        let prefix = format!("{collection}:");
        let keys: Vec<String> = self
            .entries
            .keys()
            .filter(|key| key.starts_with(&prefix))
            .cloned()
            .collect();
        let mut bytes = 0;
        for key in &keys {
            if let Some(size) = self.remove(key) {
                bytes += size;
            }
        }
        (keys.len(), bytes)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
        self.current_size_bytes = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn doc_of_about(bytes: usize) -> Option<Document> {
        // {"pad":"..."} serializes to 10 + pad bytes.
        let pad = "x".repeat(bytes.saturating_sub(10));
        match json!({ "pad": pad }) {
            Value::Object(map) => Some(map),
            _ => unreachable!(),
        }
    }

    fn resident_sum(cache: &QueryCache) -> usize {
        cache.entries.values().map(|e| e.size_bytes).sum()
    }

    #[test]
    fn size_is_incremental_sum_of_entries() {
        let mut cache = QueryCache::new(10_000);
        cache.insert("c:a".to_string(), doc_of_about(100));
        cache.insert("c:b".to_string(), doc_of_about(200));
        cache.insert("c:c".to_string(), None);
        assert_eq!(cache.current_size_bytes(), resident_sum(&cache));
        cache.remove("c:b");
        assert_eq!(cache.current_size_bytes(), resident_sum(&cache));
        cache.insert("c:a".to_string(), doc_of_about(50));
        assert_eq!(cache.current_size_bytes(), resident_sum(&cache));
    }

    #[test]
    fn fifo_evicts_oldest_first() {
        let mut cache = QueryCache::new(1000);
        cache.insert("c:k1".to_string(), doc_of_about(400));
        cache.insert("c:k2".to_string(), doc_of_about(400));
        cache.insert("c:k3".to_string(), doc_of_about(400));
        // The first-inserted entry goes, the later two stay.
        assert_eq!(cache.len(), 2);
        assert!(cache.get("c:k1").is_none());
        assert!(cache.get("c:k2").is_some());
        assert!(cache.get("c:k3").is_some());
        assert_eq!(cache.current_size_bytes(), 800);
        assert!(cache.current_size_bytes() <= cache.max_size_bytes());
    }

    #[test]
    fn oversized_value_is_skipped_without_evicting() {
        let mut cache = QueryCache::new(500);
        cache.insert("c:a".to_string(), doc_of_about(300));
        cache.insert("c:huge".to_string(), doc_of_about(501));
        assert!(cache.get("c:huge").is_none());
        assert!(cache.get("c:a").is_some());
        assert_eq!(cache.current_size_bytes(), 300);
    }

    #[test]
    fn reinsert_refreshes_queue_position() {
        let mut cache = QueryCache::new(1000);
        cache.insert("c:k1".to_string(), doc_of_about(400));
        cache.insert("c:k2".to_string(), doc_of_about(400));
        // k1 moves to the back of the queue...
        cache.insert("c:k1".to_string(), doc_of_about(400));
        // ...so the next eviction takes k2.
        cache.insert("c:k3".to_string(), doc_of_about(400));
        assert!(cache.get("c:k1").is_some());
        assert!(cache.get("c:k2").is_none());
        assert!(cache.get("c:k3").is_some());
    }

    #[test]
    fn remove_collection_only_touches_prefix() {
        let mut cache = QueryCache::new(10_000);
        cache.insert("rooms:a".to_string(), doc_of_about(100));
        cache.insert("rooms:b".to_string(), doc_of_about(100));
        cache.insert("users:a".to_string(), doc_of_about(100));
        let (removed, bytes) = cache.remove_collection("rooms");
        assert_eq!(removed, 2);
        assert_eq!(bytes, 200);
        assert_eq!(cache.len(), 1);
        assert!(cache.get("users:a").is_some());
        assert_eq!(cache.current_size_bytes(), resident_sum(&cache));
    }

    #[test]
    fn negative_results_are_cached() {
        let mut cache = QueryCache::new(1000);
        cache.insert("c:missing".to_string(), None);
        let entry = cache.get("c:missing").expect("entry");
        assert!(entry.value.is_none());
        assert_eq!(entry.size_bytes, 4);
    }

    #[test]
    fn clear_resets_size() {
        let mut cache = QueryCache::new(1000);
        cache.insert("c:a".to_string(), doc_of_about(100));
        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.current_size_bytes(), 0);
    }
}
