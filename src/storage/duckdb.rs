//! Embedded DuckDB document backend.
//!
//! Documents are stored one table per collection as
//! `(_id VARCHAR PRIMARY KEY, doc VARCHAR NOT NULL)` rows holding the
//! serialized JSON. Filtering and ordering happen in Rust against the
//! decoded documents: the query model is exact-match plus comparison
//! predicates, not SQL. Explicit indexes are kept as a metadata registry in
//! the `collection_indexes` table.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use duckdb::{params, Config, Connection};
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::{DbError, Result};
use crate::query::{FindOptions, Query};
use crate::storage::{
    apply_update, ensure_document_id, normalize_collection, DeleteResult, Document, IndexInfo,
    IndexOptions, StorageBackend, UpdateResult,
};

/// DuckDB-backed document store.
#[derive(Clone)]
pub struct DuckDbBackend {
    conn: Arc<Mutex<Option<Connection>>>,
    connection_string: String,
    #[allow(dead_code)]
    options: HashMap<String, String>,
    initialized: Arc<AtomicBool>,
}

fn quoted(collection: &str) -> String {
    format!("\"{collection}\"")
}

impl DuckDbBackend {
    pub fn new(connection_string: String, options: HashMap<String, String>) -> Self {
        Self {
            conn: Arc::new(Mutex::new(None)),
            connection_string,
            options,
            initialized: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn new_in_memory() -> Self {
        Self::new(":memory:".to_owned(), HashMap::new())
    }

    fn ensure_table(conn: &Connection, collection: &str) -> Result<()> {
        conn.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {} (_id VARCHAR PRIMARY KEY, doc VARCHAR NOT NULL)",
            quoted(collection)
        ))?;
        Ok(())
    }

    /// Decode every row of a collection as `(_id, document)`.
    fn scan(conn: &Connection, collection: &str) -> Result<Vec<(String, Document)>> {
        Self::ensure_table(conn, collection)?;
        let mut stmt = conn.prepare(&format!("SELECT _id, doc FROM {}", quoted(collection)))?;
        let rows = stmt.query_map(params![], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;
        let mut docs = Vec::new();
        for row in rows {
            let (id, raw) = row?;
            docs.push((id, serde_json::from_str(&raw)?));
        }
        Ok(docs)
    }
}

#[async_trait]
impl StorageBackend for DuckDbBackend {
    async fn connect(&self) -> Result<()> {
        let mut guard = self.conn.lock().await;
        if guard.is_some() {
            return Ok(());
        }
        let conn = Connection::open_with_flags(&self.connection_string, Config::default())?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS collection_indexes (
                collection_name VARCHAR NOT NULL,
                index_name VARCHAR NOT NULL,
                fields VARCHAR NOT NULL,
                is_unique BOOLEAN NOT NULL,
                created_at BIGINT NOT NULL,
                PRIMARY KEY (collection_name, index_name)
            );
            "#,
        )?;
        debug!(connection = %self.connection_string, "duckdb backend connected");
        *guard = Some(conn);
        self.initialized.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        let mut guard = self.conn.lock().await;
        self.initialized.store(false, Ordering::SeqCst);
        guard.take();
        Ok(())
    }

    fn initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    fn supports_explicit_indexes(&self) -> bool {
        true
    }

    async fn find(
        &self,
        collection: &str,
        query: &Query,
        options: &FindOptions,
    ) -> Result<Vec<Document>> {
        let collection = normalize_collection(collection);
        let guard = self.conn.lock().await;
        let conn = guard.as_ref().ok_or(DbError::NotConnected)?;
        let mut docs: Vec<Document> = Self::scan(conn, &collection)?
            .into_iter()
            .map(|(_, doc)| doc)
            .filter(|doc| query.matches(doc))
            .collect();
        options.apply(&mut docs);
        Ok(docs)
    }

    async fn find_one(&self, collection: &str, query: &Query) -> Result<Option<Document>> {
        let collection = normalize_collection(collection);
        let guard = self.conn.lock().await;
        let conn = guard.as_ref().ok_or(DbError::NotConnected)?;
        Ok(Self::scan(conn, &collection)?
            .into_iter()
            .map(|(_, doc)| doc)
            .find(|doc| query.matches(doc)))
    }

    async fn create(&self, collection: &str, mut data: Document) -> Result<Document> {
        let collection = normalize_collection(collection);
        ensure_document_id(&mut data);
        let id = data
            .get("_id")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_owned();
        let raw = serde_json::to_string(&data)?;
        let guard = self.conn.lock().await;
        let conn = guard.as_ref().ok_or(DbError::NotConnected)?;
        Self::ensure_table(conn, &collection)?;
        conn.execute(
            &format!("INSERT INTO {} (_id, doc) VALUES (?, ?)", quoted(&collection)),
            params![id, raw],
        )?;
        Ok(data)
    }

    async fn update(
        &self,
        collection: &str,
        query: &Query,
        data: Document,
    ) -> Result<UpdateResult> {
        let collection = normalize_collection(collection);
        let guard = self.conn.lock().await;
        let conn = guard.as_ref().ok_or(DbError::NotConnected)?;
        let matched = Self::scan(conn, &collection)?
            .into_iter()
            .find(|(_, doc)| query.matches(doc));
        let (row_id, mut doc) = match matched {
            Some(found) => found,
            None => return Ok(UpdateResult::default()),
        };
        if !apply_update(&mut doc, &data) {
            return Ok(UpdateResult {
                matched_count: 1,
                modified_count: 0,
            });
        }
        let new_id = doc
            .get("_id")
            .and_then(Value::as_str)
            .unwrap_or(row_id.as_str())
            .to_owned();
        let raw = serde_json::to_string(&doc)?;
        conn.execute(
            &format!(
                "UPDATE {} SET _id = ?, doc = ? WHERE _id = ?",
                quoted(&collection)
            ),
            params![new_id, raw, row_id],
        )?;
        Ok(UpdateResult {
            matched_count: 1,
            modified_count: 1,
        })
    }

    async fn delete(&self, collection: &str, query: &Query) -> Result<DeleteResult> {
        let collection = normalize_collection(collection);
        let guard = self.conn.lock().await;
        let conn = guard.as_ref().ok_or(DbError::NotConnected)?;
        let ids: Vec<String> = Self::scan(conn, &collection)?
            .into_iter()
            .filter(|(_, doc)| query.matches(doc))
            .map(|(id, _)| id)
            .collect();
        let mut stmt =
            conn.prepare(&format!("DELETE FROM {} WHERE _id = ?", quoted(&collection)))?;
        for id in &ids {
            stmt.execute(params![id])?;
        }
        Ok(DeleteResult {
            deleted_count: ids.len() as u64,
        })
    }

    async fn delete_collection(&self, collection: &str) -> Result<()> {
        let collection = normalize_collection(collection);
        let guard = self.conn.lock().await;
        let conn = guard.as_ref().ok_or(DbError::NotConnected)?;
        conn.execute_batch(&format!("DROP TABLE IF EXISTS {}", quoted(&collection)))?;
        conn.execute(
            "DELETE FROM collection_indexes WHERE collection_name = ?",
            params![collection],
        )?;
        Ok(())
    }

    async fn create_collection(&self, collection: &str) -> Result<()> {
        let collection = normalize_collection(collection);
        let guard = self.conn.lock().await;
        let conn = guard.as_ref().ok_or(DbError::NotConnected)?;
        Self::ensure_table(conn, &collection)
    }

    async fn create_index(
        &self,
        collection: &str,
        fields: &[String],
        options: &IndexOptions,
    ) -> Result<()> {
        let collection = normalize_collection(collection);
        let name = options
            .name
            .clone()
            .unwrap_or_else(|| format!("{}_{}_idx", collection, fields.join("_")));
        let fields_json = serde_json::to_string(fields)?;
        let guard = self.conn.lock().await;
        let conn = guard.as_ref().ok_or(DbError::NotConnected)?;
        Self::ensure_table(conn, &collection)?;
        conn.execute(
            "INSERT OR REPLACE INTO collection_indexes \
             (collection_name, index_name, fields, is_unique, created_at) \
             VALUES (?, ?, ?, ?, ?)",
            params![collection, name, fields_json, options.unique, Utc::now().timestamp()],
        )?;
        Ok(())
    }

    async fn list_indexes(&self, collection: &str) -> Result<Vec<IndexInfo>> {
        let collection = normalize_collection(collection);
        let guard = self.conn.lock().await;
        let conn = guard.as_ref().ok_or(DbError::NotConnected)?;
        let mut stmt = conn.prepare(
            "SELECT index_name, fields, is_unique FROM collection_indexes \
             WHERE collection_name = ? ORDER BY index_name",
        )?;
        let rows = stmt.query_map(params![collection], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, bool>(2)?,
            ))
        })?;
        let mut indexes = Vec::new();
        for row in rows {
            let (name, fields_json, unique) = row?;
            indexes.push(IndexInfo {
                name,
                fields: serde_json::from_str(&fields_json)?,
                unique,
            });
        }
        Ok(indexes)
    }
}
