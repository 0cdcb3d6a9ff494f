//! The document store.
//!
//! One JSON object maps collection names to arrays of records. The whole
//! document lives in memory behind a single writer lock; every successful
//! mutation writes the document back to disk before the lock is released, so
//! no request can observe a state that was never persisted.

use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;

/// Errors raised by the document store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("failed to read document {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("document {path} is not valid JSON: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("document root must be a JSON object")]
    NotAnObject,

    #[error("failed to persist document: {0}")]
    Persist(#[from] std::io::Error),

    #[error("failed to serialize document: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// In-memory document with synchronous write-back persistence.
pub struct Store {
    path: PathBuf,
    document: RwLock<Map<String, Value>>,
}

impl Store {
    /// Load the document from disk. Errors here are fatal at startup.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let raw = tokio::fs::read(&path).await.map_err(|source| StoreError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let value: Value =
            serde_json::from_slice(&raw).map_err(|source| StoreError::Parse {
                path: path.display().to_string(),
                source,
            })?;
        let document = match value {
            Value::Object(map) => map,
            _ => return Err(StoreError::NotAnObject),
        };

        Ok(Self {
            path,
            document: RwLock::new(document),
        })
    }

    /// Names of the collections in the document.
    pub async fn collections(&self) -> Vec<String> {
        self.document.read().await.keys().cloned().collect()
    }

    /// Snapshot of the full document.
    pub async fn document(&self) -> Map<String, Value> {
        self.document.read().await.clone()
    }

    /// All records of a collection, or `None` if the collection is unknown.
    pub async fn list(&self, collection: &str) -> Option<Vec<Value>> {
        let doc = self.document.read().await;
        doc.get(collection).and_then(Value::as_array).cloned()
    }

    /// One record by id, or `None` if the collection or the id is unknown.
    pub async fn find(&self, collection: &str, id: &str) -> Option<Value> {
        let doc = self.document.read().await;
        doc.get(collection)
            .and_then(Value::as_array)?
            .iter()
            .find(|record| id_matches(record, id))
            .cloned()
    }

    /// Append a record, assigning `id = record-count + 1`.
    ///
    /// The id scheme matches the original deployment: it reuses ids after
    /// deletions. Returns `None` for an unknown collection.
    pub async fn insert(
        &self,
        collection: &str,
        mut record: Map<String, Value>,
    ) -> Result<Option<Value>, StoreError> {
        let mut doc = self.document.write().await;
        let records = match doc.get_mut(collection).and_then(Value::as_array_mut) {
            Some(records) => records,
            None => return Ok(None),
        };

        record.insert("id".to_string(), Value::from(records.len() as i64 + 1));
        let stored = Value::Object(record);
        records.push(stored.clone());

        self.persist(&doc).await?;
        Ok(Some(stored))
    }

    /// Replace a record wholesale (PUT). The stored `id` and `createdAt`
    /// survive the replacement. Returns `None` on a missing collection or id.
    pub async fn replace(
        &self,
        collection: &str,
        id: &str,
        mut record: Map<String, Value>,
    ) -> Result<Option<Value>, StoreError> {
        let mut doc = self.document.write().await;
        let records = match doc.get_mut(collection).and_then(Value::as_array_mut) {
            Some(records) => records,
            None => return Ok(None),
        };
        let existing = match records.iter_mut().find(|record| id_matches(record, id)) {
            Some(existing) => existing,
            None => return Ok(None),
        };

        if let Some(stored_id) = existing.get("id") {
            record.insert("id".to_string(), stored_id.clone());
        }
        if let Some(created_at) = existing.get("createdAt") {
            record.insert("createdAt".to_string(), created_at.clone());
        }
        *existing = Value::Object(record);
        let updated = existing.clone();

        self.persist(&doc).await?;
        Ok(Some(updated))
    }

    /// Merge fields into a record (PATCH). `id` is never overwritten.
    /// Returns `None` on a missing collection or id.
    pub async fn merge(
        &self,
        collection: &str,
        id: &str,
        patch: Map<String, Value>,
    ) -> Result<Option<Value>, StoreError> {
        let mut doc = self.document.write().await;
        let records = match doc.get_mut(collection).and_then(Value::as_array_mut) {
            Some(records) => records,
            None => return Ok(None),
        };
        let existing = match records
            .iter_mut()
            .find(|record| id_matches(record, id))
            .and_then(Value::as_object_mut)
        {
            Some(existing) => existing,
            None => return Ok(None),
        };

        for (key, value) in patch {
            if key != "id" {
                existing.insert(key, value);
            }
        }
        let updated = Value::Object(existing.clone());

        self.persist(&doc).await?;
        Ok(Some(updated))
    }

    /// Remove a record. Returns the removed record, or `None` on a miss.
    pub async fn remove(
        &self,
        collection: &str,
        id: &str,
    ) -> Result<Option<Value>, StoreError> {
        let mut doc = self.document.write().await;
        let records = match doc.get_mut(collection).and_then(Value::as_array_mut) {
            Some(records) => records,
            None => return Ok(None),
        };
        let position = match records.iter().position(|record| id_matches(record, id)) {
            Some(position) => position,
            None => return Ok(None),
        };
        let removed = records.remove(position);

        self.persist(&doc).await?;
        Ok(Some(removed))
    }

    /// Write the document back to disk. Called with the write guard held so
    /// the on-disk file always reflects a state the lock owner produced.
    async fn persist(&self, document: &Map<String, Value>) -> Result<(), StoreError> {
        let json = serde_json::to_vec_pretty(document)?;
        tokio::fs::write(&self.path, json).await?;
        Ok(())
    }
}

/// Compare a record's `id` field against a path segment. Numeric and string
/// ids both match their decimal representation.
fn id_matches(record: &Value, id: &str) -> bool {
    match record.get("id") {
        Some(Value::Number(n)) => n.to_string() == id,
        Some(Value::String(s)) => s == id,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn seeded_store(dir: &tempfile::TempDir) -> Store {
        let path = dir.path().join("db.json");
        let doc = json!({
            "posts": [
                { "id": 1, "title": "first" },
                { "id": 2, "title": "second" }
            ],
            "comments": []
        });
        tokio::fs::write(&path, serde_json::to_vec_pretty(&doc).unwrap())
            .await
            .unwrap();
        Store::load(&path).await.unwrap()
    }

    #[tokio::test]
    async fn load_rejects_non_object_document() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("db.json");
        tokio::fs::write(&path, b"[1, 2, 3]").await.unwrap();
        assert!(matches!(
            Store::load(&path).await,
            Err(StoreError::NotAnObject)
        ));
    }

    #[tokio::test]
    async fn load_fails_on_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            Store::load(dir.path().join("missing.json")).await,
            Err(StoreError::Read { .. })
        ));
    }

    #[tokio::test]
    async fn insert_assigns_sequential_ids() {
        let dir = tempfile::tempdir().unwrap();
        let store = seeded_store(&dir).await;

        let mut record = Map::new();
        record.insert("title".to_string(), json!("third"));
        let stored = store.insert("posts", record).await.unwrap().unwrap();
        assert_eq!(stored["id"], json!(3));

        let mut record = Map::new();
        record.insert("title".to_string(), json!("fourth"));
        let stored = store.insert("posts", record).await.unwrap().unwrap();
        assert_eq!(stored["id"], json!(4));
    }

    #[tokio::test]
    async fn insert_into_unknown_collection_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = seeded_store(&dir).await;
        let result = store.insert("nope", Map::new()).await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn find_matches_numeric_and_string_ids() {
        let dir = tempfile::tempdir().unwrap();
        let store = seeded_store(&dir).await;
        assert!(store.find("posts", "1").await.is_some());
        assert!(store.find("posts", "99").await.is_none());
        assert!(store.find("nope", "1").await.is_none());
    }

    #[tokio::test]
    async fn replace_keeps_id_and_created_at() {
        let dir = tempfile::tempdir().unwrap();
        let store = seeded_store(&dir).await;

        let mut patch = Map::new();
        patch.insert("createdAt".to_string(), json!(1000));
        store.merge("posts", "1", patch).await.unwrap().unwrap();

        let mut replacement = Map::new();
        replacement.insert("title".to_string(), json!("rewritten"));
        replacement.insert("createdAt".to_string(), json!(9999));
        let updated = store
            .replace("posts", "1", replacement)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(updated["id"], json!(1));
        assert_eq!(updated["createdAt"], json!(1000));
        assert_eq!(updated["title"], json!("rewritten"));
    }

    #[tokio::test]
    async fn merge_never_overwrites_id() {
        let dir = tempfile::tempdir().unwrap();
        let store = seeded_store(&dir).await;

        let mut patch = Map::new();
        patch.insert("id".to_string(), json!(42));
        patch.insert("title".to_string(), json!("patched"));
        let updated = store.merge("posts", "2", patch).await.unwrap().unwrap();

        assert_eq!(updated["id"], json!(2));
        assert_eq!(updated["title"], json!("patched"));
    }

    #[tokio::test]
    async fn remove_deletes_and_reports_misses() {
        let dir = tempfile::tempdir().unwrap();
        let store = seeded_store(&dir).await;

        let removed = store.remove("posts", "1").await.unwrap().unwrap();
        assert_eq!(removed["title"], json!("first"));
        assert!(store.remove("posts", "1").await.unwrap().is_none());
        assert_eq!(store.list("posts").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn mutations_are_persisted_to_disk() {
        let dir = tempfile::tempdir().unwrap();
        let store = seeded_store(&dir).await;

        let mut record = Map::new();
        record.insert("title".to_string(), json!("durable"));
        store.insert("posts", record).await.unwrap().unwrap();

        // A fresh load sees the mutation
        let reloaded = Store::load(dir.path().join("db.json")).await.unwrap();
        assert_eq!(reloaded.list("posts").await.unwrap().len(), 3);
    }
}
