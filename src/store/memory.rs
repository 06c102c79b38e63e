//! In-memory store implementations for tests and single-process embedding.

use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{Document, DocumentStore, KeyKind, KeyValueStore};

#[derive(Clone, Debug)]
enum StoredValue {
    Str(String),
    Hash(HashMap<String, String>),
}

#[derive(Clone, Debug)]
struct Entry {
    value: StoredValue,
    expires_at: Option<DateTime<Utc>>,
}

impl Entry {
    fn expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// Volatile store backed by a mutex-guarded map. Expiry is enforced
/// lazily on access, which is enough for the TTL semantics the flows
/// rely on.
#[derive(Debug, Default)]
pub struct MemoryKeyValueStore {
    entries: Mutex<HashMap<String, Entry>>,
}

impl MemoryKeyValueStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop a key as if its TTL had elapsed. Test aid.
    pub async fn force_expire(&self, key: &str) {
        self.entries.lock().await.remove(key);
    }

    fn purge(entries: &mut HashMap<String, Entry>, key: &str) {
        let now = Utc::now();
        if entries.get(key).is_some_and(|entry| entry.expired(now)) {
            entries.remove(key);
        }
    }
}

#[async_trait]
impl KeyValueStore for MemoryKeyValueStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut entries = self.entries.lock().await;
        Self::purge(&mut entries, key);
        Ok(entries.get(key).and_then(|entry| match &entry.value {
            StoredValue::Str(value) => Some(value.clone()),
            StoredValue::Hash(_) => None,
        }))
    }

    async fn set_ex(&self, key: &str, value: &str, ttl_seconds: i64) -> Result<()> {
        let mut entries = self.entries.lock().await;
        entries.insert(
            key.to_string(),
            Entry {
                value: StoredValue::Str(value.to_string()),
                expires_at: Some(Utc::now() + Duration::seconds(ttl_seconds)),
            },
        );
        Ok(())
    }

    async fn incr(&self, key: &str) -> Result<i64> {
        let mut entries = self.entries.lock().await;
        Self::purge(&mut entries, key);
        let entry = entries.entry(key.to_string()).or_insert(Entry {
            value: StoredValue::Str("0".to_string()),
            expires_at: None,
        });
        let StoredValue::Str(value) = &mut entry.value else {
            anyhow::bail!("INCR on non-string key {key}");
        };
        let current: i64 = value.parse().unwrap_or(0);
        let next = current + 1;
        *value = next.to_string();
        Ok(next)
    }

    async fn expire(&self, key: &str, ttl_seconds: i64) -> Result<()> {
        let mut entries = self.entries.lock().await;
        Self::purge(&mut entries, key);
        if let Some(entry) = entries.get_mut(key) {
            entry.expires_at = Some(Utc::now() + Duration::seconds(ttl_seconds));
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let mut entries = self.entries.lock().await;
        Self::purge(&mut entries, key);
        Ok(entries.remove(key).is_some())
    }

    async fn scan_keys(&self, pattern: &str) -> Result<Vec<String>> {
        let entries = self.entries.lock().await;
        let now = Utc::now();
        let matches = |key: &str| match pattern.strip_suffix('*') {
            Some(prefix) => key.starts_with(prefix),
            None => key == pattern,
        };
        Ok(entries
            .iter()
            .filter(|(key, entry)| matches(key) && !entry.expired(now))
            .map(|(key, _)| key.clone())
            .collect())
    }

    async fn hset(&self, key: &str, fields: &[(&str, String)]) -> Result<()> {
        let mut entries = self.entries.lock().await;
        Self::purge(&mut entries, key);
        let entry = entries.entry(key.to_string()).or_insert(Entry {
            value: StoredValue::Hash(HashMap::new()),
            expires_at: None,
        });
        let StoredValue::Hash(hash) = &mut entry.value else {
            anyhow::bail!("HSET on non-hash key {key}");
        };
        for (field, value) in fields {
            hash.insert((*field).to_string(), value.clone());
        }
        Ok(())
    }

    async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>> {
        let mut entries = self.entries.lock().await;
        Self::purge(&mut entries, key);
        Ok(entries
            .get(key)
            .and_then(|entry| match &entry.value {
                StoredValue::Hash(hash) => Some(hash.clone()),
                StoredValue::Str(_) => None,
            })
            .unwrap_or_default())
    }

    async fn ttl(&self, key: &str) -> Result<i64> {
        let mut entries = self.entries.lock().await;
        Self::purge(&mut entries, key);
        match entries.get(key) {
            None => Ok(-2),
            Some(Entry {
                expires_at: None, ..
            }) => Ok(-1),
            Some(Entry {
                expires_at: Some(at),
                ..
            }) => Ok((*at - Utc::now()).num_seconds().max(0)),
        }
    }

    async fn key_type(&self, key: &str) -> Result<KeyKind> {
        let mut entries = self.entries.lock().await;
        Self::purge(&mut entries, key);
        Ok(match entries.get(key) {
            None => KeyKind::None,
            Some(entry) => match entry.value {
                StoredValue::Str(_) => KeyKind::Str,
                StoredValue::Hash(_) => KeyKind::Hash,
            },
        })
    }
}

/// Document store backed by per-collection vectors. Filters match by
/// exact field equality, updates merge fields, which is all the auth
/// flows need.
#[derive(Debug, Default)]
pub struct MemoryDocumentStore {
    collections: Mutex<HashMap<String, Vec<Document>>>,
}

impl MemoryDocumentStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn matches(document: &Document, filter: &Document) -> bool {
        filter
            .iter()
            .all(|(key, value)| document.get(key) == Some(value))
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn find_one(&self, collection: &str, filter: &Document) -> Result<Option<Document>> {
        let collections = self.collections.lock().await;
        Ok(collections
            .get(collection)
            .and_then(|documents| {
                documents
                    .iter()
                    .find(|document| Self::matches(document, filter))
            })
            .cloned())
    }

    async fn find(&self, collection: &str, filter: &Document) -> Result<Vec<Document>> {
        let collections = self.collections.lock().await;
        Ok(collections
            .get(collection)
            .map(|documents| {
                documents
                    .iter()
                    .filter(|document| Self::matches(document, filter))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn insert_one(&self, collection: &str, mut document: Document) -> Result<String> {
        let id = match document.get("_id").and_then(serde_json::Value::as_str) {
            Some(id) => id.to_string(),
            None => {
                let id = Uuid::new_v4().to_string();
                document.insert("_id".to_string(), serde_json::Value::String(id.clone()));
                id
            }
        };
        let mut collections = self.collections.lock().await;
        collections
            .entry(collection.to_string())
            .or_default()
            .push(document);
        Ok(id)
    }

    async fn update_one(
        &self,
        collection: &str,
        filter: &Document,
        fields: &Document,
    ) -> Result<u64> {
        let mut collections = self.collections.lock().await;
        let Some(documents) = collections.get_mut(collection) else {
            return Ok(0);
        };
        let Some(document) = documents
            .iter_mut()
            .find(|document| Self::matches(document, filter))
        else {
            return Ok(0);
        };
        for (key, value) in fields {
            document.insert(key.clone(), value.clone());
        }
        Ok(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::doc;
    use serde_json::json;

    #[tokio::test]
    async fn set_get_delete_round_trip() -> Result<()> {
        let store = MemoryKeyValueStore::new();
        store.set_ex("k", "v", 60).await?;
        assert_eq!(store.get("k").await?, Some("v".to_string()));
        assert!(store.delete("k").await?);
        assert!(!store.delete("k").await?);
        assert_eq!(store.get("k").await?, None);
        Ok(())
    }

    #[tokio::test]
    async fn forced_expiry_hides_key() -> Result<()> {
        let store = MemoryKeyValueStore::new();
        store.set_ex("k", "v", 60).await?;
        store.force_expire("k").await;
        assert_eq!(store.get("k").await?, None);
        assert_eq!(store.ttl("k").await?, -2);
        Ok(())
    }

    #[tokio::test]
    async fn incr_counts_from_one() -> Result<()> {
        let store = MemoryKeyValueStore::new();
        assert_eq!(store.incr("counter").await?, 1);
        assert_eq!(store.incr("counter").await?, 2);
        // No TTL until expire is called.
        assert_eq!(store.ttl("counter").await?, -1);
        store.expire("counter", 60).await?;
        assert!(store.ttl("counter").await? > 0);
        Ok(())
    }

    #[tokio::test]
    async fn scan_keys_matches_prefix() -> Result<()> {
        let store = MemoryKeyValueStore::new();
        store.set_ex("sessions:u1:a", "x", 60).await?;
        store.set_ex("sessions:u1:b", "x", 60).await?;
        store.set_ex("sessions:u2:a", "x", 60).await?;
        let mut keys = store.scan_keys("sessions:u1:*").await?;
        keys.sort();
        assert_eq!(keys, vec!["sessions:u1:a", "sessions:u1:b"]);
        Ok(())
    }

    #[tokio::test]
    async fn hset_merges_and_reports_kind() -> Result<()> {
        let store = MemoryKeyValueStore::new();
        store.hset("h", &[("a", "1".to_string())]).await?;
        store
            .hset("h", &[("b", "2".to_string()), ("a", "3".to_string())])
            .await?;
        let hash = store.hgetall("h").await?;
        assert_eq!(hash.get("a"), Some(&"3".to_string()));
        assert_eq!(hash.get("b"), Some(&"2".to_string()));
        assert_eq!(store.key_type("h").await?, KeyKind::Hash);
        assert_eq!(store.key_type("missing").await?, KeyKind::None);
        Ok(())
    }

    #[tokio::test]
    async fn documents_filter_and_update() -> Result<()> {
        let store = MemoryDocumentStore::new();
        let id = store
            .insert_one("users", doc(&[("phone", json!("+989121234567"))]))
            .await?;
        let found = store
            .find_one("users", &doc(&[("phone", json!("+989121234567"))]))
            .await?
            .ok_or_else(|| anyhow::anyhow!("missing document"))?;
        assert_eq!(found.get("_id"), Some(&json!(id)));

        let modified = store
            .update_one(
                "users",
                &doc(&[("_id", json!(id))]),
                &doc(&[("status", json!("active"))]),
            )
            .await?;
        assert_eq!(modified, 1);
        let found = store
            .find_one("users", &doc(&[("_id", json!(id))]))
            .await?
            .ok_or_else(|| anyhow::anyhow!("missing document"))?;
        assert_eq!(found.get("status"), Some(&json!("active")));
        Ok(())
    }

    #[tokio::test]
    async fn update_missing_document_modifies_nothing() -> Result<()> {
        let store = MemoryDocumentStore::new();
        let modified = store
            .update_one(
                "users",
                &doc(&[("_id", json!("nope"))]),
                &doc(&[("status", json!("active"))]),
            )
            .await?;
        assert_eq!(modified, 0);
        Ok(())
    }
}
