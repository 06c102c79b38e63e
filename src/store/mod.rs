//! Infrastructure seams: key/value store and document store.
//!
//! Auth flows never talk to a concrete database. They receive trait
//! handles at construction time, which keeps the core embeddable and
//! lets tests run against the in-memory implementations in
//! [`memory`]. A store outage is an error at the call site; flows
//! deny the request rather than fall back to process-local state.

pub mod memory;

use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;

/// A stored document, as found in `users`, `vendors`, and friends.
pub type Document = serde_json::Map<String, serde_json::Value>;

/// What a key currently holds. Mirrors the `TYPE` command of the
/// original volatile store: sessions are hashes, everything else is a
/// plain string.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KeyKind {
    Str,
    Hash,
    None,
}

/// Volatile store with per-key expiry. Counters, OTP state, token
/// markers, blacklist entries, and session hashes all live here.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Set `key` to `value` with a TTL. Overwrites any previous value
    /// and kind.
    async fn set_ex(&self, key: &str, value: &str, ttl_seconds: i64) -> Result<()>;

    /// Increment the integer at `key`, creating it at 1. Does not touch
    /// the TTL.
    async fn incr(&self, key: &str) -> Result<i64>;

    async fn expire(&self, key: &str, ttl_seconds: i64) -> Result<()>;

    /// Returns whether the key existed.
    async fn delete(&self, key: &str) -> Result<bool>;

    /// List keys matching `pattern`. Only literal patterns and a
    /// trailing `*` wildcard are supported.
    async fn scan_keys(&self, pattern: &str) -> Result<Vec<String>>;

    /// Merge fields into the hash at `key`, creating it if absent.
    async fn hset(&self, key: &str, fields: &[(&str, String)]) -> Result<()>;

    async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>>;

    /// Remaining TTL in seconds: `-2` if the key does not exist, `-1`
    /// if it has no expiry.
    async fn ttl(&self, key: &str) -> Result<i64>;

    async fn key_type(&self, key: &str) -> Result<KeyKind>;
}

/// Durable document collections: identities, categories, audit trail.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// First document matching every field of `filter` exactly.
    async fn find_one(&self, collection: &str, filter: &Document) -> Result<Option<Document>>;

    async fn find(&self, collection: &str, filter: &Document) -> Result<Vec<Document>>;

    /// Insert a document, assigning `_id` when absent. Returns the id.
    async fn insert_one(&self, collection: &str, document: Document) -> Result<String>;

    /// Merge `fields` into the first matching document. Returns the
    /// number of documents modified (0 or 1).
    async fn update_one(
        &self,
        collection: &str,
        filter: &Document,
        fields: &Document,
    ) -> Result<u64>;
}

/// Convenience for building filters and update documents.
#[must_use]
pub fn doc(fields: &[(&str, serde_json::Value)]) -> Document {
    fields
        .iter()
        .map(|(key, value)| ((*key).to_string(), value.clone()))
        .collect()
}
