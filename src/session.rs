//! Session records: one hash per (user, session) with device metadata.
//!
//! Sessions live at `sessions:{user_id}:{session_id}` and expire with
//! the store TTL. Listing tolerates keys of the wrong kind and records
//! that expired mid-scan; both are skipped, never errors.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use serde::Serialize;
use tracing::debug;

use crate::store::{KeyKind, KeyValueStore};

const UNKNOWN: &str = "unknown";

pub(crate) fn session_key(user_id: &str, session_id: &str) -> String {
    format!("sessions:{user_id}:{session_id}")
}

pub(crate) fn session_pattern(user_id: &str) -> String {
    format!("sessions:{user_id}:*")
}

/// Device and network context captured at session creation.
#[derive(Clone, Debug, Default)]
pub struct SessionMetadata {
    pub ip: Option<String>,
    pub device_name: Option<String>,
    pub device_type: Option<String>,
    pub os: Option<String>,
    pub browser: Option<String>,
    pub user_agent: Option<String>,
    pub location: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionFilter {
    Active,
    All,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SessionRecord {
    pub session_id: String,
    pub ip: String,
    pub device_name: String,
    pub device_type: String,
    pub os: String,
    pub browser: String,
    pub user_agent: String,
    pub location: String,
    pub created_at: String,
    pub last_seen_at: String,
    pub last_refreshed: String,
    pub status: String,
    pub jti: String,
}

impl SessionRecord {
    fn from_fields(session_id: String, fields: &HashMap<String, String>) -> Self {
        let get = |name: &str| {
            fields
                .get(name)
                .cloned()
                .unwrap_or_else(|| UNKNOWN.to_string())
        };
        Self {
            session_id,
            ip: get("ip"),
            device_name: get("device_name"),
            device_type: get("device_type"),
            os: get("os"),
            browser: get("browser"),
            user_agent: get("user_agent"),
            location: get("location"),
            created_at: get("created_at"),
            last_seen_at: get("last_seen_at"),
            last_refreshed: get("last_refreshed"),
            status: get("status"),
            jti: get("jti"),
        }
    }
}

#[derive(Clone)]
pub struct SessionStore {
    kv: Arc<dyn KeyValueStore>,
    ttl_seconds: i64,
}

impl SessionStore {
    #[must_use]
    pub fn new(kv: Arc<dyn KeyValueStore>, ttl_seconds: i64) -> Self {
        Self { kv, ttl_seconds }
    }

    /// Create (or replace) the session hash and start its TTL.
    pub async fn create(
        &self,
        user_id: &str,
        session_id: &str,
        access_jti: &str,
        metadata: &SessionMetadata,
    ) -> Result<()> {
        let key = session_key(user_id, session_id);

        // A key of the wrong kind would poison HSET; clear it first.
        let kind = self.kv.key_type(&key).await.context("session key type lookup failed")?;
        if kind == KeyKind::Str {
            self.kv.delete(&key).await.context("failed to clear conflicting session key")?;
        }

        let now = Utc::now().to_rfc3339();
        let value = |field: &Option<String>| {
            field.clone().unwrap_or_else(|| UNKNOWN.to_string())
        };
        let fields = [
            ("ip", value(&metadata.ip)),
            ("device_name", value(&metadata.device_name)),
            ("device_type", value(&metadata.device_type)),
            ("os", value(&metadata.os)),
            ("browser", value(&metadata.browser)),
            ("user_agent", value(&metadata.user_agent)),
            ("location", value(&metadata.location)),
            ("created_at", now.clone()),
            ("last_seen_at", now.clone()),
            ("last_refreshed", now),
            ("status", "active".to_string()),
            ("jti", access_jti.to_string()),
        ];
        self.kv
            .hset(&key, &fields)
            .await
            .context("failed to write session hash")?;
        self.kv
            .expire(&key, self.ttl_seconds)
            .await
            .context("failed to set session ttl")
    }

    /// Merge updates into an existing session, refresh `last_seen_at`,
    /// and restart the TTL. A vanished session is left vanished.
    pub async fn touch(
        &self,
        user_id: &str,
        session_id: &str,
        updates: &[(&str, String)],
    ) -> Result<()> {
        let key = session_key(user_id, session_id);
        let kind = self.kv.key_type(&key).await.context("session key type lookup failed")?;
        if kind != KeyKind::Hash {
            debug!(user_id, session_id, "touch on missing session, skipping");
            return Ok(());
        }
        let mut fields: Vec<(&str, String)> = updates.to_vec();
        fields.push(("last_seen_at", Utc::now().to_rfc3339()));
        self.kv
            .hset(&key, &fields)
            .await
            .context("failed to update session hash")?;
        self.kv
            .expire(&key, self.ttl_seconds)
            .await
            .context("failed to refresh session ttl")
    }

    pub async fn list(
        &self,
        user_id: &str,
        filter: SessionFilter,
    ) -> Result<Vec<SessionRecord>> {
        let keys = self
            .kv
            .scan_keys(&session_pattern(user_id))
            .await
            .context("failed to scan sessions")?;
        let prefix = session_key(user_id, "");
        let mut records = Vec::new();
        for key in keys {
            if self.kv.key_type(&key).await.context("session key type lookup failed")?
                != KeyKind::Hash
            {
                debug!(key, "skipping non-hash key in session namespace");
                continue;
            }
            if self.kv.ttl(&key).await.context("session ttl lookup failed")? == -2 {
                continue;
            }
            let fields = self.kv.hgetall(&key).await.context("failed to read session")?;
            let session_id = key.strip_prefix(&prefix).unwrap_or(&key).to_string();
            let record = SessionRecord::from_fields(session_id, &fields);
            if filter == SessionFilter::Active && record.status != "active" {
                continue;
            }
            records.push(record);
        }
        records.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(records)
    }

    /// Idempotent; deleting a missing session is fine.
    pub async fn delete(&self, user_id: &str, session_id: &str) -> Result<bool> {
        self.kv
            .delete(&session_key(user_id, session_id))
            .await
            .context("failed to delete session")
    }

    pub async fn delete_all(&self, user_id: &str) -> Result<usize> {
        let keys = self
            .kv
            .scan_keys(&session_pattern(user_id))
            .await
            .context("failed to scan sessions")?;
        let mut deleted = 0;
        for key in keys {
            if self.kv.delete(&key).await.context("failed to delete session")? {
                deleted += 1;
            }
        }
        Ok(deleted)
    }

    /// Drop sessions that never became (or are no longer) active.
    /// Runs before a fresh login issues its session.
    pub async fn delete_inactive(&self, user_id: &str) -> Result<usize> {
        let records = self.list(user_id, SessionFilter::All).await?;
        let mut deleted = 0;
        for record in records {
            if record.status != "active" && self.delete(user_id, &record.session_id).await? {
                deleted += 1;
            }
        }
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryKeyValueStore;

    fn store() -> (Arc<MemoryKeyValueStore>, SessionStore) {
        let kv = Arc::new(MemoryKeyValueStore::new());
        let sessions = SessionStore::new(kv.clone(), 86400);
        (kv, sessions)
    }

    fn metadata(ip: &str) -> SessionMetadata {
        SessionMetadata {
            ip: Some(ip.to_string()),
            device_name: Some("Pixel 8".to_string()),
            ..SessionMetadata::default()
        }
    }

    #[tokio::test]
    async fn create_and_list_round_trip() -> Result<()> {
        let (_kv, sessions) = store();
        sessions.create("u1", "s1", "jti-1", &metadata("10.0.0.1")).await?;
        let records = sessions.list("u1", SessionFilter::Active).await?;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].session_id, "s1");
        assert_eq!(records[0].ip, "10.0.0.1");
        assert_eq!(records[0].device_name, "Pixel 8");
        assert_eq!(records[0].os, "unknown");
        assert_eq!(records[0].status, "active");
        assert_eq!(records[0].jti, "jti-1");
        Ok(())
    }

    #[tokio::test]
    async fn listing_skips_foreign_key_kinds() -> Result<()> {
        let (kv, sessions) = store();
        sessions.create("u1", "s1", "jti-1", &metadata("10.0.0.1")).await?;
        kv.set_ex("sessions:u1:stray", "not-a-hash", 60).await?;
        let records = sessions.list("u1", SessionFilter::All).await?;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].session_id, "s1");
        Ok(())
    }

    #[tokio::test]
    async fn touch_preserves_unset_fields() -> Result<()> {
        let (kv, sessions) = store();
        sessions.create("u1", "s1", "jti-1", &metadata("10.0.0.1")).await?;
        sessions
            .touch("u1", "s1", &[("last_refreshed", "later".to_string())])
            .await?;
        let fields = kv.hgetall("sessions:u1:s1").await?;
        assert_eq!(fields.get("device_name"), Some(&"Pixel 8".to_string()));
        assert_eq!(fields.get("last_refreshed"), Some(&"later".to_string()));
        Ok(())
    }

    #[tokio::test]
    async fn touch_does_not_resurrect_missing_session() -> Result<()> {
        let (kv, sessions) = store();
        sessions
            .touch("u1", "gone", &[("ip", "10.0.0.2".to_string())])
            .await?;
        assert!(kv.hgetall("sessions:u1:gone").await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn delete_inactive_leaves_active_sessions() -> Result<()> {
        let (kv, sessions) = store();
        sessions.create("u1", "s1", "jti-1", &metadata("10.0.0.1")).await?;
        sessions.create("u1", "s2", "jti-2", &metadata("10.0.0.2")).await?;
        kv.hset("sessions:u1:s2", &[("status", "revoked".to_string())])
            .await?;

        let deleted = sessions.delete_inactive("u1").await?;
        assert_eq!(deleted, 1);
        let records = sessions.list("u1", SessionFilter::All).await?;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].session_id, "s1");
        Ok(())
    }

    #[tokio::test]
    async fn delete_is_idempotent() -> Result<()> {
        let (_kv, sessions) = store();
        sessions.create("u1", "s1", "jti-1", &metadata("10.0.0.1")).await?;
        assert!(sessions.delete("u1", "s1").await?);
        assert!(!sessions.delete("u1", "s1").await?);
        Ok(())
    }
}
