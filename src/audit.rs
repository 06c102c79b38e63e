//! Append-only audit trail written to the `audit_logs` collection.

use chrono::Utc;
use serde_json::{Value, json};
use tracing::{Instrument, error};

use crate::store::{Document, DocumentStore};

pub(crate) struct AuditEvent<'a> {
    pub action: &'static str,
    pub actor_id: &'a str,
    pub actor_role: &'a str,
    pub target_id: Option<&'a str>,
    pub client_ip: Option<&'a str>,
    pub detail: Value,
}

/// Record an audit event. Failures are logged and swallowed so a broken
/// audit sink never blocks an auth flow.
pub(crate) async fn record(docs: &dyn DocumentStore, event: AuditEvent<'_>) {
    let mut document = Document::new();
    document.insert("action".to_string(), json!(event.action));
    document.insert("actor_id".to_string(), json!(event.actor_id));
    document.insert("actor_role".to_string(), json!(event.actor_role));
    if let Some(target_id) = event.target_id {
        document.insert("target_id".to_string(), json!(target_id));
    }
    if let Some(client_ip) = event.client_ip {
        document.insert("client_ip".to_string(), json!(client_ip));
    }
    document.insert("detail".to_string(), event.detail);
    document.insert("created_at".to_string(), json!(Utc::now().to_rfc3339()));

    let span = tracing::info_span!(
        "docs.query",
        collection = "audit_logs",
        operation = "insert_one"
    );
    if let Err(err) = docs
        .insert_one("audit_logs", document)
        .instrument(span)
        .await
    {
        error!(action = event.action, "failed to write audit record: {err}");
    }
}

#[cfg(test)]
mod tests {
    use super::{AuditEvent, record};
    use crate::store::memory::MemoryDocumentStore;
    use crate::store::{Document, DocumentStore};
    use serde_json::json;

    #[tokio::test]
    async fn record_appends_document() {
        let docs = MemoryDocumentStore::new();
        record(
            &docs,
            AuditEvent {
                action: "otp.requested",
                actor_id: "+989121234567",
                actor_role: "user",
                target_id: None,
                client_ip: Some("10.0.0.1"),
                detail: json!({ "purpose": "login" }),
            },
        )
        .await;

        let records = docs
            .find("audit_logs", &Document::new())
            .await
            .unwrap_or_default();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].get("action"), Some(&json!("otp.requested")));
        assert_eq!(records[0].get("client_ip"), Some(&json!("10.0.0.1")));
        assert!(records[0].contains_key("created_at"));
    }
}
