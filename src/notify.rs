//! Notification dispatch seam.
//!
//! Flows report whether a notification went out but never fail because
//! one did not; delivery is someone else's job.

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::warn;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Notification {
    pub receiver_id: String,
    pub receiver_type: String,
    pub template_key: String,
    pub variables: Value,
    pub reference_type: String,
    pub reference_id: String,
    pub language: String,
}

#[async_trait]
pub trait Notifier: Send + Sync {
    /// Returns whether the notification was accepted for delivery.
    async fn send(&self, notification: Notification) -> bool;
}

/// Dispatch a notification, logging a warning on refusal. Returns the
/// `notification_sent` flag flows surface to callers.
pub(crate) async fn dispatch(notifier: &dyn Notifier, notification: Notification) -> bool {
    let template = notification.template_key.clone();
    let receiver = notification.receiver_id.clone();
    let sent = notifier.send(notification).await;
    if !sent {
        warn!(template, receiver, "notification was not accepted for delivery");
    }
    sent
}

/// Records notifications instead of delivering them. Test collaborator.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn sent(&self) -> Vec<Notification> {
        self.sent.lock().await.clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, notification: Notification) -> bool {
        self.sent.lock().await.push(notification);
        true
    }
}

/// Refuses everything. Exercises the degraded-delivery path in tests.
#[derive(Clone, Debug, Default)]
pub struct RefusingNotifier;

#[async_trait]
impl Notifier for RefusingNotifier {
    async fn send(&self, _notification: Notification) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn notification() -> Notification {
        Notification {
            receiver_id: "u1".to_string(),
            receiver_type: "user".to_string(),
            template_key: "otp_requested".to_string(),
            variables: json!({ "code": "123456" }),
            reference_type: "otp".to_string(),
            reference_id: "+989121234567".to_string(),
            language: "fa".to_string(),
        }
    }

    #[tokio::test]
    async fn recording_notifier_captures_sends() {
        let notifier = RecordingNotifier::new();
        assert!(dispatch(&notifier, notification()).await);
        let sent = notifier.sent().await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].template_key, "otp_requested");
    }

    #[tokio::test]
    async fn refusal_is_reported_not_fatal() {
        let notifier = RefusingNotifier;
        assert!(!dispatch(&notifier, notification()).await);
    }
}
