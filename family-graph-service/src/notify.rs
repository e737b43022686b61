//! Fire-and-forget notification collaborator.
//!
//! Delivery transport lives outside this service. The default notifier only
//! logs; with `FAMILY_GRAPH_NOTIFY_URL` set, events are POSTed as JSON from a
//! detached task and delivery failures are logged, never surfaced.

use serde::Serialize;
use std::sync::Arc;

use crate::config::Config;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum NotificationEvent {
    InviteCreated {
        link_id: i64,
        token: String,
        tree_id: String,
        person_id: i64,
        requester: String,
        target_user_id: Option<String>,
        target_email: Option<String>,
    },
    InviteApproved {
        link_id: i64,
        tree_id: String,
        requester: String,
        approver: String,
    },
    InviteRejected {
        link_id: i64,
        tree_id: String,
        requester: String,
        rejected_by: String,
    },
}

impl NotificationEvent {
    pub fn name(&self) -> &'static str {
        match self {
            NotificationEvent::InviteCreated { .. } => "invite_created",
            NotificationEvent::InviteApproved { .. } => "invite_approved",
            NotificationEvent::InviteRejected { .. } => "invite_rejected",
        }
    }

    /// Account or address the event is meant for
    pub fn recipient(&self) -> Option<&str> {
        match self {
            NotificationEvent::InviteCreated {
                target_user_id,
                target_email,
                ..
            } => target_user_id.as_deref().or(target_email.as_deref()),
            NotificationEvent::InviteApproved { requester, .. }
            | NotificationEvent::InviteRejected { requester, .. } => Some(requester),
        }
    }
}

pub trait Notifier: Send + Sync {
    fn notify(&self, event: NotificationEvent);
}

pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, event: NotificationEvent) {
        log::info!(
            "[NOTIFY] {} -> {}",
            event.name(),
            event.recipient().unwrap_or("<nobody>")
        );
    }
}

pub struct WebhookNotifier {
    url: String,
    client: reqwest::Client,
}

impl WebhookNotifier {
    pub fn new(url: &str) -> Self {
        Self {
            url: url.trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }
}

impl Notifier for WebhookNotifier {
    fn notify(&self, event: NotificationEvent) {
        let handle = match tokio::runtime::Handle::try_current() {
            Ok(h) => h,
            Err(_) => {
                log::warn!("[NOTIFY] No runtime available, dropping {}", event.name());
                return;
            }
        };
        let client = self.client.clone();
        let url = self.url.clone();
        handle.spawn(async move {
            match client.post(&url).json(&event).send().await {
                Ok(resp) if resp.status().is_success() => {
                    log::debug!("[NOTIFY] Delivered {}", event.name());
                }
                Ok(resp) => {
                    log::warn!("[NOTIFY] {} rejected with HTTP {}", event.name(), resp.status());
                }
                Err(e) => {
                    log::warn!("[NOTIFY] Failed to deliver {}: {}", event.name(), e);
                }
            }
        });
    }
}

pub fn from_config(config: &Config) -> Arc<dyn Notifier> {
    match &config.notify_url {
        Some(url) => {
            log::info!("Notifications will be posted to {}", url);
            Arc::new(WebhookNotifier::new(url))
        }
        None => Arc::new(LogNotifier),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serializes_with_tag() {
        let event = NotificationEvent::InviteApproved {
            link_id: 7,
            tree_id: "alice".to_string(),
            requester: "alice".to_string(),
            approver: "bob".to_string(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "invite_approved");
        assert_eq!(json["approver"], "bob");
        assert_eq!(event.recipient(), Some("alice"));
    }

    #[test]
    fn test_invite_recipient_prefers_user_id() {
        let event = NotificationEvent::InviteCreated {
            link_id: 1,
            token: "t".to_string(),
            tree_id: "alice".to_string(),
            person_id: 3,
            requester: "alice".to_string(),
            target_user_id: None,
            target_email: Some("bob@example.com".to_string()),
        };
        assert_eq!(event.recipient(), Some("bob@example.com"));
    }

    #[test]
    fn test_webhook_without_runtime_does_not_panic() {
        let notifier = WebhookNotifier::new("http://127.0.0.1:1/hook");
        notifier.notify(NotificationEvent::InviteRejected {
            link_id: 1,
            tree_id: "alice".to_string(),
            requester: "alice".to_string(),
            rejected_by: "bob".to_string(),
        });
    }
}
