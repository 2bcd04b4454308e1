use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{channel::Channel, notification::Notification};

/// Queue payload for one channel send. The worker treats this as a cache of
/// the notification row: anything here can be re-derived from the entity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationMessage {
    pub notification_id: Uuid,
    pub user_id: Uuid,
    pub channel: Channel,
    pub template_code: String,
    pub recipient: Option<String>,
    pub subject: Option<String>,
    pub rendered_content: String,

    /// Kept for potential re-rendering on retry.
    #[serde(default)]
    pub template_data: HashMap<String, serde_json::Value>,

    #[serde(default)]
    pub retry_count: u32,

    #[serde(default = "default_message_priority")]
    pub priority: u8,
}

fn default_message_priority() -> u8 {
    5
}

impl NotificationMessage {
    /// Rebuild the wire payload from the persisted entity, e.g. when the
    /// reconciliation sweep republishes a row whose original message was
    /// lost.
    pub fn from_notification(notification: &Notification) -> Self {
        let template_data = notification
            .template_data
            .as_ref()
            .and_then(|value| value.as_object())
            .map(|map| map.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default();

        Self {
            notification_id: notification.id,
            user_id: notification.user_id,
            channel: notification.channel,
            template_code: notification.template_code.clone(),
            recipient: notification.recipient.clone(),
            subject: notification.subject.clone(),
            rendered_content: notification.rendered_content.clone(),
            template_data,
            retry_count: notification.retry_count,
            priority: notification.priority,
        }
    }
}
