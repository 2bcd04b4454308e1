use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{channel::Channel, notification::Notification};

/// Append-only snapshot of a terminally failed notification. Created exactly
/// once, in the same transaction as the terminal status update, and never
/// mutated afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeadLetterEntry {
    pub id: Uuid,
    pub notification_id: Uuid,
    pub user_id: Uuid,
    pub channel: Channel,
    pub template_code: String,
    pub recipient: Option<String>,
    pub template_data: Option<serde_json::Value>,
    pub retry_count: u32,
    pub failure_reason: String,
    pub last_error_code: Option<String>,
    pub last_provider_response: Option<String>,
    pub original_created_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl DeadLetterEntry {
    /// Snapshot a notification at the moment it is dead-lettered.
    pub fn from_notification(notification: &Notification, failure_reason: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            notification_id: notification.id,
            user_id: notification.user_id,
            channel: notification.channel,
            template_code: notification.template_code.clone(),
            recipient: notification.recipient.clone(),
            template_data: notification.template_data.clone(),
            retry_count: notification.retry_count,
            failure_reason,
            last_error_code: notification.error_code.clone(),
            last_provider_response: notification.provider_response.clone(),
            original_created_at: notification.created_at,
            created_at: Utc::now(),
        }
    }
}
