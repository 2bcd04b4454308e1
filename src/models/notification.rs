use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result};
use uuid::Uuid;

use crate::models::channel::Channel;

/// Lifecycle states of a notification. DELIVERED, FAILED_PERMANENT and
/// FAILED_MAX_RETRY are terminal and immutable once reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationStatus {
    Pending,
    Processing,
    Retry,
    Delivered,
    FailedPermanent,
    FailedMaxRetry,
}

impl NotificationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationStatus::Pending => "PENDING",
            NotificationStatus::Processing => "PROCESSING",
            NotificationStatus::Retry => "RETRY",
            NotificationStatus::Delivered => "DELIVERED",
            NotificationStatus::FailedPermanent => "FAILED_PERMANENT",
            NotificationStatus::FailedMaxRetry => "FAILED_MAX_RETRY",
        }
    }

    pub fn from_str_value(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(NotificationStatus::Pending),
            "PROCESSING" => Some(NotificationStatus::Processing),
            "RETRY" => Some(NotificationStatus::Retry),
            "DELIVERED" => Some(NotificationStatus::Delivered),
            "FAILED_PERMANENT" => Some(NotificationStatus::FailedPermanent),
            "FAILED_MAX_RETRY" => Some(NotificationStatus::FailedMaxRetry),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            NotificationStatus::Delivered
                | NotificationStatus::FailedPermanent
                | NotificationStatus::FailedMaxRetry
        )
    }
}

impl Display for NotificationStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        write!(f, "{}", self.as_str())
    }
}

/// One persisted notification attempt: one row per requested channel, with
/// the full audit trail of its delivery lifecycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub user_id: Uuid,
    pub channel: Channel,
    pub status: NotificationStatus,
    pub template_code: String,

    /// Recipient address (email, phone number, push token). None for IN_APP.
    pub recipient: Option<String>,
    pub subject: Option<String>,

    /// Content rendered at creation time, stored for audit and resend.
    pub rendered_content: String,

    /// Original template data as JSON, for audit and re-derivation of the
    /// queue message.
    pub template_data: Option<serde_json::Value>,
    pub metadata: Option<serde_json::Value>,

    pub retry_count: u32,
    pub error_message: Option<String>,
    pub error_code: Option<String>,
    pub provider_response: Option<String>,
    pub external_id: Option<String>,

    /// IN_APP read tracking.
    pub is_read: bool,
    pub read_at: Option<DateTime<Utc>>,

    pub priority: u8,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub sent_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub failed_at: Option<DateTime<Utc>>,

    /// Set iff status is RETRY.
    pub next_retry_at: Option<DateTime<Utc>>,
}

impl Notification {
    pub fn new(
        user_id: Uuid,
        channel: Channel,
        template_code: String,
        recipient: Option<String>,
        subject: Option<String>,
        rendered_content: String,
        template_data: Option<serde_json::Value>,
        metadata: Option<serde_json::Value>,
        priority: u8,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id,
            channel,
            status: NotificationStatus::Pending,
            template_code,
            recipient,
            subject,
            rendered_content,
            template_data,
            metadata,
            retry_count: 0,
            error_message: None,
            error_code: None,
            provider_response: None,
            external_id: None,
            is_read: false,
            read_at: None,
            priority: priority.min(10),
            created_at: now,
            updated_at: now,
            sent_at: None,
            delivered_at: None,
            failed_at: None,
            next_retry_at: None,
        }
    }

    /// Increment the retry count and schedule the next attempt.
    pub fn increment_retry(&mut self, next_retry_at: DateTime<Utc>) {
        self.retry_count += 1;
        self.next_retry_at = Some(next_retry_at);
        self.status = NotificationStatus::Retry;
        self.updated_at = Utc::now();
    }

    pub fn mark_delivered(&mut self, external_id: String, provider_response: Option<String>) {
        let now = Utc::now();
        self.status = NotificationStatus::Delivered;
        self.delivered_at = Some(now);
        self.sent_at = Some(now);
        self.external_id = Some(external_id);
        self.provider_response = provider_response;
        self.next_retry_at = None;
        self.updated_at = now;
    }

    pub fn mark_failed(
        &mut self,
        error_message: String,
        error_code: Option<String>,
        failure_status: NotificationStatus,
    ) {
        let now = Utc::now();
        self.status = failure_status;
        self.failed_at = Some(now);
        self.error_message = Some(error_message);
        self.error_code = error_code;
        self.next_retry_at = None;
        self.updated_at = now;
    }

    pub fn mark_as_read(&mut self) {
        self.is_read = true;
        self.read_at = Some(Utc::now());
        self.updated_at = Utc::now();
    }
}
