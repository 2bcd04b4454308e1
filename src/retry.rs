use std::time::Duration;

use anyhow::{Error, Result};
use chrono::Utc;
use tracing::{info, warn};

use crate::{
    clients::{database::NotificationStore, rbmq::RabbitMqClient},
    models::{
        dlq::DeadLetterEntry,
        message::NotificationMessage,
        notification::{Notification, NotificationStatus},
        provider::ErrorType,
        retry::RetryConfig,
    },
};

/// Backoff before attempt `retry_count + 1`:
/// `min(initial * multiplier^retry_count, max)`.
pub fn backoff_delay(config: &RetryConfig, retry_count: u32) -> Duration {
    let backoff_ms =
        (config.initial_backoff_ms as f64 * config.multiplier.powi(retry_count as i32)) as u64;

    Duration::from_millis(backoff_ms.min(config.max_backoff_ms))
}

/// What to do with a failed delivery attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum RetryDecision {
    Retry { delay: Duration },
    DeadLetter {
        status: NotificationStatus,
        reason: String,
    },
}

/// Pure failure policy for a notification whose `retry_count` attempts have
/// already failed and which has now failed again.
///
/// Permanent errors dead-letter immediately without consuming the retry
/// budget. A retriable failure consumes one attempt; once the total reaches
/// `max_attempts` the notification dead-letters as FAILED_MAX_RETRY instead
/// of being rescheduled, so with `max_attempts = 3` the third failure is
/// final and no fourth attempt is ever made. An already-exhausted
/// notification resolves as FAILED_MAX_RETRY regardless of error type.
pub fn decide(
    config: &RetryConfig,
    retry_count: u32,
    error_type: ErrorType,
    error_message: &str,
) -> RetryDecision {
    if error_type == ErrorType::Permanent {
        let status = if retry_count >= config.max_attempts {
            NotificationStatus::FailedMaxRetry
        } else {
            NotificationStatus::FailedPermanent
        };

        return RetryDecision::DeadLetter {
            status,
            reason: format!("Permanent error: {}", error_message),
        };
    }

    let attempts_used = retry_count.saturating_add(1);

    if attempts_used >= config.max_attempts {
        return RetryDecision::DeadLetter {
            status: NotificationStatus::FailedMaxRetry,
            reason: format!("Max retry attempts reached. Last error: {}", error_message),
        };
    }

    RetryDecision::Retry {
        delay: backoff_delay(config, retry_count),
    }
}

/// Resolves delivery outcomes: updates the persisted lifecycle and either
/// stages a delayed retry or dead-letters the notification.
pub struct RetryHandler {
    config: RetryConfig,
}

impl RetryHandler {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Handle a failed attempt. Returns true when the notification was
    /// scheduled for another attempt, false when it was dead-lettered.
    pub async fn handle_failure(
        &self,
        store: &mut NotificationStore,
        rbmq: &RabbitMqClient,
        notification: &mut Notification,
        message: &NotificationMessage,
        error_message: &str,
        error_code: Option<&str>,
        error_type: ErrorType,
    ) -> Result<bool, Error> {
        // The latest error always lands on the row, whatever the decision.
        notification.error_message = Some(error_message.to_string());
        notification.error_code = error_code.map(str::to_string);
        store
            .record_error(notification.id, error_message, error_code)
            .await?;

        match decide(&self.config, notification.retry_count, error_type, error_message) {
            RetryDecision::DeadLetter { status, reason } => {
                // A retriable failure consumed an attempt even though it
                // will never be retried.
                if error_type == ErrorType::Retriable {
                    notification.retry_count += 1;
                }

                warn!(
                    notification_id = %notification.id,
                    channel = %notification.channel,
                    retry_count = notification.retry_count,
                    reason = %reason,
                    "Dead-lettering notification"
                );
                self.move_to_dlq(store, notification, status, reason).await?;
                Ok(false)
            }
            RetryDecision::Retry { delay } => {
                let next_retry_at = Utc::now()
                    + chrono::Duration::milliseconds(delay.as_millis() as i64);

                notification.increment_retry(next_retry_at);
                store
                    .mark_retry(notification.id, notification.retry_count, next_retry_at)
                    .await?;

                let mut retry_message = message.clone();
                retry_message.retry_count = notification.retry_count;

                rbmq.publish_retry(&retry_message, delay.as_millis() as u64, next_retry_at)
                    .await?;

                info!(
                    notification_id = %notification.id,
                    channel = %notification.channel,
                    retry = notification.retry_count,
                    max_attempts = self.config.max_attempts,
                    next_retry_at = %next_retry_at,
                    "Scheduled retry"
                );

                Ok(true)
            }
        }
    }

    pub async fn handle_success(
        &self,
        store: &NotificationStore,
        notification: &mut Notification,
        external_id: &str,
        provider_response: Option<&str>,
    ) -> Result<(), Error> {
        notification.mark_delivered(
            external_id.to_string(),
            provider_response.map(str::to_string),
        );
        store
            .mark_delivered(notification.id, external_id, provider_response)
            .await?;

        info!(
            notification_id = %notification.id,
            channel = %notification.channel,
            external_id,
            "Notification delivered"
        );

        Ok(())
    }

    /// Terminal failure: flip the row into its failure status and append the
    /// dead-letter snapshot atomically.
    pub async fn move_to_dlq(
        &self,
        store: &mut NotificationStore,
        notification: &mut Notification,
        status: NotificationStatus,
        failure_reason: String,
    ) -> Result<(), Error> {
        notification.mark_failed(
            failure_reason.clone(),
            notification.error_code.clone(),
            status,
        );

        let entry = DeadLetterEntry::from_notification(notification, failure_reason);

        store.move_to_dlq(notification, &entry).await?;

        Ok(())
    }
}
