use anyhow::{Error, Result, anyhow};
use chrono::{DateTime, Utc};
use tokio_postgres::{Client, NoTls, Row};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::models::{
    channel::Channel,
    dlq::DeadLetterEntry,
    notification::{Notification, NotificationStatus},
};

/// Durable store for notifications and dead-letter entries. Each instance
/// owns its own connection, so workers never contend on a shared client.
pub struct NotificationStore {
    client: Client,
}

impl NotificationStore {
    pub async fn connect(database_url: &str) -> Result<Self, Error> {
        let (client, connection) = tokio_postgres::connect(database_url, NoTls)
            .await
            .map_err(|e| anyhow!("Failed to connect to database: {}", e))?;

        tokio::spawn(async move {
            if let Err(e) = connection.await {
                error!(error = %e, "Database connection task ended");
            }
        });

        Ok(Self { client })
    }

    /// Create tables and indexes if they do not exist yet.
    pub async fn ensure_schema(&self) -> Result<(), Error> {
        self.client
            .batch_execute(
                r#"
                CREATE TABLE IF NOT EXISTS notifications (
                    id UUID PRIMARY KEY,
                    user_id UUID NOT NULL,
                    channel TEXT NOT NULL,
                    status TEXT NOT NULL,
                    template_code TEXT NOT NULL,
                    recipient TEXT,
                    subject TEXT,
                    rendered_content TEXT NOT NULL,
                    template_data JSONB,
                    metadata JSONB,
                    retry_count INT NOT NULL DEFAULT 0,
                    error_message TEXT,
                    error_code TEXT,
                    provider_response TEXT,
                    external_id TEXT,
                    is_read BOOLEAN NOT NULL DEFAULT FALSE,
                    read_at TIMESTAMPTZ,
                    priority INT NOT NULL DEFAULT 5,
                    created_at TIMESTAMPTZ NOT NULL,
                    updated_at TIMESTAMPTZ NOT NULL,
                    sent_at TIMESTAMPTZ,
                    delivered_at TIMESTAMPTZ,
                    failed_at TIMESTAMPTZ,
                    next_retry_at TIMESTAMPTZ
                );

                CREATE INDEX IF NOT EXISTS idx_notification_user_created
                    ON notifications (user_id, created_at DESC);
                CREATE INDEX IF NOT EXISTS idx_notification_user_channel
                    ON notifications (user_id, channel);
                CREATE INDEX IF NOT EXISTS idx_notification_user_read
                    ON notifications (user_id, is_read);
                CREATE INDEX IF NOT EXISTS idx_notification_status_created
                    ON notifications (status, created_at);

                CREATE TABLE IF NOT EXISTS notification_dead_letters (
                    id UUID PRIMARY KEY,
                    notification_id UUID NOT NULL,
                    user_id UUID NOT NULL,
                    channel TEXT NOT NULL,
                    template_code TEXT NOT NULL,
                    recipient TEXT,
                    template_data JSONB,
                    retry_count INT NOT NULL,
                    failure_reason TEXT NOT NULL,
                    last_error_code TEXT,
                    last_provider_response TEXT,
                    original_created_at TIMESTAMPTZ NOT NULL,
                    created_at TIMESTAMPTZ NOT NULL
                );

                CREATE INDEX IF NOT EXISTS idx_dlq_notification_id
                    ON notification_dead_letters (notification_id);
                CREATE INDEX IF NOT EXISTS idx_dlq_user_created
                    ON notification_dead_letters (user_id, created_at DESC);
                CREATE INDEX IF NOT EXISTS idx_dlq_channel_created
                    ON notification_dead_letters (channel, created_at DESC);
                "#,
            )
            .await
            .map_err(|e| anyhow!("Failed to ensure database schema: {}", e))?;

        info!("Database schema ensured");

        Ok(())
    }

    pub async fn insert(&self, notification: &Notification) -> Result<(), Error> {
        self.client
            .execute(
                "INSERT INTO notifications (id, user_id, channel, status, template_code, \
                 recipient, subject, rendered_content, template_data, metadata, retry_count, \
                 is_read, priority, created_at, updated_at) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)",
                &[
                    &notification.id,
                    &notification.user_id,
                    &notification.channel.as_str(),
                    &notification.status.as_str(),
                    &notification.template_code,
                    &notification.recipient,
                    &notification.subject,
                    &notification.rendered_content,
                    &notification.template_data,
                    &notification.metadata,
                    &(notification.retry_count as i32),
                    &notification.is_read,
                    &(notification.priority as i32),
                    &notification.created_at,
                    &notification.updated_at,
                ],
            )
            .await
            .map_err(|e| anyhow!("Failed to insert notification: {}", e))?;

        debug!(notification_id = %notification.id, channel = %notification.channel, "Notification persisted");

        Ok(())
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<Notification>, Error> {
        let row = self
            .client
            .query_opt(
                "SELECT * FROM notifications WHERE id = $1",
                &[&id],
            )
            .await
            .map_err(|e| anyhow!("Failed to load notification {}: {}", id, e))?;

        row.map(|r| notification_from_row(&r)).transpose()
    }

    pub async fn find_by_id_and_user(
        &self,
        id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<Notification>, Error> {
        let row = self
            .client
            .query_opt(
                "SELECT * FROM notifications WHERE id = $1 AND user_id = $2",
                &[&id, &user_id],
            )
            .await
            .map_err(|e| anyhow!("Failed to load notification {}: {}", id, e))?;

        row.map(|r| notification_from_row(&r)).transpose()
    }

    pub async fn mark_processing(&self, id: Uuid) -> Result<(), Error> {
        self.client
            .execute(
                "UPDATE notifications SET status = $2, updated_at = NOW() WHERE id = $1",
                &[&id, &NotificationStatus::Processing.as_str()],
            )
            .await
            .map_err(|e| anyhow!("Failed to mark notification processing: {}", e))?;

        Ok(())
    }

    /// Record the latest provider error on the row, independent of the
    /// retry decision that follows.
    pub async fn record_error(
        &self,
        id: Uuid,
        error_message: &str,
        error_code: Option<&str>,
    ) -> Result<(), Error> {
        self.client
            .execute(
                "UPDATE notifications SET error_message = $2, error_code = $3, updated_at = NOW() \
                 WHERE id = $1",
                &[&id, &error_message, &error_code],
            )
            .await
            .map_err(|e| anyhow!("Failed to record notification error: {}", e))?;

        Ok(())
    }

    pub async fn mark_retry(
        &self,
        id: Uuid,
        retry_count: u32,
        next_retry_at: DateTime<Utc>,
    ) -> Result<(), Error> {
        self.client
            .execute(
                "UPDATE notifications SET status = $2, retry_count = $3, next_retry_at = $4, \
                 updated_at = NOW() WHERE id = $1",
                &[
                    &id,
                    &NotificationStatus::Retry.as_str(),
                    &(retry_count as i32),
                    &next_retry_at,
                ],
            )
            .await
            .map_err(|e| anyhow!("Failed to mark notification for retry: {}", e))?;

        Ok(())
    }

    pub async fn mark_delivered(
        &self,
        id: Uuid,
        external_id: &str,
        provider_response: Option<&str>,
    ) -> Result<(), Error> {
        self.client
            .execute(
                "UPDATE notifications SET status = $2, external_id = $3, provider_response = $4, \
                 sent_at = NOW(), delivered_at = NOW(), next_retry_at = NULL, updated_at = NOW() \
                 WHERE id = $1",
                &[
                    &id,
                    &NotificationStatus::Delivered.as_str(),
                    &external_id,
                    &provider_response,
                ],
            )
            .await
            .map_err(|e| anyhow!("Failed to mark notification delivered: {}", e))?;

        Ok(())
    }

    /// Terminal failure: flip the notification into its failure status and
    /// append the dead-letter snapshot in one transaction, so a redelivered
    /// message can never observe a half-done dead-lettering.
    pub async fn move_to_dlq(
        &mut self,
        notification: &Notification,
        entry: &DeadLetterEntry,
    ) -> Result<(), Error> {
        let transaction = self
            .client
            .transaction()
            .await
            .map_err(|e| anyhow!("Failed to open dead-letter transaction: {}", e))?;

        transaction
            .execute(
                "UPDATE notifications SET status = $2, error_message = $3, error_code = $4, \
                 retry_count = $5, failed_at = NOW(), next_retry_at = NULL, updated_at = NOW() \
                 WHERE id = $1",
                &[
                    &notification.id,
                    &notification.status.as_str(),
                    &notification.error_message,
                    &notification.error_code,
                    &(notification.retry_count as i32),
                ],
            )
            .await
            .map_err(|e| anyhow!("Failed to mark notification failed: {}", e))?;

        transaction
            .execute(
                "INSERT INTO notification_dead_letters (id, notification_id, user_id, channel, \
                 template_code, recipient, template_data, retry_count, failure_reason, \
                 last_error_code, last_provider_response, original_created_at, created_at) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)",
                &[
                    &entry.id,
                    &entry.notification_id,
                    &entry.user_id,
                    &entry.channel.as_str(),
                    &entry.template_code,
                    &entry.recipient,
                    &entry.template_data,
                    &(entry.retry_count as i32),
                    &entry.failure_reason,
                    &entry.last_error_code,
                    &entry.last_provider_response,
                    &entry.original_created_at,
                    &entry.created_at,
                ],
            )
            .await
            .map_err(|e| anyhow!("Failed to insert dead letter entry: {}", e))?;

        transaction
            .commit()
            .await
            .map_err(|e| anyhow!("Failed to commit dead-letter transaction: {}", e))?;

        warn!(
            notification_id = %notification.id,
            channel = %notification.channel,
            reason = %entry.failure_reason,
            "Notification dead-lettered"
        );

        Ok(())
    }

    /// RETRY rows whose scheduled time has passed; picked up by the
    /// reconciliation sweep when the staged broker message was lost.
    pub async fn find_ready_for_retry(&self, limit: i64) -> Result<Vec<Notification>, Error> {
        let rows = self
            .client
            .query(
                "SELECT * FROM notifications WHERE status = $1 AND next_retry_at <= NOW() \
                     ORDER BY next_retry_at ASC LIMIT $2",
                &[&NotificationStatus::Retry.as_str(), &limit],
            )
            .await
            .map_err(|e| anyhow!("Failed to query retry-ready notifications: {}", e))?;

        rows.iter().map(notification_from_row).collect()
    }

    /// PENDING rows older than the cutoff: persisted but (probably) never
    /// published.
    pub async fn find_stale_pending(
        &self,
        cutoff: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Notification>, Error> {
        let rows = self
            .client
            .query(
                "SELECT * FROM notifications WHERE status = $1 AND created_at <= $2 \
                     ORDER BY created_at ASC LIMIT $3",
                &[&NotificationStatus::Pending.as_str(), &cutoff, &limit],
            )
            .await
            .map_err(|e| anyhow!("Failed to query stale pending notifications: {}", e))?;

        rows.iter().map(notification_from_row).collect()
    }

    pub async fn find_by_user(
        &self,
        user_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Notification>, Error> {
        let rows = self
            .client
            .query(
                "SELECT * FROM notifications WHERE user_id = $1 \
                     ORDER BY created_at DESC LIMIT $2 OFFSET $3",
                &[&user_id, &limit, &offset],
            )
            .await
            .map_err(|e| anyhow!("Failed to query user notifications: {}", e))?;

        rows.iter().map(notification_from_row).collect()
    }

    pub async fn find_by_user_and_channel(
        &self,
        user_id: Uuid,
        channel: Channel,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Notification>, Error> {
        let rows = self
            .client
            .query(
                "SELECT * FROM notifications WHERE user_id = $1 AND channel = $2 \
                     ORDER BY created_at DESC LIMIT $3 OFFSET $4",
                &[&user_id, &channel.as_str(), &limit, &offset],
            )
            .await
            .map_err(|e| anyhow!("Failed to query user notifications by channel: {}", e))?;

        rows.iter().map(notification_from_row).collect()
    }

    pub async fn find_unread_in_app(
        &self,
        user_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Notification>, Error> {
        let rows = self
            .client
            .query(
                "SELECT * FROM notifications WHERE user_id = $1 AND channel = $2 \
                     AND is_read = FALSE ORDER BY created_at DESC LIMIT $3 OFFSET $4",
                &[&user_id, &Channel::InApp.as_str(), &limit, &offset],
            )
            .await
            .map_err(|e| anyhow!("Failed to query unread notifications: {}", e))?;

        rows.iter().map(notification_from_row).collect()
    }

    pub async fn count_unread(&self, user_id: Uuid) -> Result<i64, Error> {
        let row = self
            .client
            .query_one(
                "SELECT COUNT(*) FROM notifications WHERE user_id = $1 AND channel = $2 \
                 AND is_read = FALSE",
                &[&user_id, &Channel::InApp.as_str()],
            )
            .await
            .map_err(|e| anyhow!("Failed to count unread notifications: {}", e))?;

        Ok(row.get(0))
    }

    pub async fn mark_read(&self, id: Uuid, user_id: Uuid) -> Result<bool, Error> {
        let updated = self
            .client
            .execute(
                "UPDATE notifications SET is_read = TRUE, read_at = NOW(), updated_at = NOW() \
                 WHERE id = $1 AND user_id = $2 AND channel = $3 AND is_read = FALSE",
                &[&id, &user_id, &Channel::InApp.as_str()],
            )
            .await
            .map_err(|e| anyhow!("Failed to mark notification read: {}", e))?;

        Ok(updated > 0)
    }

    pub async fn mark_all_read(&self, user_id: Uuid) -> Result<u64, Error> {
        let updated = self
            .client
            .execute(
                "UPDATE notifications SET is_read = TRUE, read_at = NOW(), updated_at = NOW() \
                 WHERE user_id = $1 AND channel = $2 AND is_read = FALSE",
                &[&user_id, &Channel::InApp.as_str()],
            )
            .await
            .map_err(|e| anyhow!("Failed to mark notifications read: {}", e))?;

        Ok(updated)
    }

    pub async fn find_dlq_by_notification(
        &self,
        notification_id: Uuid,
    ) -> Result<Option<DeadLetterEntry>, Error> {
        let row = self
            .client
            .query_opt(
                "SELECT * FROM notification_dead_letters WHERE notification_id = $1",
                &[&notification_id],
            )
            .await
            .map_err(|e| anyhow!("Failed to load dead letter entry: {}", e))?;

        row.map(|r| dead_letter_from_row(&r)).transpose()
    }

    pub async fn find_dlq_by_user(
        &self,
        user_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<DeadLetterEntry>, Error> {
        let rows = self
            .client
            .query(
                "SELECT * FROM notification_dead_letters WHERE user_id = $1 \
                     ORDER BY created_at DESC LIMIT $2 OFFSET $3",
                &[&user_id, &limit, &offset],
            )
            .await
            .map_err(|e| anyhow!("Failed to query dead letters by user: {}", e))?;

        rows.iter().map(dead_letter_from_row).collect()
    }

    pub async fn find_dlq_by_channel(
        &self,
        channel: Channel,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<DeadLetterEntry>, Error> {
        let rows = self
            .client
            .query(
                "SELECT * FROM notification_dead_letters WHERE channel = $1 \
                     ORDER BY created_at DESC LIMIT $2 OFFSET $3",
                &[&channel.as_str(), &limit, &offset],
            )
            .await
            .map_err(|e| anyhow!("Failed to query dead letters by channel: {}", e))?;

        rows.iter().map(dead_letter_from_row).collect()
    }

    pub async fn count_dlq_by_channel(&self, channel: Channel) -> Result<i64, Error> {
        let row = self
            .client
            .query_one(
                "SELECT COUNT(*) FROM notification_dead_letters WHERE channel = $1",
                &[&channel.as_str()],
            )
            .await
            .map_err(|e| anyhow!("Failed to count dead letters: {}", e))?;

        Ok(row.get(0))
    }

    pub async fn health_check(&self) -> Result<(), Error> {
        self.client
            .query_one("SELECT 1", &[])
            .await
            .map_err(|e| anyhow!("Database health check failed: {}", e))?;

        Ok(())
    }
}

fn notification_from_row(row: &Row) -> Result<Notification, Error> {
    let channel: String = row.get("channel");
    let status: String = row.get("status");
    let retry_count: i32 = row.get("retry_count");
    let priority: i32 = row.get("priority");

    Ok(Notification {
        id: row.get("id"),
        user_id: row.get("user_id"),
        channel: Channel::from_str_value(&channel)
            .ok_or_else(|| anyhow!("Unknown channel in database: {}", channel))?,
        status: NotificationStatus::from_str_value(&status)
            .ok_or_else(|| anyhow!("Unknown status in database: {}", status))?,
        template_code: row.get("template_code"),
        recipient: row.get("recipient"),
        subject: row.get("subject"),
        rendered_content: row.get("rendered_content"),
        template_data: row.get("template_data"),
        metadata: row.get("metadata"),
        retry_count: retry_count.max(0) as u32,
        error_message: row.get("error_message"),
        error_code: row.get("error_code"),
        provider_response: row.get("provider_response"),
        external_id: row.get("external_id"),
        is_read: row.get("is_read"),
        read_at: row.get("read_at"),
        priority: priority.clamp(0, 10) as u8,
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
        sent_at: row.get("sent_at"),
        delivered_at: row.get("delivered_at"),
        failed_at: row.get("failed_at"),
        next_retry_at: row.get("next_retry_at"),
    })
}

fn dead_letter_from_row(row: &Row) -> Result<DeadLetterEntry, Error> {
    let channel: String = row.get("channel");
    let retry_count: i32 = row.get("retry_count");

    Ok(DeadLetterEntry {
        id: row.get("id"),
        notification_id: row.get("notification_id"),
        user_id: row.get("user_id"),
        channel: Channel::from_str_value(&channel)
            .ok_or_else(|| anyhow!("Unknown channel in dead letter row: {}", channel))?,
        template_code: row.get("template_code"),
        recipient: row.get("recipient"),
        template_data: row.get("template_data"),
        retry_count: retry_count.max(0) as u32,
        failure_reason: row.get("failure_reason"),
        last_error_code: row.get("last_error_code"),
        last_provider_response: row.get("last_provider_response"),
        original_created_at: row.get("original_created_at"),
        created_at: row.get("created_at"),
    })
}
