use chrono::{Duration as ChronoDuration, Utc};
use tokio::time::{Duration, MissedTickBehavior, interval};
use tracing::{error, info, warn};

use crate::{
    clients::{database::NotificationStore, rbmq::RabbitMqClient},
    config::Config,
    models::{
        message::NotificationMessage,
        notification::{Notification, NotificationStatus},
    },
    retry::RetryHandler,
};

const SWEEP_BATCH_SIZE: i64 = 100;

/// Background reconciliation for the persist/publish non-atomicity window:
/// RETRY rows whose scheduled time passed without redelivery are
/// republished, stale PENDING rows (persisted but never queued) are
/// republished, and PENDING rows beyond the maximum age are dead-lettered.
pub struct ReconciliationSweeper {
    store: NotificationStore,
    rbmq: RabbitMqClient,
    retry_handler: RetryHandler,
    sweep_interval: Duration,
    stale_after: ChronoDuration,
    max_pending_age: ChronoDuration,
}

impl ReconciliationSweeper {
    pub fn new(store: NotificationStore, rbmq: RabbitMqClient, config: &Config) -> Self {
        Self {
            store,
            rbmq,
            retry_handler: RetryHandler::new(config.retry_config()),
            sweep_interval: Duration::from_secs(config.sweep_interval_seconds),
            stale_after: ChronoDuration::seconds(config.pending_stale_seconds),
            max_pending_age: ChronoDuration::seconds(config.pending_max_age_seconds),
        }
    }

    pub async fn run(mut self) {
        let mut ticker = interval(self.sweep_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            interval_seconds = self.sweep_interval.as_secs(),
            "Reconciliation sweeper started"
        );

        loop {
            ticker.tick().await;

            if let Err(e) = self.sweep().await {
                error!(error = %e, "Reconciliation sweep failed");
            }
        }
    }

    async fn sweep(&mut self) -> anyhow::Result<()> {
        self.republish_due_retries().await?;
        self.recover_stale_pending().await?;
        Ok(())
    }

    /// RETRY rows past their schedule: the staged broker message was lost
    /// (or the broker has not released it); put one back on the live queue.
    async fn republish_due_retries(&mut self) -> anyhow::Result<()> {
        let due = self.store.find_ready_for_retry(SWEEP_BATCH_SIZE).await?;

        for notification in due {
            let message = NotificationMessage::from_notification(&notification);

            match self.rbmq.publish(&message).await {
                Ok(()) => {
                    info!(
                        notification_id = %notification.id,
                        channel = %notification.channel,
                        retry_count = notification.retry_count,
                        "Republished due retry"
                    );
                }
                Err(e) => {
                    error!(
                        notification_id = %notification.id,
                        error = %e,
                        "Failed to republish due retry"
                    );
                }
            }
        }

        Ok(())
    }

    async fn recover_stale_pending(&mut self) -> anyhow::Result<()> {
        let cutoff = Utc::now() - self.stale_after;
        let stale = self.store.find_stale_pending(cutoff, SWEEP_BATCH_SIZE).await?;

        for mut notification in stale {
            if Utc::now() - notification.created_at >= self.max_pending_age {
                self.dead_letter_stale(&mut notification).await;
                continue;
            }

            let message = NotificationMessage::from_notification(&notification);

            match self.rbmq.publish(&message).await {
                Ok(()) => {
                    warn!(
                        notification_id = %notification.id,
                        channel = %notification.channel,
                        created_at = %notification.created_at,
                        "Republished stale pending notification"
                    );
                }
                Err(e) => {
                    error!(
                        notification_id = %notification.id,
                        error = %e,
                        "Failed to republish stale pending notification"
                    );
                }
            }
        }

        Ok(())
    }

    async fn dead_letter_stale(&mut self, notification: &mut Notification) {
        let result = self
            .retry_handler
            .move_to_dlq(
                &mut self.store,
                notification,
                NotificationStatus::FailedPermanent,
                "Stale pending notification".to_string(),
            )
            .await;

        if let Err(e) = result {
            error!(
                notification_id = %notification.id,
                error = %e,
                "Failed to dead-letter stale pending notification"
            );
        }
    }
}
