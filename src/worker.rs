use anyhow::{Error, Result, anyhow};
use futures_util::StreamExt;
use tracing::{error, info, warn};

use crate::{
    clients::{database::NotificationStore, rbmq::RabbitMqClient},
    models::{
        channel::Channel, message::NotificationMessage, notification::NotificationStatus,
        provider::ErrorType,
    },
    providers::Provider,
    retry::RetryHandler,
};

/// Per-channel queue consumer. One worker type serves every channel; the
/// channel's behavior lives in the provider value it is constructed with.
///
/// Messages are always explicitly acknowledged. Failures after the
/// notification row was loaded are routed through the retry handler rather
/// than rejected, so a poisoned handler cannot trigger an uncontrolled
/// broker redelivery loop; rejection without requeue is the last resort.
pub struct Worker<P: Provider> {
    channel: Channel,
    consumer_tag: String,
    provider: P,
    rbmq: RabbitMqClient,
    store: NotificationStore,
    retry_handler: RetryHandler,
}

impl<P: Provider> Worker<P> {
    pub fn new(
        channel: Channel,
        consumer_tag: String,
        provider: P,
        rbmq: RabbitMqClient,
        store: NotificationStore,
        retry_handler: RetryHandler,
    ) -> Self {
        Self {
            channel,
            consumer_tag,
            provider,
            rbmq,
            store,
            retry_handler,
        }
    }

    pub async fn run(mut self) -> Result<(), Error> {
        let mut consumer = self
            .rbmq
            .create_consumer(self.channel, &self.consumer_tag)
            .await?;

        info!(
            channel = %self.channel,
            provider = self.provider.name(),
            "Worker started"
        );

        while let Some(delivery) = consumer.next().await {
            let delivery = match delivery {
                Ok(delivery) => delivery,
                Err(e) => {
                    error!(channel = %self.channel, error = %e, "Consumer stream error");
                    continue;
                }
            };

            let delivery_tag = delivery.delivery_tag;

            let message: NotificationMessage = match serde_json::from_slice(&delivery.data) {
                Ok(message) => message,
                Err(e) => {
                    // Undecodable payloads go straight to the broker DLX.
                    error!(channel = %self.channel, error = %e, "Malformed message, rejecting");
                    if let Err(reject_err) = self.rbmq.reject(delivery_tag, false).await {
                        error!(error = %reject_err, "Failed to reject malformed message");
                    }
                    continue;
                }
            };

            match self.process_message(&message).await {
                Ok(()) => {
                    if let Err(e) = self.rbmq.acknowledge(delivery_tag).await {
                        error!(error = %e, "Failed to acknowledge message");
                    }
                }
                Err(e) => {
                    error!(
                        channel = %self.channel,
                        notification_id = %message.notification_id,
                        error = %e,
                        "Error processing notification"
                    );

                    match self.handle_processing_error(&message, &e).await {
                        Ok(()) => {
                            if let Err(ack_err) = self.rbmq.acknowledge(delivery_tag).await {
                                error!(error = %ack_err, "Failed to acknowledge message");
                            }
                        }
                        Err(fallback_err) => {
                            error!(
                                notification_id = %message.notification_id,
                                error = %fallback_err,
                                "Failed to handle processing error, rejecting message"
                            );
                            if let Err(reject_err) = self.rbmq.reject(delivery_tag, false).await {
                                error!(error = %reject_err, "Failed to reject message");
                            }
                        }
                    }
                }
            }
        }

        warn!(channel = %self.channel, "Consumer stream ended");

        Ok(())
    }

    async fn process_message(&mut self, message: &NotificationMessage) -> Result<(), Error> {
        info!(
            channel = %self.channel,
            notification_id = %message.notification_id,
            retry_count = message.retry_count,
            "Processing notification"
        );

        // The queue message is a cache; the row is the truth.
        let Some(mut notification) = self.store.find_by_id(message.notification_id).await? else {
            error!(
                notification_id = %message.notification_id,
                "Notification not found in database, dropping message"
            );
            return Ok(());
        };

        // Redelivery of an already-resolved notification must not touch its
        // terminal fields.
        if notification.status.is_terminal() {
            info!(
                notification_id = %notification.id,
                status = %notification.status,
                "Notification already in terminal state, dropping redelivery"
            );
            return Ok(());
        }

        self.store.mark_processing(notification.id).await?;
        notification.status = NotificationStatus::Processing;

        if !self.provider.is_enabled() {
            warn!(
                channel = %self.channel,
                provider = self.provider.name(),
                "Provider is not available, scheduling retry"
            );
            self.retry_handler
                .handle_failure(
                    &mut self.store,
                    &self.rbmq,
                    &mut notification,
                    message,
                    "Provider not available",
                    Some("PROVIDER_UNAVAILABLE"),
                    ErrorType::Retriable,
                )
                .await?;
            return Ok(());
        }

        let response = self.provider.send(message).await;

        if response.success {
            let external_id = response
                .external_id
                .ok_or_else(|| anyhow!("Provider success without external id"))?;

            self.retry_handler
                .handle_success(
                    &self.store,
                    &mut notification,
                    &external_id,
                    response.raw_response.as_deref(),
                )
                .await?;
        } else {
            let error_message = response
                .error_message
                .clone()
                .unwrap_or_else(|| "Unknown provider error".to_string());

            self.retry_handler
                .handle_failure(
                    &mut self.store,
                    &self.rbmq,
                    &mut notification,
                    message,
                    &error_message,
                    response.error_code.as_deref(),
                    response.error_type(),
                )
                .await?;
        }

        Ok(())
    }

    /// Fold an unexpected processing error into the normal retry path, so
    /// the message can be acknowledged instead of endlessly redelivered.
    async fn handle_processing_error(
        &mut self,
        message: &NotificationMessage,
        error: &Error,
    ) -> Result<(), Error> {
        let Some(mut notification) = self.store.find_by_id(message.notification_id).await? else {
            return Ok(());
        };

        if notification.status.is_terminal() {
            return Ok(());
        }

        self.retry_handler
            .handle_failure(
                &mut self.store,
                &self.rbmq,
                &mut notification,
                message,
                &error.to_string(),
                Some("PROCESSING_ERROR"),
                ErrorType::Retriable,
            )
            .await?;

        Ok(())
    }
}
