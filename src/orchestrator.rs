use std::collections::HashMap;

use anyhow::{Error, Result};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::{
    clients::{database::NotificationStore, rbmq::RabbitMqClient},
    models::{
        channel::Channel,
        message::NotificationMessage,
        notification::Notification,
        request::{NotificationRequest, RecipientDetails},
    },
    rate_limiter::RateLimiter,
    renderer::TemplateRenderer,
};

/// Entry point of the pipeline. For each requested channel: rate-limit
/// check, recipient resolution, template render, persist (PENDING), record
/// the rate-limit attempt, publish.
///
/// Failures are scoped to a channel: a rate-limited or unroutable channel is
/// skipped, a failed channel is logged, and the remaining channels proceed.
/// `send` never fails the whole request for a partial failure.
pub struct Orchestrator {
    store: NotificationStore,
    rate_limiter: RateLimiter,
    renderer: TemplateRenderer,
    rbmq: RabbitMqClient,
}

impl Orchestrator {
    pub fn new(
        store: NotificationStore,
        rate_limiter: RateLimiter,
        renderer: TemplateRenderer,
        rbmq: RabbitMqClient,
    ) -> Self {
        Self {
            store,
            rate_limiter,
            renderer,
            rbmq,
        }
    }

    /// Fan a request out to its channels. Returns the ids of the
    /// notifications that were persisted and queued.
    pub async fn send(&mut self, request: &NotificationRequest) -> Result<Vec<Uuid>, Error> {
        info!(
            user_id = %request.user_id,
            channels = request.channels.len(),
            template_code = %request.template_code,
            "Sending notification"
        );

        let mut notification_ids = Vec::new();

        for &channel in &request.channels {
            match self.send_to_channel(request, channel).await {
                Ok(Some(id)) => notification_ids.push(id),
                Ok(None) => {}
                Err(e) => {
                    error!(
                        user_id = %request.user_id,
                        channel = %channel,
                        error = %e,
                        "Failed to send notification to channel"
                    );
                }
            }
        }

        Ok(notification_ids)
    }

    async fn send_to_channel(
        &mut self,
        request: &NotificationRequest,
        channel: Channel,
    ) -> Result<Option<Uuid>, Error> {
        let user_id = request.user_id;

        if !request.skip_rate_limit && !self.rate_limiter.is_allowed(user_id, channel).await? {
            warn!(
                user_id = %user_id,
                channel = %channel,
                "Rate limit exceeded, skipping channel"
            );
            return Ok(None);
        }

        let recipient = request
            .recipient_details
            .as_ref()
            .and_then(|details| details.recipient_for(channel));

        if channel.requires_recipient() && recipient.is_none() {
            warn!(
                user_id = %user_id,
                channel = %channel,
                "No recipient provided, skipping channel"
            );
            return Ok(None);
        }

        // A render failure aborts this channel before anything is persisted.
        let rendered_content = self
            .renderer
            .render(channel, &request.template_code, &request.template_data)
            .await?;

        let template_data = if request.template_data.is_empty() {
            None
        } else {
            Some(serde_json::to_value(&request.template_data)?)
        };

        let metadata = request
            .metadata
            .as_ref()
            .map(serde_json::to_value)
            .transpose()?;

        let notification = Notification::new(
            user_id,
            channel,
            request.template_code.clone(),
            recipient,
            request.subject.clone(),
            rendered_content,
            template_data,
            metadata,
            request.priority,
        );

        self.store.insert(&notification).await?;

        debug!(
            notification_id = %notification.id,
            channel = %channel,
            user_id = %user_id,
            "Created notification"
        );

        if !request.skip_rate_limit {
            self.rate_limiter.record_attempt(user_id, channel).await?;
        }

        // If this publish fails the row stays PENDING and the
        // reconciliation sweep republishes it later.
        let message = NotificationMessage::from_notification(&notification);
        self.rbmq.publish(&message).await?;

        Ok(Some(notification.id))
    }

    pub async fn send_email(
        &mut self,
        user_id: Uuid,
        email: &str,
        template_code: &str,
        subject: Option<&str>,
        template_data: HashMap<String, serde_json::Value>,
    ) -> Result<Option<Uuid>, Error> {
        let request = NotificationRequest {
            user_id,
            channels: vec![Channel::Email],
            template_code: template_code.to_string(),
            recipient_details: Some(RecipientDetails {
                email: Some(email.to_string()),
                ..Default::default()
            }),
            template_data,
            subject: subject.map(str::to_string),
            metadata: None,
            priority: 5,
            skip_rate_limit: false,
        };

        Ok(self.send(&request).await?.into_iter().next())
    }

    pub async fn send_sms(
        &mut self,
        user_id: Uuid,
        phone: &str,
        template_code: &str,
        template_data: HashMap<String, serde_json::Value>,
    ) -> Result<Option<Uuid>, Error> {
        let request = NotificationRequest {
            user_id,
            channels: vec![Channel::Sms],
            template_code: template_code.to_string(),
            recipient_details: Some(RecipientDetails {
                phone: Some(phone.to_string()),
                ..Default::default()
            }),
            template_data,
            subject: None,
            metadata: None,
            priority: 5,
            skip_rate_limit: false,
        };

        Ok(self.send(&request).await?.into_iter().next())
    }

    pub async fn send_whatsapp(
        &mut self,
        user_id: Uuid,
        phone: &str,
        template_code: &str,
        template_data: HashMap<String, serde_json::Value>,
    ) -> Result<Option<Uuid>, Error> {
        let request = NotificationRequest {
            user_id,
            channels: vec![Channel::Whatsapp],
            template_code: template_code.to_string(),
            recipient_details: Some(RecipientDetails {
                whatsapp_number: Some(phone.to_string()),
                ..Default::default()
            }),
            template_data,
            subject: None,
            metadata: None,
            priority: 5,
            skip_rate_limit: false,
        };

        Ok(self.send(&request).await?.into_iter().next())
    }

    /// The subject doubles as the push title.
    pub async fn send_push(
        &mut self,
        user_id: Uuid,
        fcm_token: &str,
        template_code: &str,
        title: Option<&str>,
        template_data: HashMap<String, serde_json::Value>,
    ) -> Result<Option<Uuid>, Error> {
        let request = NotificationRequest {
            user_id,
            channels: vec![Channel::Push],
            template_code: template_code.to_string(),
            recipient_details: Some(RecipientDetails {
                fcm_token: Some(fcm_token.to_string()),
                ..Default::default()
            }),
            template_data,
            subject: title.map(str::to_string),
            metadata: None,
            priority: 5,
            skip_rate_limit: false,
        };

        Ok(self.send(&request).await?.into_iter().next())
    }

    pub async fn send_in_app(
        &mut self,
        user_id: Uuid,
        template_code: &str,
        template_data: HashMap<String, serde_json::Value>,
    ) -> Result<Option<Uuid>, Error> {
        let request = NotificationRequest {
            user_id,
            channels: vec![Channel::InApp],
            template_code: template_code.to_string(),
            recipient_details: None,
            template_data,
            subject: None,
            metadata: None,
            priority: 5,
            skip_rate_limit: false,
        };

        Ok(self.send(&request).await?.into_iter().next())
    }
}
