use reqwest::Client;
use tracing::warn;

use crate::{
    models::{message::NotificationMessage, provider::ProviderResponse},
    providers::{Provider, disabled_response, twilio},
    utils::mask_recipient,
};

/// SMS delivery over the Twilio Messages API.
pub struct TwilioSmsProvider {
    http_client: Client,
    config: twilio::TwilioConfig,
}

impl TwilioSmsProvider {
    pub fn new(http_client: Client, config: twilio::TwilioConfig) -> Self {
        Self {
            http_client,
            config,
        }
    }

    /// Twilio error codes that indicate the message will never deliver.
    fn is_permanent_error(code: i64) -> bool {
        matches!(
            code,
            21211  // Invalid phone number
            | 21612 // Phone not SMS capable
            | 21614 // Invalid mobile number
            | 21408 // Permission not enabled
            | 21610 // Unsubscribed
            | 30004 // Message blocked
            | 30005 // Unknown destination
            | 30006 // Landline
            | 30007 // Filtered
        )
    }
}

impl Provider for TwilioSmsProvider {
    async fn send(&self, message: &NotificationMessage) -> ProviderResponse {
        if !self.is_enabled() {
            warn!(
                recipient = %mask_recipient(message.recipient.as_deref().unwrap_or_default()),
                "Twilio SMS is not enabled, refusing send"
            );
            return disabled_response("SMS");
        }

        let Some(recipient) = message.recipient.as_deref() else {
            return ProviderResponse::permanent_failure(
                "No recipient phone number",
                "INVALID_RECIPIENT",
                None,
            );
        };

        let from = self.config.from_number.as_deref().unwrap_or_default();

        twilio::create_message(
            &self.http_client,
            &self.config,
            from,
            recipient,
            &message.rendered_content,
            Self::is_permanent_error,
        )
        .await
    }

    fn is_enabled(&self) -> bool {
        self.config.enabled && self.config.has_credentials() && self.config.from_number.is_some()
    }

    fn name(&self) -> &'static str {
        "TwilioSms"
    }
}
