use reqwest::Client;
use tracing::warn;

use crate::{
    models::{message::NotificationMessage, provider::ProviderResponse},
    providers::{Provider, disabled_response, twilio},
    utils::mask_recipient,
};

const WHATSAPP_PREFIX: &str = "whatsapp:";

/// WhatsApp delivery over the Twilio Messages API. Twilio addresses
/// WhatsApp endpoints as `whatsapp:+E164`.
pub struct TwilioWhatsAppProvider {
    http_client: Client,
    config: twilio::TwilioConfig,
}

impl TwilioWhatsAppProvider {
    pub fn new(http_client: Client, config: twilio::TwilioConfig) -> Self {
        Self {
            http_client,
            config,
        }
    }

    fn format_whatsapp_number(number: &str) -> String {
        if number.starts_with(WHATSAPP_PREFIX) {
            number.to_string()
        } else {
            format!("{}{}", WHATSAPP_PREFIX, number)
        }
    }

    /// Same terminal-code set as SMS; both ride the Messages API.
    fn is_permanent_error(code: i64) -> bool {
        matches!(
            code,
            21211 | 21612 | 21614 | 21408 | 21610 | 30004 | 30005 | 30006 | 30007
        )
    }
}

impl Provider for TwilioWhatsAppProvider {
    async fn send(&self, message: &NotificationMessage) -> ProviderResponse {
        if !self.is_enabled() {
            warn!(
                recipient = %mask_recipient(message.recipient.as_deref().unwrap_or_default()),
                "Twilio WhatsApp is not enabled, refusing send"
            );
            return disabled_response("WhatsApp");
        }

        let Some(recipient) = message.recipient.as_deref() else {
            return ProviderResponse::permanent_failure(
                "No recipient WhatsApp number",
                "INVALID_RECIPIENT",
                None,
            );
        };

        let to = Self::format_whatsapp_number(recipient);
        let from =
            Self::format_whatsapp_number(self.config.whatsapp_number.as_deref().unwrap_or_default());

        twilio::create_message(
            &self.http_client,
            &self.config,
            &from,
            &to,
            &message.rendered_content,
            Self::is_permanent_error,
        )
        .await
    }

    fn is_enabled(&self) -> bool {
        self.config.enabled
            && self.config.has_credentials()
            && self.config.whatsapp_number.is_some()
    }

    fn name(&self) -> &'static str {
        "TwilioWhatsApp"
    }
}
