use reqwest::Client;
use serde::Serialize;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::{
    classifier,
    config::Config,
    models::{
        message::NotificationMessage,
        provider::{ErrorType, ProviderResponse},
    },
    providers::{Provider, disabled_response},
};

#[derive(Debug, Clone)]
pub struct MailConfig {
    pub enabled: bool,
    pub api_key: Option<String>,
    pub from_address: Option<String>,
    pub base_url: String,
}

impl MailConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            enabled: config.mail_enabled,
            api_key: config.mail_api_key.clone(),
            from_address: config.mail_from_address.clone(),
            base_url: config.mail_base_url.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
struct MailSendRequest<'a> {
    personalizations: Vec<Personalization<'a>>,
    from: Address<'a>,
    subject: &'a str,
    content: Vec<Content<'a>>,
}

#[derive(Debug, Serialize)]
struct Personalization<'a> {
    to: Vec<Address<'a>>,
}

#[derive(Debug, Serialize)]
struct Address<'a> {
    email: &'a str,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    #[serde(rename = "type")]
    content_type: &'a str,
    value: &'a str,
}

/// Email delivery through an HTTP mail API (SendGrid-compatible v3 send
/// endpoint).
pub struct HttpMailProvider {
    http_client: Client,
    config: MailConfig,
}

impl HttpMailProvider {
    pub fn new(http_client: Client, config: MailConfig) -> Self {
        Self {
            http_client,
            config,
        }
    }
}

impl Provider for HttpMailProvider {
    async fn send(&self, message: &NotificationMessage) -> ProviderResponse {
        if !self.is_enabled() {
            warn!("Mail provider is not enabled, refusing send");
            return disabled_response("Email");
        }

        let Some(recipient) = message.recipient.as_deref() else {
            return ProviderResponse::permanent_failure(
                "No recipient email address",
                "INVALID_RECIPIENT",
                None,
            );
        };

        let subject = message.subject.as_deref().unwrap_or("Notification");

        let request = MailSendRequest {
            personalizations: vec![Personalization {
                to: vec![Address { email: recipient }],
            }],
            from: Address {
                email: self.config.from_address.as_deref().unwrap_or_default(),
            },
            subject,
            content: vec![Content {
                content_type: "text/html",
                value: &message.rendered_content,
            }],
        };

        let url = format!("{}/v3/mail/send", self.config.base_url);

        let response = match self
            .http_client
            .post(&url)
            .bearer_auth(self.config.api_key.as_deref().unwrap_or_default())
            .json(&request)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                error!(error = %e, "Mail API request failed");
                let code = if e.is_timeout() { "TIMEOUT" } else { "NETWORK_ERROR" };
                return ProviderResponse::retriable_failure(e.to_string(), code, None);
            }
        };

        let status = response.status();

        if status.is_success() {
            // The mail API echoes a message id header; fall back to a local
            // tracking id when absent.
            let external_id = response
                .headers()
                .get("x-message-id")
                .and_then(|value| value.to_str().ok())
                .map(str::to_string)
                .unwrap_or_else(|| Uuid::new_v4().to_string());

            info!(recipient, external_id = %external_id, "Email accepted by mail API");

            return ProviderResponse::success(external_id, "Email accepted");
        }

        let raw = response.text().await.unwrap_or_default();
        let error_message = if raw.is_empty() {
            format!("Mail API returned status {}", status)
        } else {
            raw.clone()
        };
        let error_code = status.as_u16().to_string();

        // Client errors other than throttling are not going to succeed on a
        // resend of the same payload.
        let permanent = (status.is_client_error()
            && status != reqwest::StatusCode::TOO_MANY_REQUESTS)
            || classifier::classify(Some(&error_code), &error_message) == ErrorType::Permanent;

        if permanent {
            ProviderResponse::permanent_failure(error_message, error_code, Some(raw))
        } else {
            ProviderResponse::retriable_failure(error_message, error_code, Some(raw))
        }
    }

    fn is_enabled(&self) -> bool {
        self.config.enabled && self.config.api_key.is_some() && self.config.from_address.is_some()
    }

    fn name(&self) -> &'static str {
        "HttpMail"
    }
}
