use reqwest::Client;
use serde::Deserialize;
use tracing::{error, info};

use crate::{
    classifier,
    config::Config,
    models::provider::{ErrorType, ProviderResponse},
};

/// Twilio credentials and endpoint, shared by the SMS and WhatsApp
/// providers. Built once at startup and passed by reference; no ambient
/// SDK state.
#[derive(Debug, Clone)]
pub struct TwilioConfig {
    pub enabled: bool,
    pub account_sid: Option<String>,
    pub auth_token: Option<String>,
    pub from_number: Option<String>,
    pub whatsapp_number: Option<String>,
    pub base_url: String,
}

impl TwilioConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            enabled: config.twilio_enabled,
            account_sid: config.twilio_account_sid.clone(),
            auth_token: config.twilio_auth_token.clone(),
            from_number: config.twilio_from_number.clone(),
            whatsapp_number: config.twilio_whatsapp_number.clone(),
            base_url: config.twilio_base_url.clone(),
        }
    }

    pub fn has_credentials(&self) -> bool {
        self.account_sid.is_some() && self.auth_token.is_some()
    }
}

#[derive(Debug, Deserialize)]
struct TwilioMessageResponse {
    sid: Option<String>,
    status: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TwilioErrorResponse {
    code: Option<i64>,
    message: Option<String>,
}

/// POST a message to the Twilio Messages endpoint and fold the outcome into
/// a `ProviderResponse`. `is_permanent` is the calling provider's own
/// terminal-code list.
pub(crate) async fn create_message(
    http_client: &Client,
    config: &TwilioConfig,
    from: &str,
    to: &str,
    body: &str,
    is_permanent: fn(i64) -> bool,
) -> ProviderResponse {
    let account_sid = config.account_sid.as_deref().unwrap_or_default();

    let url = format!(
        "{}/2010-04-01/Accounts/{}/Messages.json",
        config.base_url, account_sid
    );

    let params = [("To", to), ("From", from), ("Body", body)];

    let response = match http_client
        .post(&url)
        .basic_auth(account_sid, config.auth_token.as_deref())
        .form(&params)
        .send()
        .await
    {
        Ok(response) => response,
        Err(e) => {
            error!(error = %e, "Twilio request failed");
            let code = if e.is_timeout() { "TIMEOUT" } else { "NETWORK_ERROR" };
            return ProviderResponse::retriable_failure(e.to_string(), code, None);
        }
    };

    let status = response.status();
    let raw = response.text().await.unwrap_or_default();

    if status.is_success() {
        let parsed: TwilioMessageResponse = match serde_json::from_str(&raw) {
            Ok(parsed) => parsed,
            Err(e) => {
                return ProviderResponse::retriable_failure(
                    format!("Malformed Twilio response: {}", e),
                    "MALFORMED_RESPONSE",
                    Some(raw),
                );
            }
        };

        let sid = parsed.sid.unwrap_or_default();

        info!(
            sid = %sid,
            status = parsed.status.as_deref().unwrap_or("unknown"),
            "Twilio message accepted"
        );

        return ProviderResponse::success(sid, raw);
    }

    let parsed: TwilioErrorResponse = serde_json::from_str(&raw).unwrap_or(TwilioErrorResponse {
        code: None,
        message: None,
    });

    let message = parsed
        .message
        .unwrap_or_else(|| format!("Twilio returned status {}", status));

    match parsed.code {
        Some(code) if is_permanent(code) => {
            ProviderResponse::permanent_failure(message, code.to_string(), Some(raw))
        }
        Some(code) => ProviderResponse::retriable_failure(message, code.to_string(), Some(raw)),
        None => match classifier::classify(None, &message) {
            ErrorType::Permanent => {
                ProviderResponse::permanent_failure(message, status.as_u16().to_string(), Some(raw))
            }
            ErrorType::Retriable => ProviderResponse::retriable_failure(
                message,
                status.as_u16().to_string(),
                Some(raw),
            ),
        },
    }
}
