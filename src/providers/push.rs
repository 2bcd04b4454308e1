use std::collections::HashMap;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::{
    config::Config,
    models::{message::NotificationMessage, provider::ProviderResponse},
    providers::{Provider, disabled_response},
    utils::mask_recipient,
};

const FCM_SCOPES: &[&str] = &["https://www.googleapis.com/auth/firebase.messaging"];

#[derive(Debug, Clone)]
pub struct FcmConfig {
    pub enabled: bool,
    pub project_id: Option<String>,
    pub base_url: String,
}

impl FcmConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            enabled: config.fcm_enabled,
            project_id: config.fcm_project_id.clone(),
            base_url: config.fcm_base_url.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
struct FcmRequest {
    message: FcmMessage,
}

#[derive(Debug, Clone, Serialize)]
struct FcmMessage {
    token: String,
    notification: FcmNotification,

    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<HashMap<String, String>>,
}

#[derive(Debug, Clone, Serialize)]
struct FcmNotification {
    title: String,
    body: String,
}

#[derive(Debug, Deserialize)]
struct FcmSendResponse {
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FcmErrorResponse {
    error: Option<FcmErrorBody>,
}

#[derive(Debug, Deserialize)]
struct FcmErrorBody {
    status: Option<String>,
    message: Option<String>,

    #[serde(default)]
    details: Vec<serde_json::Value>,
}

/// Push delivery over the FCM HTTP v1 API, authenticated with a
/// service-account token from gcp_auth.
pub struct FcmPushProvider {
    http_client: Client,
    config: FcmConfig,
}

impl FcmPushProvider {
    pub fn new(http_client: Client, config: FcmConfig) -> Self {
        Self {
            http_client,
            config,
        }
    }

    fn is_permanent_error(code: &str) -> bool {
        matches!(
            code,
            "INVALID_ARGUMENT" | "NOT_FOUND" | "UNREGISTERED" | "SENDER_ID_MISMATCH"
        )
    }

    /// Rendered push templates are JSON with title/body and an optional
    /// string data bag; anything else is sent as a plain body under the
    /// message subject.
    fn parse_content(message: &NotificationMessage) -> (String, String, HashMap<String, String>) {
        let default_title = message
            .subject
            .clone()
            .unwrap_or_else(|| "Notification".to_string());

        match serde_json::from_str::<serde_json::Value>(&message.rendered_content) {
            Ok(value) => {
                let title = value
                    .get("title")
                    .and_then(|v| v.as_str())
                    .map(str::to_string)
                    .unwrap_or(default_title);
                let body = value
                    .get("body")
                    .and_then(|v| v.as_str())
                    .map(str::to_string)
                    .unwrap_or_else(|| message.rendered_content.clone());

                let mut data = HashMap::new();
                if let Some(map) = value.get("data").and_then(|v| v.as_object()) {
                    for (key, entry) in map {
                        let rendered = match entry {
                            serde_json::Value::String(s) => s.clone(),
                            other => other.to_string(),
                        };
                        data.insert(key.clone(), rendered);
                    }
                }

                (title, body, data)
            }
            Err(_) => {
                debug!("Push content is not JSON, using as plain body");
                (default_title, message.rendered_content.clone(), HashMap::new())
            }
        }
    }

    fn extract_error_code(error: &FcmErrorBody) -> String {
        for detail in &error.details {
            if let Some(code) = detail.get("errorCode").and_then(|v| v.as_str()) {
                return code.to_string();
            }
        }
        error.status.clone().unwrap_or_else(|| "UNKNOWN".to_string())
    }
}

impl Provider for FcmPushProvider {
    async fn send(&self, message: &NotificationMessage) -> ProviderResponse {
        let token = message.recipient.as_deref().unwrap_or_default();

        if !self.is_enabled() {
            warn!(
                token = %mask_recipient(token),
                "Firebase push is not enabled, refusing send"
            );
            return disabled_response("Push");
        }

        if token.is_empty() {
            return ProviderResponse::permanent_failure(
                "No recipient device token",
                "INVALID_RECIPIENT",
                None,
            );
        }

        let (title, body, mut data) = Self::parse_content(message);
        data.insert(
            "notification_id".to_string(),
            message.notification_id.to_string(),
        );
        data.insert("template_code".to_string(), message.template_code.clone());

        let request = FcmRequest {
            message: FcmMessage {
                token: token.to_string(),
                notification: FcmNotification { title, body },
                data: if data.is_empty() { None } else { Some(data) },
            },
        };

        let auth_token = match gcp_auth::provider().await {
            Ok(provider) => match provider.token(FCM_SCOPES).await {
                Ok(token) => token,
                Err(e) => {
                    error!(error = %e, "Failed to obtain FCM access token");
                    return ProviderResponse::retriable_failure(e.to_string(), "AUTH_ERROR", None);
                }
            },
            Err(e) => {
                error!(error = %e, "Failed to build FCM token provider");
                return ProviderResponse::retriable_failure(e.to_string(), "AUTH_ERROR", None);
            }
        };

        let url = format!(
            "{}/v1/projects/{}/messages:send",
            self.config.base_url,
            self.config.project_id.as_deref().unwrap_or_default()
        );

        let response = match self
            .http_client
            .post(&url)
            .bearer_auth(auth_token.as_str())
            .json(&request)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                error!(error = %e, "FCM request failed");
                let code = if e.is_timeout() { "TIMEOUT" } else { "NETWORK_ERROR" };
                return ProviderResponse::retriable_failure(e.to_string(), code, None);
            }
        };

        let status = response.status();
        let raw = response.text().await.unwrap_or_default();

        if status.is_success() {
            let parsed: FcmSendResponse = serde_json::from_str(&raw).unwrap_or(FcmSendResponse {
                name: None,
            });
            let external_id = parsed.name.unwrap_or_default();

            info!(
                external_id = %external_id,
                token = %mask_recipient(token),
                "Push notification sent"
            );

            return ProviderResponse::success(external_id, raw);
        }

        let parsed: FcmErrorResponse =
            serde_json::from_str(&raw).unwrap_or(FcmErrorResponse { error: None });

        let (error_code, error_message) = match parsed.error {
            Some(error) => {
                let code = Self::extract_error_code(&error);
                let message = error
                    .message
                    .unwrap_or_else(|| format!("FCM returned status {}", status));
                (code, message)
            }
            None => (
                status.as_u16().to_string(),
                format!("FCM returned status {}", status),
            ),
        };

        if Self::is_permanent_error(&error_code) {
            ProviderResponse::permanent_failure(error_message, error_code, Some(raw))
        } else {
            ProviderResponse::retriable_failure(error_message, error_code, Some(raw))
        }
    }

    fn is_enabled(&self) -> bool {
        self.config.enabled && self.config.project_id.is_some()
    }

    fn name(&self) -> &'static str {
        "FcmPush"
    }
}
