use serde::{Deserialize, Serialize};

/// Classification of a provider failure, driving the retry-or-dead-letter
/// decision. Unknown errors default to Retriable so a deliverable
/// notification is never silently dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorType {
    Retriable,
    Permanent,
}

/// Normalized outcome of one provider send attempt.
#[derive(Debug, Clone)]
pub struct ProviderResponse {
    pub success: bool,

    /// Stable external message id from the provider, on success.
    pub external_id: Option<String>,
    pub raw_response: Option<String>,

    pub error_message: Option<String>,
    pub error_code: Option<String>,
    pub error_type: Option<ErrorType>,
}

impl ProviderResponse {
    pub fn success(external_id: String, raw_response: impl Into<String>) -> Self {
        Self {
            success: true,
            external_id: Some(external_id),
            raw_response: Some(raw_response.into()),
            error_message: None,
            error_code: None,
            error_type: None,
        }
    }

    pub fn retriable_failure(
        error_message: impl Into<String>,
        error_code: impl Into<String>,
        raw_response: Option<String>,
    ) -> Self {
        Self {
            success: false,
            external_id: None,
            raw_response,
            error_message: Some(error_message.into()),
            error_code: Some(error_code.into()),
            error_type: Some(ErrorType::Retriable),
        }
    }

    pub fn permanent_failure(
        error_message: impl Into<String>,
        error_code: impl Into<String>,
        raw_response: Option<String>,
    ) -> Self {
        Self {
            success: false,
            external_id: None,
            raw_response,
            error_message: Some(error_message.into()),
            error_code: Some(error_code.into()),
            error_type: Some(ErrorType::Permanent),
        }
    }

    pub fn error_type(&self) -> ErrorType {
        self.error_type.unwrap_or(ErrorType::Retriable)
    }
}
