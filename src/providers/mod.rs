use std::future::Future;

use crate::models::{message::NotificationMessage, provider::ProviderResponse};

pub mod email;
pub mod in_app;
pub mod push;
pub mod sms;
pub mod twilio;
pub mod whatsapp;

/// A channel's external transport. Implementations normalize their
/// provider-specific success and failure shapes into `ProviderResponse`,
/// including the retriable/permanent classification for their own error
/// codes.
pub trait Provider: Send + Sync + 'static {
    /// Perform the external send. Never panics on provider failure; all
    /// outcomes are folded into the response.
    fn send(
        &self,
        message: &NotificationMessage,
    ) -> impl Future<Output = ProviderResponse> + Send;

    /// Whether this provider is configured and allowed to send. Disabled
    /// providers must refuse with a permanent `PROVIDER_DISABLED` failure.
    fn is_enabled(&self) -> bool;

    fn name(&self) -> &'static str;
}

/// Standard refusal for a provider that is not configured.
pub(crate) fn disabled_response(provider: &str) -> ProviderResponse {
    ProviderResponse::permanent_failure(
        format!("{} provider is not enabled", provider),
        "PROVIDER_DISABLED",
        None,
    )
}
