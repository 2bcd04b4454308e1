use uuid::Uuid;

use crate::{
    models::{message::NotificationMessage, provider::ProviderResponse},
    providers::Provider,
};

/// In-app notifications are fully realized by database persistence; this
/// provider exists only so the worker contract is uniform across channels.
pub struct InAppProvider;

impl Provider for InAppProvider {
    async fn send(&self, _message: &NotificationMessage) -> ProviderResponse {
        ProviderResponse::success(Uuid::new_v4().to_string(), r#"{"status":"stored"}"#)
    }

    fn is_enabled(&self) -> bool {
        true
    }

    fn name(&self) -> &'static str {
        "InApp"
    }
}
