use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::channel::Channel;

fn default_priority() -> u8 {
    5
}

/// Inbound intent to notify a user over one or more channels. One request
/// fans out into one persisted notification per channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationRequest {
    pub user_id: Uuid,
    pub channels: Vec<Channel>,
    pub template_code: String,

    #[serde(default)]
    pub recipient_details: Option<RecipientDetails>,

    #[serde(default)]
    pub template_data: HashMap<String, serde_json::Value>,

    #[serde(default)]
    pub subject: Option<String>,

    #[serde(default)]
    pub metadata: Option<HashMap<String, String>>,

    /// 0-10, higher is more important. Clamped on persist.
    #[serde(default = "default_priority")]
    pub priority: u8,

    #[serde(default)]
    pub skip_rate_limit: bool,
}

/// Contact details per channel. A request only needs the fields for the
/// channels it targets.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecipientDetails {
    pub email: Option<String>,

    /// E.164 format preferred: +1234567890
    pub phone: Option<String>,
    pub whatsapp_number: Option<String>,
    pub fcm_token: Option<String>,
    pub device_token: Option<String>,
}

impl RecipientDetails {
    /// Resolve the recipient address for a channel. WhatsApp falls back to
    /// the plain phone number, push to the generic device token.
    pub fn recipient_for(&self, channel: Channel) -> Option<String> {
        let value = match channel {
            Channel::Email => self.email.as_ref(),
            Channel::Sms => self.phone.as_ref(),
            Channel::Whatsapp => self.whatsapp_number.as_ref().or(self.phone.as_ref()),
            Channel::Push => self.fcm_token.as_ref().or(self.device_token.as_ref()),
            Channel::InApp => None,
        };
        value.filter(|v| !v.trim().is_empty()).cloned()
    }
}
