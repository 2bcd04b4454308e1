use std::fmt::{Display, Formatter, Result};

use serde::{Deserialize, Serialize};

/// Delivery channels supported by the pipeline. Each channel owns its own
/// queue, provider and rate limit, and never blocks the others.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Channel {
    Email,
    Sms,
    Whatsapp,
    Push,
    InApp,
}

pub const ALL_CHANNELS: [Channel; 5] = [
    Channel::Email,
    Channel::Sms,
    Channel::Whatsapp,
    Channel::Push,
    Channel::InApp,
];

impl Channel {
    /// Short lowercase name used in queue names, template folders and
    /// rate-limit keys.
    pub fn short_name(&self) -> &'static str {
        match self {
            Channel::Email => "email",
            Channel::Sms => "sms",
            Channel::Whatsapp => "whatsapp",
            Channel::Push => "push",
            Channel::InApp => "inapp",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Email => "EMAIL",
            Channel::Sms => "SMS",
            Channel::Whatsapp => "WHATSAPP",
            Channel::Push => "PUSH",
            Channel::InApp => "IN_APP",
        }
    }

    pub fn from_str_value(s: &str) -> Option<Self> {
        match s {
            "EMAIL" => Some(Channel::Email),
            "SMS" => Some(Channel::Sms),
            "WHATSAPP" => Some(Channel::Whatsapp),
            "PUSH" => Some(Channel::Push),
            "IN_APP" => Some(Channel::InApp),
            _ => None,
        }
    }

    /// Template file extension for this channel's rendered content.
    pub fn template_extension(&self) -> &'static str {
        match self {
            Channel::Email | Channel::InApp => ".html",
            Channel::Sms | Channel::Whatsapp => ".txt",
            Channel::Push => ".json",
        }
    }

    /// Whether the channel needs an external recipient address. IN_APP is
    /// fully realized by database persistence.
    pub fn requires_recipient(&self) -> bool {
        !matches!(self, Channel::InApp)
    }
}

impl Display for Channel {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        write!(f, "{}", self.as_str())
    }
}

/// Broker topology names for a channel. Kept as a lookup so infrastructure
/// naming stays out of the domain enum itself.
#[derive(Debug, Clone, Copy)]
pub struct ChannelTopology {
    pub queue: &'static str,
    pub routing_key: &'static str,
    pub retry_queue: &'static str,
}

pub fn topology(channel: Channel) -> ChannelTopology {
    match channel {
        Channel::Email => ChannelTopology {
            queue: "notification.email.queue",
            routing_key: "notification.email",
            retry_queue: "notification.email.retry.queue",
        },
        Channel::Sms => ChannelTopology {
            queue: "notification.sms.queue",
            routing_key: "notification.sms",
            retry_queue: "notification.sms.retry.queue",
        },
        Channel::Whatsapp => ChannelTopology {
            queue: "notification.whatsapp.queue",
            routing_key: "notification.whatsapp",
            retry_queue: "notification.whatsapp.retry.queue",
        },
        Channel::Push => ChannelTopology {
            queue: "notification.push.queue",
            routing_key: "notification.push",
            retry_queue: "notification.push.retry.queue",
        },
        Channel::InApp => ChannelTopology {
            queue: "notification.inapp.queue",
            routing_key: "notification.inapp",
            retry_queue: "notification.inapp.retry.queue",
        },
    }
}
