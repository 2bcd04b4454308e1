use anyhow::{Error, Result, anyhow};
use dotenvy::dotenv;
use serde::Deserialize;

use crate::models::{channel::Channel, retry::RetryConfig};

#[derive(Clone, Deserialize, Debug)]
pub struct Config {
    pub rabbitmq_url: String,
    pub redis_url: String,
    pub database_url: String,

    #[serde(default = "default_exchange")]
    pub exchange_name: String,

    #[serde(default = "default_dlx_exchange")]
    pub dlx_exchange_name: String,

    #[serde(default = "default_dlq_queue")]
    pub dlq_queue_name: String,

    #[serde(default = "default_prefetch_count")]
    pub prefetch_count: u16,

    #[serde(default = "default_worker_concurrency")]
    pub worker_concurrency: usize,

    #[serde(default = "default_max_retry_attempts")]
    pub max_retry_attempts: u32,

    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,

    #[serde(default = "default_rate_limit_window_seconds")]
    pub rate_limit_window_seconds: u64,

    #[serde(default)]
    pub rate_limit_email_max: Option<u32>,

    #[serde(default)]
    pub rate_limit_sms_max: Option<u32>,

    #[serde(default)]
    pub rate_limit_whatsapp_max: Option<u32>,

    #[serde(default)]
    pub rate_limit_push_max: Option<u32>,

    #[serde(default)]
    pub rate_limit_in_app_max: Option<u32>,

    #[serde(default = "default_template_dir")]
    pub template_dir: String,

    #[serde(default = "default_provider_timeout_seconds")]
    pub provider_timeout_seconds: u64,

    #[serde(default)]
    pub twilio_enabled: bool,

    #[serde(default)]
    pub twilio_account_sid: Option<String>,

    #[serde(default)]
    pub twilio_auth_token: Option<String>,

    #[serde(default)]
    pub twilio_from_number: Option<String>,

    #[serde(default)]
    pub twilio_whatsapp_number: Option<String>,

    #[serde(default = "default_twilio_base_url")]
    pub twilio_base_url: String,

    #[serde(default)]
    pub mail_enabled: bool,

    #[serde(default)]
    pub mail_api_key: Option<String>,

    #[serde(default)]
    pub mail_from_address: Option<String>,

    #[serde(default = "default_mail_base_url")]
    pub mail_base_url: String,

    #[serde(default)]
    pub fcm_enabled: bool,

    #[serde(default)]
    pub fcm_project_id: Option<String>,

    #[serde(default = "default_fcm_base_url")]
    pub fcm_base_url: String,

    #[serde(default = "default_sweep_interval_seconds")]
    pub sweep_interval_seconds: u64,

    #[serde(default = "default_pending_stale_seconds")]
    pub pending_stale_seconds: i64,

    #[serde(default = "default_pending_max_age_seconds")]
    pub pending_max_age_seconds: i64,

    #[serde(default = "default_server_port")]
    pub server_port: u16,
}

fn default_exchange() -> String {
    "notification.exchange".to_string()
}

fn default_dlx_exchange() -> String {
    "notification.dlx".to_string()
}

fn default_dlq_queue() -> String {
    "notification.dlq".to_string()
}

fn default_prefetch_count() -> u16 {
    1
}

fn default_worker_concurrency() -> usize {
    1
}

fn default_max_retry_attempts() -> u32 {
    10
}

fn default_initial_backoff_ms() -> u64 {
    1_000
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_max_backoff_ms() -> u64 {
    3_600_000
}

fn default_rate_limit_window_seconds() -> u64 {
    3_600
}

fn default_template_dir() -> String {
    "templates".to_string()
}

fn default_provider_timeout_seconds() -> u64 {
    30
}

fn default_twilio_base_url() -> String {
    "https://api.twilio.com".to_string()
}

fn default_mail_base_url() -> String {
    "https://api.sendgrid.com".to_string()
}

fn default_fcm_base_url() -> String {
    "https://fcm.googleapis.com".to_string()
}

fn default_sweep_interval_seconds() -> u64 {
    60
}

fn default_pending_stale_seconds() -> i64 {
    300
}

fn default_pending_max_age_seconds() -> i64 {
    86_400
}

fn default_server_port() -> u16 {
    8080
}

/// Per-channel fixed-window rate limit.
#[derive(Debug, Clone, Copy)]
pub struct RateLimitConfig {
    pub max_requests: u32,
    pub window_seconds: u64,
}

impl Config {
    pub fn load() -> Result<Self, Error> {
        dotenv().ok();

        let config = envy::from_env::<Self>()
            .map_err(|e| anyhow!("Invalid or missing environment variable: {}", e))?;
        Ok(config)
    }

    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_attempts: self.max_retry_attempts,
            initial_backoff_ms: self.initial_backoff_ms,
            multiplier: self.backoff_multiplier,
            max_backoff_ms: self.max_backoff_ms,
        }
    }

    /// Rate limit for a channel, falling back to the stock per-channel
    /// defaults when not configured.
    pub fn rate_limit(&self, channel: Channel) -> RateLimitConfig {
        let max_requests = match channel {
            Channel::Email => self.rate_limit_email_max.unwrap_or(50),
            Channel::Sms => self.rate_limit_sms_max.unwrap_or(10),
            Channel::Whatsapp => self.rate_limit_whatsapp_max.unwrap_or(20),
            Channel::Push => self.rate_limit_push_max.unwrap_or(100),
            Channel::InApp => self.rate_limit_in_app_max.unwrap_or(200),
        };

        RateLimitConfig {
            max_requests,
            window_seconds: self.rate_limit_window_seconds,
        }
    }
}
