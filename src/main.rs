use std::time::Duration;

use anyhow::{Error, Result, anyhow};
use tracing::error;
use tracing_subscriber::EnvFilter;

use notification_service::{
    api::run_api_server,
    clients::{database::NotificationStore, rbmq::RabbitMqClient},
    config::Config,
    models::channel::Channel,
    providers::{
        Provider,
        email::{HttpMailProvider, MailConfig},
        in_app::InAppProvider,
        push::{FcmConfig, FcmPushProvider},
        sms::TwilioSmsProvider,
        twilio::TwilioConfig,
        whatsapp::TwilioWhatsAppProvider,
    },
    retry::RetryHandler,
    sweeper::ReconciliationSweeper,
    utils::{BackoffConfig, retry_with_backoff},
    worker::Worker,
};

#[tokio::main]
async fn main() -> Result<(), Error> {
    let config = Config::load()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    // gcp_auth and reqwest pull in rustls; pin the process-wide provider.
    let _ = rustls::crypto::ring::default_provider().install_default();

    let backoff = BackoffConfig::default();

    let bootstrap_store = retry_with_backoff(&backoff, || {
        NotificationStore::connect(&config.database_url)
    })
    .await?;
    bootstrap_store.ensure_schema().await?;

    let rbmq = retry_with_backoff(&backoff, || RabbitMqClient::connect(&config)).await?;

    let http_client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.provider_timeout_seconds))
        .build()
        .map_err(|e| anyhow!("Failed to build HTTP client: {}", e))?;

    let twilio = TwilioConfig::from_config(&config);

    for index in 0..config.worker_concurrency {
        start_worker(
            &config,
            Channel::Email,
            index,
            HttpMailProvider::new(http_client.clone(), MailConfig::from_config(&config)),
        )
        .await?;

        start_worker(
            &config,
            Channel::Sms,
            index,
            TwilioSmsProvider::new(http_client.clone(), twilio.clone()),
        )
        .await?;

        start_worker(
            &config,
            Channel::Whatsapp,
            index,
            TwilioWhatsAppProvider::new(http_client.clone(), twilio.clone()),
        )
        .await?;

        start_worker(
            &config,
            Channel::Push,
            index,
            FcmPushProvider::new(http_client.clone(), FcmConfig::from_config(&config)),
        )
        .await?;

        start_worker(&config, Channel::InApp, index, InAppProvider).await?;
    }

    let sweeper_store = NotificationStore::connect(&config.database_url).await?;
    let sweeper = ReconciliationSweeper::new(sweeper_store, rbmq.clone(), &config);
    tokio::spawn(sweeper.run());

    run_api_server(config)
        .await
        .map_err(|e| anyhow!("API server failed: {}", e))?;

    Ok(())
}

/// Spawn one consumer for a channel. Every worker owns its own broker
/// channel (independent prefetch) and its own store connection.
async fn start_worker<P: Provider>(
    config: &Config,
    channel: Channel,
    index: usize,
    provider: P,
) -> Result<(), Error> {
    let backoff = BackoffConfig::default();

    let store = retry_with_backoff(&backoff, || {
        NotificationStore::connect(&config.database_url)
    })
    .await?;
    let rbmq = retry_with_backoff(&backoff, || RabbitMqClient::connect(config)).await?;

    let consumer_tag = format!("{}_worker_{}", channel.short_name(), index);

    let worker = Worker::new(
        channel,
        consumer_tag,
        provider,
        rbmq,
        store,
        RetryHandler::new(config.retry_config()),
    );

    tokio::spawn(async move {
        if let Err(e) = worker.run().await {
            error!(channel = %channel, error = %e, "Worker terminated");
        }
    });

    Ok(())
}
