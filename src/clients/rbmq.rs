use anyhow::{Error, Result, anyhow};
use chrono::{DateTime, SecondsFormat, Utc};
use lapin::{
    BasicProperties, Channel as AmqpChannel, Connection, ConnectionProperties, Consumer,
    ExchangeKind,
    options::{
        BasicAckOptions, BasicConsumeOptions, BasicPublishOptions, BasicQosOptions,
        BasicRejectOptions, ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions,
    },
    types::{AMQPValue, FieldTable},
};
use tracing::{debug, info};

use crate::{
    config::Config,
    models::{
        channel::{ALL_CHANNELS, Channel, topology},
        message::NotificationMessage,
    },
};

const DLQ_ROUTING_KEY: &str = "notification.dlq";

/// RabbitMQ client owning one AMQP channel. Declares the full topology on
/// connect: a durable direct exchange with one durable queue per channel,
/// a matching consumerless retry queue per channel that dead-letters back
/// into the live exchange after the per-message TTL elapses, and a shared
/// DLX/DLQ for messages rejected outright.
#[derive(Clone)]
pub struct RabbitMqClient {
    channel: AmqpChannel,
    exchange_name: String,
    dlx_exchange_name: String,
    dlq_queue_name: String,
}

impl RabbitMqClient {
    pub async fn connect(config: &Config) -> Result<Self, Error> {
        let connection = Connection::connect(&config.rabbitmq_url, ConnectionProperties::default())
            .await
            .map_err(|e| anyhow!("Failed to connect to RabbitMQ: {}", e))?;

        let channel = connection
            .create_channel()
            .await
            .map_err(|_| anyhow!("RabbitMQ channel creation failed"))?;

        channel
            .basic_qos(config.prefetch_count, BasicQosOptions::default())
            .await
            .map_err(|_| anyhow!("Failed to set up QoS"))?;

        let client = Self {
            channel,
            exchange_name: config.exchange_name.clone(),
            dlx_exchange_name: config.dlx_exchange_name.clone(),
            dlq_queue_name: config.dlq_queue_name.clone(),
        };

        client.declare_topology().await?;

        info!("RabbitMQ connection established and topology declared");

        Ok(client)
    }

    async fn declare_topology(&self) -> Result<(), Error> {
        let durable_exchange = ExchangeDeclareOptions {
            durable: true,
            ..Default::default()
        };

        self.channel
            .exchange_declare(
                &self.exchange_name,
                ExchangeKind::Direct,
                durable_exchange,
                FieldTable::default(),
            )
            .await
            .map_err(|_| anyhow!("Failed to declare notification exchange"))?;

        self.channel
            .exchange_declare(
                &self.dlx_exchange_name,
                ExchangeKind::Direct,
                durable_exchange,
                FieldTable::default(),
            )
            .await
            .map_err(|_| anyhow!("Failed to declare dead letter exchange"))?;

        self.channel
            .queue_declare(
                &self.dlq_queue_name,
                QueueDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|_| anyhow!("Failed to declare dead letter queue"))?;

        self.channel
            .queue_bind(
                &self.dlq_queue_name,
                &self.dlx_exchange_name,
                DLQ_ROUTING_KEY,
                QueueBindOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|_| anyhow!("Failed to bind dead letter queue"))?;

        for channel in ALL_CHANNELS {
            self.declare_channel_queues(channel).await?;
        }

        Ok(())
    }

    async fn declare_channel_queues(&self, channel: Channel) -> Result<(), Error> {
        let names = topology(channel);

        let mut live_args = FieldTable::default();
        live_args.insert(
            "x-dead-letter-exchange".into(),
            AMQPValue::LongString(self.dlx_exchange_name.as_str().into()),
        );
        live_args.insert(
            "x-dead-letter-routing-key".into(),
            AMQPValue::LongString(DLQ_ROUTING_KEY.into()),
        );
        live_args.insert("x-max-priority".into(), AMQPValue::LongInt(10));

        self.channel
            .queue_declare(
                names.queue,
                QueueDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                live_args,
            )
            .await
            .map_err(|_| anyhow!("Failed to declare queue for {}", channel))?;

        self.channel
            .queue_bind(
                names.queue,
                &self.exchange_name,
                names.routing_key,
                QueueBindOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|_| anyhow!("Failed to bind queue for {}", channel))?;

        // Retry staging queue: no consumers; expired messages are routed
        // back onto the live queue by the broker.
        let mut retry_args = FieldTable::default();
        retry_args.insert(
            "x-dead-letter-exchange".into(),
            AMQPValue::LongString(self.exchange_name.as_str().into()),
        );
        retry_args.insert(
            "x-dead-letter-routing-key".into(),
            AMQPValue::LongString(names.routing_key.into()),
        );

        self.channel
            .queue_declare(
                names.retry_queue,
                QueueDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                retry_args,
            )
            .await
            .map_err(|_| anyhow!("Failed to declare retry queue for {}", channel))?;

        Ok(())
    }

    /// Publish a message onto its channel's live queue. Failures are not
    /// retried here; the caller decides whether to fail the channel.
    pub async fn publish(&self, message: &NotificationMessage) -> Result<(), Error> {
        let names = topology(message.channel);
        let payload = serde_json::to_vec(message)?;

        let properties = BasicProperties::default()
            .with_delivery_mode(2)
            .with_priority(message.priority)
            .with_headers(Self::message_headers(message));

        self.channel
            .basic_publish(
                &self.exchange_name,
                names.routing_key,
                BasicPublishOptions::default(),
                &payload,
                properties,
            )
            .await
            .map_err(|e| anyhow!("Failed to publish {} message: {}", message.channel, e))?;

        info!(
            notification_id = %message.notification_id,
            user_id = %message.user_id,
            channel = %message.channel,
            "Published notification message"
        );

        Ok(())
    }

    /// Publish a retry onto the channel's staging queue with a per-message
    /// TTL, so the broker holds it until the backoff elapses and then routes
    /// it back onto the live queue.
    pub async fn publish_retry(
        &self,
        message: &NotificationMessage,
        delay_ms: u64,
        next_retry_at: DateTime<Utc>,
    ) -> Result<(), Error> {
        let names = topology(message.channel);
        let payload = serde_json::to_vec(message)?;

        let mut headers = Self::message_headers(message);
        headers.insert(
            "x-retry-count".into(),
            AMQPValue::LongUInt(message.retry_count),
        );
        headers.insert(
            "x-next-retry-at".into(),
            AMQPValue::LongString(
                next_retry_at
                    .to_rfc3339_opts(SecondsFormat::Millis, true)
                    .into(),
            ),
        );

        let properties = BasicProperties::default()
            .with_delivery_mode(2)
            .with_priority(message.priority)
            .with_expiration(delay_ms.to_string().into())
            .with_headers(headers);

        self.channel
            .basic_publish(
                "",
                names.retry_queue,
                BasicPublishOptions::default(),
                &payload,
                properties,
            )
            .await
            .map_err(|e| anyhow!("Failed to publish retry message: {}", e))?;

        debug!(
            notification_id = %message.notification_id,
            channel = %message.channel,
            delay_ms,
            retry_count = message.retry_count,
            "Staged retry message"
        );

        Ok(())
    }

    pub async fn create_consumer(
        &self,
        channel: Channel,
        consumer_tag: &str,
    ) -> Result<Consumer, Error> {
        let names = topology(channel);

        let consumer = self
            .channel
            .basic_consume(
                names.queue,
                consumer_tag,
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|_| anyhow!("Failed to create consumer for {}", channel))?;

        info!(channel = %channel, consumer_tag, "Consumer created");

        Ok(consumer)
    }

    pub async fn acknowledge(&self, delivery_tag: u64) -> Result<(), Error> {
        self.channel
            .basic_ack(delivery_tag, BasicAckOptions::default())
            .await
            .map_err(|_| anyhow!("Failed to acknowledge message"))?;

        Ok(())
    }

    pub async fn reject(&self, delivery_tag: u64, requeue: bool) -> Result<(), Error> {
        self.channel
            .basic_reject(delivery_tag, BasicRejectOptions { requeue })
            .await
            .map_err(|_| anyhow!("Failed to reject message"))?;

        Ok(())
    }

    fn message_headers(message: &NotificationMessage) -> FieldTable {
        let mut headers = FieldTable::default();
        headers.insert(
            "x-channel".into(),
            AMQPValue::LongString(message.channel.as_str().into()),
        );
        headers.insert(
            "x-notification-id".into(),
            AMQPValue::LongString(message.notification_id.to_string().into()),
        );
        headers.insert(
            "x-user-id".into(),
            AMQPValue::LongString(message.user_id.to_string().into()),
        );
        headers
    }
}
