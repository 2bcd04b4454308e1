use std::collections::HashMap;

use chrono::{Duration, Utc};
use notification_service::models::{
    channel::{ALL_CHANNELS, Channel, topology},
    dlq::DeadLetterEntry,
    message::NotificationMessage,
    notification::{Notification, NotificationStatus},
    request::{NotificationRequest, RecipientDetails},
};
use serde_json::json;
use uuid::Uuid;

fn sample_notification(channel: Channel) -> Notification {
    Notification::new(
        Uuid::new_v4(),
        channel,
        "WELCOME".to_string(),
        Some("user@example.com".to_string()),
        Some("Welcome".to_string()),
        "<p>Hello</p>".to_string(),
        Some(json!({"name": "Ada"})),
        None,
        5,
    )
}

/// Test: New notifications start PENDING with zero retries
#[test]
fn test_new_notification_defaults() {
    let notification = sample_notification(Channel::Email);

    assert_eq!(notification.status, NotificationStatus::Pending);
    assert_eq!(notification.retry_count, 0);
    assert!(!notification.is_read);
    assert!(notification.next_retry_at.is_none());
    assert!(notification.delivered_at.is_none());
    assert!(!notification.status.is_terminal());
}

/// Test: Priority is clamped to the 0-10 range
#[test]
fn test_priority_clamped() {
    let notification = Notification::new(
        Uuid::new_v4(),
        Channel::Sms,
        "OTP".to_string(),
        Some("+1555".to_string()),
        None,
        "code".to_string(),
        None,
        None,
        42,
    );

    assert_eq!(notification.priority, 10);
}

/// Test: Retry transition increments the count and schedules the next attempt
#[test]
fn test_increment_retry_transition() {
    let mut notification = sample_notification(Channel::Email);
    let next = Utc::now() + Duration::seconds(30);

    notification.increment_retry(next);
    notification.increment_retry(next + Duration::seconds(60));

    assert_eq!(notification.status, NotificationStatus::Retry);
    assert_eq!(notification.retry_count, 2);
    assert!(notification.next_retry_at.is_some());
    assert!(!notification.status.is_terminal());
}

/// Test: Delivery sets terminal state with timestamps and clears the schedule
#[test]
fn test_mark_delivered_is_terminal() {
    let mut notification = sample_notification(Channel::Email);
    notification.increment_retry(Utc::now());

    notification.mark_delivered("ext-1".to_string(), Some(r#"{"ok":true}"#.to_string()));

    assert_eq!(notification.status, NotificationStatus::Delivered);
    assert!(notification.status.is_terminal());
    assert!(notification.delivered_at.is_some());
    assert!(notification.sent_at.is_some());
    assert_eq!(notification.external_id.as_deref(), Some("ext-1"));
    assert!(notification.next_retry_at.is_none(), "schedule must clear on terminal state");
}

/// Test: Failure transitions carry the reason and terminal status
#[test]
fn test_mark_failed_transitions() {
    let mut notification = sample_notification(Channel::Push);

    notification.mark_failed(
        "Permanent error: UNREGISTERED".to_string(),
        Some("UNREGISTERED".to_string()),
        NotificationStatus::FailedPermanent,
    );

    assert_eq!(notification.status, NotificationStatus::FailedPermanent);
    assert!(notification.status.is_terminal());
    assert!(notification.failed_at.is_some());
    assert_eq!(notification.retry_count, 0, "permanent failure keeps retry count");
}

/// Test: Every status survives the text round-trip used by the store
#[test]
fn test_status_string_round_trip() {
    for status in [
        NotificationStatus::Pending,
        NotificationStatus::Processing,
        NotificationStatus::Retry,
        NotificationStatus::Delivered,
        NotificationStatus::FailedPermanent,
        NotificationStatus::FailedMaxRetry,
    ] {
        assert_eq!(
            NotificationStatus::from_str_value(status.as_str()),
            Some(status)
        );
    }

    assert_eq!(NotificationStatus::from_str_value("BOGUS"), None);
}

/// Test: Channels survive the text round-trip and map to unique topology
#[test]
fn test_channel_round_trip_and_topology() {
    let mut queues = std::collections::HashSet::new();

    for channel in ALL_CHANNELS {
        assert_eq!(Channel::from_str_value(channel.as_str()), Some(channel));

        let names = topology(channel);
        assert!(names.queue.starts_with("notification."));
        assert!(names.retry_queue.ends_with(".retry.queue"));
        assert!(queues.insert(names.queue), "queue names must be unique");
    }

    assert!(!Channel::InApp.requires_recipient());
    assert!(Channel::Email.requires_recipient());
}

/// Test: The wire message is fully re-derivable from the entity
#[test]
fn test_message_rederived_from_notification() {
    let notification = sample_notification(Channel::Email);

    let message = NotificationMessage::from_notification(&notification);

    assert_eq!(message.notification_id, notification.id);
    assert_eq!(message.user_id, notification.user_id);
    assert_eq!(message.channel, Channel::Email);
    assert_eq!(message.recipient, notification.recipient);
    assert_eq!(message.rendered_content, notification.rendered_content);
    assert_eq!(message.retry_count, 0);
    assert_eq!(message.template_data.get("name"), Some(&json!("Ada")));
}

/// Test: Queue payloads survive serialization with defaults applied
#[test]
fn test_message_serde_round_trip() {
    let message = NotificationMessage::from_notification(&sample_notification(Channel::Sms));

    let payload = serde_json::to_vec(&message).unwrap();
    let decoded: NotificationMessage = serde_json::from_slice(&payload).unwrap();

    assert_eq!(decoded.notification_id, message.notification_id);
    assert_eq!(decoded.channel, Channel::Sms);
    assert_eq!(decoded.priority, 5);

    // Older producers may omit retry metadata entirely.
    let minimal = json!({
        "notification_id": Uuid::new_v4(),
        "user_id": Uuid::new_v4(),
        "channel": "IN_APP",
        "template_code": "PING",
        "recipient": null,
        "subject": null,
        "rendered_content": "hi"
    });
    let decoded: NotificationMessage = serde_json::from_value(minimal).unwrap();
    assert_eq!(decoded.retry_count, 0);
    assert_eq!(decoded.priority, 5);
    assert_eq!(decoded.channel, Channel::InApp);
}

/// Test: Recipient resolution per channel, with WhatsApp and push fallbacks
#[test]
fn test_recipient_resolution() {
    let details = RecipientDetails {
        email: Some("a@example.com".to_string()),
        phone: Some("+15550001111".to_string()),
        whatsapp_number: None,
        fcm_token: None,
        device_token: Some("device-token-123".to_string()),
    };

    assert_eq!(
        details.recipient_for(Channel::Email).as_deref(),
        Some("a@example.com")
    );
    assert_eq!(
        details.recipient_for(Channel::Sms).as_deref(),
        Some("+15550001111")
    );
    // WhatsApp falls back to the phone number
    assert_eq!(
        details.recipient_for(Channel::Whatsapp).as_deref(),
        Some("+15550001111")
    );
    // Push falls back to the generic device token
    assert_eq!(
        details.recipient_for(Channel::Push).as_deref(),
        Some("device-token-123")
    );
    assert_eq!(details.recipient_for(Channel::InApp), None);

    let blank = RecipientDetails {
        email: Some("   ".to_string()),
        ..Default::default()
    };
    assert_eq!(blank.recipient_for(Channel::Email), None);
}

/// Test: Requests default priority and rate-limit behavior when omitted
#[test]
fn test_request_deserialization_defaults() {
    let request: NotificationRequest = serde_json::from_value(json!({
        "user_id": Uuid::new_v4(),
        "channels": ["EMAIL", "IN_APP"],
        "template_code": "WELCOME"
    }))
    .unwrap();

    assert_eq!(request.priority, 5);
    assert!(!request.skip_rate_limit);
    assert!(request.template_data.is_empty());
    assert_eq!(request.channels, vec![Channel::Email, Channel::InApp]);
}

/// Test: A dead-letter entry snapshots the failed notification
#[test]
fn test_dead_letter_snapshot() {
    let mut notification = sample_notification(Channel::Sms);
    notification.error_code = Some("30004".to_string());
    notification.mark_failed(
        "Permanent error: Message blocked".to_string(),
        Some("30004".to_string()),
        NotificationStatus::FailedPermanent,
    );

    let entry = DeadLetterEntry::from_notification(
        &notification,
        "Permanent error: Message blocked".to_string(),
    );

    assert_eq!(entry.notification_id, notification.id);
    assert_eq!(entry.user_id, notification.user_id);
    assert_eq!(entry.channel, Channel::Sms);
    assert_eq!(entry.retry_count, notification.retry_count);
    assert_eq!(entry.failure_reason, "Permanent error: Message blocked");
    assert_eq!(entry.last_error_code.as_deref(), Some("30004"));
    assert_eq!(entry.original_created_at, notification.created_at);
    assert!(notification.status.is_terminal());
}

/// Test: Template data maps keep arbitrary JSON values through the request
#[test]
fn test_request_template_data_values() {
    let mut template_data = HashMap::new();
    template_data.insert("amount".to_string(), json!(100.50));
    template_data.insert("name".to_string(), json!("John Doe"));

    let request = NotificationRequest {
        user_id: Uuid::new_v4(),
        channels: vec![Channel::Email],
        template_code: "RECEIPT".to_string(),
        recipient_details: None,
        template_data,
        subject: None,
        metadata: None,
        priority: 5,
        skip_rate_limit: false,
    };

    let round_tripped: NotificationRequest =
        serde_json::from_str(&serde_json::to_string(&request).unwrap()).unwrap();

    assert_eq!(round_tripped.template_data.get("amount"), Some(&json!(100.50)));
    assert_eq!(round_tripped.template_data.get("name"), Some(&json!("John Doe")));
}
