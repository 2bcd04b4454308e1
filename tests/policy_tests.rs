use std::time::Duration;

use notification_service::{
    models::{notification::NotificationStatus, provider::ErrorType, retry::RetryConfig},
    retry::{RetryDecision, backoff_delay, decide},
};

fn default_config() -> RetryConfig {
    RetryConfig::default()
}

/// Test: Backoff for attempt n equals min(initial * multiplier^n, cap)
#[test]
fn test_backoff_delay_follows_exponential_formula() {
    let config = default_config();

    assert_eq!(backoff_delay(&config, 0), Duration::from_millis(1_000));
    assert_eq!(backoff_delay(&config, 1), Duration::from_millis(2_000));
    assert_eq!(backoff_delay(&config, 5), Duration::from_millis(32_000));
    assert_eq!(backoff_delay(&config, 20), Duration::from_millis(3_600_000));
}

/// Test: Backoff respects a custom multiplier and cap
#[test]
fn test_backoff_delay_custom_config() {
    let config = RetryConfig {
        max_attempts: 5,
        initial_backoff_ms: 100,
        multiplier: 3.0,
        max_backoff_ms: 1_500,
    };

    assert_eq!(backoff_delay(&config, 0), Duration::from_millis(100));
    assert_eq!(backoff_delay(&config, 1), Duration::from_millis(300));
    assert_eq!(backoff_delay(&config, 2), Duration::from_millis(900));
    assert_eq!(backoff_delay(&config, 3), Duration::from_millis(1_500));
    assert_eq!(backoff_delay(&config, 30), Duration::from_millis(1_500));
}

/// Test: A permanent error dead-letters on first occurrence, retry count 0
#[test]
fn test_permanent_error_dead_letters_immediately() {
    let config = default_config();

    let decision = decide(&config, 0, ErrorType::Permanent, "Unsubscribed recipient");

    match decision {
        RetryDecision::DeadLetter { status, reason } => {
            assert_eq!(status, NotificationStatus::FailedPermanent);
            assert_eq!(reason, "Permanent error: Unsubscribed recipient");
        }
        RetryDecision::Retry { .. } => panic!("permanent error must not retry"),
    }
}

/// Test: Retriable errors back off while attempts remain
#[test]
fn test_retriable_error_retries_with_backoff() {
    let config = default_config();

    let decision = decide(&config, 3, ErrorType::Retriable, "connection reset");

    assert_eq!(
        decision,
        RetryDecision::Retry {
            delay: Duration::from_millis(8_000)
        }
    );
}

/// Test: With max_attempts=3 the third failure is final, no fourth attempt
#[test]
fn test_final_failure_dead_letters_at_max_attempts() {
    let config = RetryConfig {
        max_attempts: 3,
        ..default_config()
    };

    // First and second failures still schedule a retry.
    assert!(matches!(
        decide(&config, 0, ErrorType::Retriable, "timeout"),
        RetryDecision::Retry { .. }
    ));
    assert!(matches!(
        decide(&config, 1, ErrorType::Retriable, "timeout"),
        RetryDecision::Retry { .. }
    ));

    // The third failure consumes the last attempt.
    let decision = decide(&config, 2, ErrorType::Retriable, "still timing out");

    match decision {
        RetryDecision::DeadLetter { status, reason } => {
            assert_eq!(status, NotificationStatus::FailedMaxRetry);
            assert_eq!(reason, "Max retry attempts reached. Last error: still timing out");
        }
        RetryDecision::Retry { .. } => panic!("exhausted notification must not retry"),
    }
}

/// Test: An already-exhausted notification dead-letters on any failure
#[test]
fn test_exhausted_retries_dead_letter() {
    let config = RetryConfig {
        max_attempts: 3,
        ..default_config()
    };

    let decision = decide(&config, 3, ErrorType::Retriable, "still timing out");

    match decision {
        RetryDecision::DeadLetter { status, .. } => {
            assert_eq!(status, NotificationStatus::FailedMaxRetry);
        }
        RetryDecision::Retry { .. } => panic!("exhausted notification must not retry"),
    }
}

/// Test: Once exhausted, even a permanent error resolves as FAILED_MAX_RETRY
#[test]
fn test_exhaustion_wins_status_over_permanent() {
    let config = RetryConfig {
        max_attempts: 3,
        ..default_config()
    };

    let decision = decide(&config, 3, ErrorType::Permanent, "blocked");

    match decision {
        RetryDecision::DeadLetter { status, reason } => {
            assert_eq!(status, NotificationStatus::FailedMaxRetry);
            assert!(reason.starts_with("Permanent error:"));
        }
        RetryDecision::Retry { .. } => panic!("must dead-letter"),
    }
}

/// Test: A permanent error below the budget keeps FAILED_PERMANENT status
#[test]
fn test_permanent_error_mid_budget_status() {
    let config = RetryConfig {
        max_attempts: 3,
        ..default_config()
    };

    let decision = decide(&config, 2, ErrorType::Permanent, "unsubscribed");

    match decision {
        RetryDecision::DeadLetter { status, .. } => {
            assert_eq!(status, NotificationStatus::FailedPermanent);
        }
        RetryDecision::Retry { .. } => panic!("must dead-letter"),
    }
}
