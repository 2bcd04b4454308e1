use notification_service::{classifier, models::provider::ErrorType};

/// Test: Known permanent error codes are classified as permanent
#[test]
fn test_permanent_error_codes() {
    for code in ["21211", "21610", "30007", "550", "554", "UNREGISTERED", "BLOCKED"] {
        assert_eq!(
            classifier::classify(Some(code), "some provider failure"),
            ErrorType::Permanent,
            "code {} should be permanent",
            code
        );
    }
}

/// Test: Error code matching is case-insensitive
#[test]
fn test_error_code_case_insensitive() {
    assert_eq!(
        classifier::classify(Some("unregistered"), "token gone"),
        ErrorType::Permanent
    );
    assert_eq!(
        classifier::classify(Some("Invalid_Argument"), "bad payload"),
        ErrorType::Permanent
    );
}

/// Test: Permanent message patterns are detected without an error code
#[test]
fn test_permanent_message_patterns() {
    for message in [
        "Invalid phone number",
        "recipient not found",
        "user has unsubscribed",
        "address is blacklisted",
        "permission denied for sender",
        "number does not exist",
    ] {
        assert_eq!(
            classifier::classify(None, message),
            ErrorType::Permanent,
            "message '{}' should be permanent",
            message
        );
    }
}

/// Test: Network and throttling failures stay retriable
#[test]
fn test_retriable_network_messages() {
    for message in [
        "connection refused",
        "request timed out",
        "rate limit exceeded",
        "too many requests",
        "service temporarily unavailable",
    ] {
        assert_eq!(
            classifier::classify(None, message),
            ErrorType::Retriable,
            "message '{}' should be retriable",
            message
        );
    }
}

/// Test: Unknown errors default to retriable so nothing is silently dropped
#[test]
fn test_unknown_errors_default_to_retriable() {
    assert_eq!(
        classifier::classify(None, "something inexplicable happened"),
        ErrorType::Retriable
    );
    assert_eq!(
        classifier::classify(Some("99999"), "weird state"),
        ErrorType::Retriable
    );
    assert_eq!(classifier::classify(None, ""), ErrorType::Retriable);
}

/// Test: A permanent code wins over a retriable-looking message
#[test]
fn test_code_match_takes_precedence_over_message() {
    assert_eq!(
        classifier::classify(Some("21211"), "connection reset while sending"),
        ErrorType::Permanent
    );
}

/// Test: The shared permanent code predicate matches the classifier
#[test]
fn test_is_permanent_code() {
    assert!(classifier::is_permanent_code("21211"));
    assert!(classifier::is_permanent_code("not_found"));
    assert!(!classifier::is_permanent_code("20429"));
}
