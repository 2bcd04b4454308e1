use tracing::debug;

use crate::models::provider::ErrorType;

/// Provider error codes that are never worth retrying. The union of the
/// per-provider terminal codes (Twilio, SMTP reply codes, FCM) plus generic
/// ones.
const PERMANENT_ERROR_CODES: &[&str] = &[
    // Twilio
    "21211", // Invalid phone number
    "21612", // Phone number not SMS capable
    "21614", // Invalid mobile number
    "21408", // Permission to send not enabled
    "21610", // Unsubscribed recipient
    "30004", // Message blocked
    "30005", // Unknown destination
    "30006", // Landline or unreachable
    "30007", // Message filtered
    // SMTP reply codes
    "550", // Mailbox unavailable
    "551", // User not local
    "552", // Exceeded storage
    "553", // Mailbox name not allowed
    "554", // Transaction failed
    // FCM
    "INVALID_ARGUMENT",
    "NOT_FOUND",
    "UNREGISTERED",
    // Generic
    "INVALID_RECIPIENT",
    "BLOCKED",
    "UNSUBSCRIBED",
];

/// Message fragments that indicate a permanent failure.
const PERMANENT_ERROR_PATTERNS: &[&str] = &[
    "invalid",
    "not found",
    "blocked",
    "unsubscribed",
    "blacklisted",
    "opt-out",
    "unregistered",
    "does not exist",
    "permission denied",
];

/// Message fragments that indicate a transient failure.
const RETRIABLE_ERROR_PATTERNS: &[&str] = &[
    "rate limit",
    "too many requests",
    "timeout",
    "timed out",
    "connection",
    "temporarily unavailable",
];

/// Classify a provider failure as retriable or permanent.
///
/// Order matters: an exact permanent code match wins, then permanent message
/// patterns, then retriable network patterns. Anything unrecognized is
/// assumed transient, so a deliverable notification is never dropped on an
/// unknown error.
pub fn classify(error_code: Option<&str>, error_message: &str) -> ErrorType {
    if let Some(code) = error_code {
        let upper = code.to_uppercase();
        if PERMANENT_ERROR_CODES.contains(&upper.as_str()) {
            debug!(error_code = code, "Classified as PERMANENT based on error code");
            return ErrorType::Permanent;
        }
    }

    let lower = error_message.to_lowercase();

    for pattern in PERMANENT_ERROR_PATTERNS {
        if lower.contains(pattern) {
            debug!(pattern, "Classified as PERMANENT based on error message pattern");
            return ErrorType::Permanent;
        }
    }

    if is_retriable_message(&lower) {
        debug!("Classified as RETRIABLE based on error message");
        return ErrorType::Retriable;
    }

    debug!(error_message, "Classified as RETRIABLE by default");
    ErrorType::Retriable
}

/// Whether an already-lowercased message looks like a transient
/// network/throttling failure.
fn is_retriable_message(lower_message: &str) -> bool {
    RETRIABLE_ERROR_PATTERNS
        .iter()
        .any(|pattern| lower_message.contains(pattern))
}

/// Whether a code is in the shared permanent set. Providers with their own
/// authoritative code lists should prefer those.
pub fn is_permanent_code(error_code: &str) -> bool {
    PERMANENT_ERROR_CODES.contains(&error_code.to_uppercase().as_str())
}
