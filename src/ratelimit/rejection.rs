//! The admission-denied signal returned to callers.

use serde::Serialize;
use thiserror::Error;

/// HTTP-style "too many requests" status carried by every rejection.
pub const TOO_MANY_REQUESTS: u16 = 429;

/// Message used by the global address tier.
pub const GLOBAL_REJECTION_MESSAGE: &str = "Too many requests from this IP address.";

/// A request was refused by one of the limiters.
///
/// Serializes to `{"statusCode":429,"message":...,"retryAfter":...}`, with
/// `retryAfter` left out when the tier gives no backoff hint.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
#[error("{message}")]
pub struct AdmissionDenied {
    pub status_code: u16,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<u64>,
}

impl AdmissionDenied {
    /// Rejection from the per-operation tier.
    pub fn operation(custom_message: Option<&str>, retry_after_secs: u64) -> Self {
        let message = match custom_message {
            Some(message) => message.to_string(),
            None => format!(
                "Too many requests. Please try again in {} seconds.",
                retry_after_secs
            ),
        };
        Self {
            status_code: TOO_MANY_REQUESTS,
            message,
            retry_after: Some(retry_after_secs),
        }
    }

    /// Rejection from the global address tier.
    pub fn global() -> Self {
        Self {
            status_code: TOO_MANY_REQUESTS,
            message: GLOBAL_REJECTION_MESSAGE.to_string(),
            retry_after: None,
        }
    }

    /// JSON body for the transport response.
    pub fn to_json(&self) -> String {
        // Plain struct of strings and integers, serialization cannot fail.
        serde_json::to_string(self).unwrap_or_default()
    }
}
