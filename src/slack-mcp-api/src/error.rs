//! Slack error types with a stable code set.
//!
//! Every failure a tool can surface maps onto one of the codes below, so
//! clients can branch on `code` without parsing prose.

use thiserror::Error;

/// Errors from the Slack Web API surface.
#[derive(Error, Debug, Clone)]
pub enum SlackError {
    /// HTTP 429 from Slack.
    #[error("Rate limited, retry after {retry_after_secs} seconds")]
    RateLimited {
        /// Seconds to wait before retrying.
        retry_after_secs: u64,
    },

    /// Slack returned `ok: false` with an error code.
    #[error("{message}")]
    Api {
        /// Stable error code.
        code: String,
        /// Message with the offending id spliced in.
        message: String,
    },

    /// Transport-level failure (connect, TLS, 5xx).
    #[error("Network error: {0}")]
    Network(String),

    /// Request deadline exceeded.
    #[error("Request timed out: {0}")]
    Timeout(String),

    /// Response body was not the JSON we expected.
    #[error("Invalid JSON from Slack: {0}")]
    Json(String),

    /// No client is bound yet.
    #[error("Slack client is not configured")]
    NotConfigured,
}

/// Codes passed through verbatim; anything else becomes `unknown_error`.
const KNOWN_CODES: &[&str] = &[
    "rate_limited",
    "invalid_auth",
    "missing_scope",
    "channel_not_found",
    "user_not_found",
    "not_in_channel",
    "thread_not_found",
    "internal_error",
    "unknown_error",
];

impl SlackError {
    /// Build an API error from Slack's error string, splicing the
    /// offending id into the message.
    pub fn api(slack_code: &str, context: &str) -> Self {
        let code = match slack_code {
            "account_inactive" | "token_revoked" | "token_expired" => "invalid_auth".to_string(),
            known if KNOWN_CODES.contains(&known) => known.to_string(),
            _ => "unknown_error".to_string(),
        };
        let message = match slack_code {
            "invalid_auth" | "account_inactive" | "token_revoked" => {
                "Invalid or revoked authentication credentials".to_string()
            }
            "missing_scope" => format!("Token is missing a required OAuth scope for {context}"),
            "channel_not_found" => format!("Channel not found: {context}"),
            "user_not_found" => format!("User not found: {context}"),
            "not_in_channel" => format!("Not a member of channel: {context}"),
            "thread_not_found" => format!("Thread not found: {context}"),
            "internal_error" => format!("Slack internal error during {context}"),
            other => format!("Slack error '{other}' during {context}"),
        };
        Self::Api { code, message }
    }

    /// The stable code for this error.
    pub fn code(&self) -> &str {
        match self {
            Self::RateLimited { .. } => "rate_limited",
            Self::Api { code, .. } => code,
            Self::Network(_) | Self::Timeout(_) => "internal_error",
            Self::Json(_) => "unknown_error",
            Self::NotConfigured => "invalid_auth",
        }
    }

    /// Whether retrying the same call may succeed.
    pub fn retryable(&self) -> bool {
        match self {
            Self::RateLimited { .. } | Self::Network(_) | Self::Timeout(_) => true,
            Self::Api { code, .. } => code == "rate_limited" || code == "internal_error",
            Self::Json(_) | Self::NotConfigured => false,
        }
    }

    /// Seconds the caller should wait, when Slack said so.
    pub fn retry_after_secs(&self) -> Option<u64> {
        match self {
            Self::RateLimited { retry_after_secs } => Some(*retry_after_secs),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for SlackError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            SlackError::Timeout(err.to_string())
        } else {
            SlackError::Network(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_code_passthrough() {
        let err = SlackError::api("channel_not_found", "general");
        assert_eq!(err.code(), "channel_not_found");
        assert!(err.to_string().contains("general"));
        assert!(!err.retryable());
    }

    #[test]
    fn test_unknown_code_collapses() {
        let err = SlackError::api("snail_mail_only", "conversations.history");
        assert_eq!(err.code(), "unknown_error");
        assert!(err.to_string().contains("snail_mail_only"));
    }

    #[test]
    fn test_rate_limited_retryable_with_delay() {
        let err = SlackError::RateLimited {
            retry_after_secs: 12,
        };
        assert_eq!(err.code(), "rate_limited");
        assert!(err.retryable());
        assert_eq!(err.retry_after_secs(), Some(12));
    }

    #[test]
    fn test_internal_error_retryable() {
        let err = SlackError::api("internal_error", "users.list");
        assert!(err.retryable());
    }

    #[test]
    fn test_revoked_variants_map_to_invalid_auth() {
        let err = SlackError::api("account_inactive", "auth.test");
        assert_eq!(err.code(), "invalid_auth");
        assert!(err.to_string().contains("revoked"));
    }
}
