//! Refresh error codes and their retryable classification.

use thiserror::Error;

use crate::store::StorageError;

/// Stable refresh error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshErrorCode {
    /// Transport failure reaching the workspace page.
    NetworkError,
    /// HTTP 429 from the workspace page.
    RateLimited,
    /// Credential file load or save failed.
    StorageError,
    /// Another refresh holds the guard.
    RefreshInProgress,
    /// Slack no longer honors the session.
    SessionRevoked,
    /// The page or validation response was not what we expect.
    InvalidResponse,
    /// Refresh is not possible in the current configuration.
    RefreshNotAvailable,
    /// Anything else.
    Unknown,
}

impl RefreshErrorCode {
    /// The wire representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NetworkError => "NETWORK_ERROR",
            Self::RateLimited => "RATE_LIMITED",
            Self::StorageError => "STORAGE_ERROR",
            Self::RefreshInProgress => "REFRESH_IN_PROGRESS",
            Self::SessionRevoked => "SESSION_REVOKED",
            Self::InvalidResponse => "INVALID_RESPONSE",
            Self::RefreshNotAvailable => "REFRESH_NOT_AVAILABLE",
            Self::Unknown => "UNKNOWN",
        }
    }

    /// Whether the retry loop continues after this code.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::NetworkError | Self::RateLimited | Self::StorageError | Self::RefreshInProgress => {
                true
            }
            Self::SessionRevoked
            | Self::InvalidResponse
            | Self::RefreshNotAvailable
            | Self::Unknown => false,
        }
    }
}

impl std::fmt::Display for RefreshErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A refresh failure with its classification.
#[derive(Error, Debug, Clone)]
#[error("{code}: {message}")]
pub struct RefreshError {
    /// Stable code.
    pub code: RefreshErrorCode,
    /// Human-readable message.
    pub message: String,
}

impl RefreshError {
    /// Create an error.
    pub fn new(code: RefreshErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Whether the retry loop continues after this error.
    pub fn is_retryable(&self) -> bool {
        self.code.is_retryable()
    }
}

impl From<StorageError> for RefreshError {
    fn from(err: StorageError) -> Self {
        Self::new(RefreshErrorCode::StorageError, err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification_table() {
        let retryable = [
            RefreshErrorCode::NetworkError,
            RefreshErrorCode::RateLimited,
            RefreshErrorCode::StorageError,
            RefreshErrorCode::RefreshInProgress,
        ];
        let terminal = [
            RefreshErrorCode::SessionRevoked,
            RefreshErrorCode::InvalidResponse,
            RefreshErrorCode::RefreshNotAvailable,
            RefreshErrorCode::Unknown,
        ];
        for code in retryable {
            assert!(code.is_retryable(), "{code} should be retryable");
        }
        for code in terminal {
            assert!(!code.is_retryable(), "{code} should be terminal");
        }
    }

    #[test]
    fn test_wire_codes() {
        assert_eq!(RefreshErrorCode::SessionRevoked.as_str(), "SESSION_REVOKED");
        assert_eq!(RefreshErrorCode::RefreshInProgress.as_str(), "REFRESH_IN_PROGRESS");
    }

    #[test]
    fn test_display_includes_code_and_message() {
        let err = RefreshError::new(RefreshErrorCode::RateLimited, "slow down");
        assert_eq!(err.to_string(), "RATE_LIMITED: slow down");
    }

    #[test]
    fn test_storage_error_conversion() {
        let err: RefreshError =
            StorageError::Io("disk on fire".to_string()).into();
        assert_eq!(err.code, RefreshErrorCode::StorageError);
        assert!(err.is_retryable());
    }
}
