//! Notification payload types.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::jsonrpc::RequestId;

/// `notifications/cancelled` payload.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CancelledNotification {
    /// ID of the request being cancelled.
    pub request_id: RequestId,
    /// Optional reason.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancelled_notification_parses() {
        let parsed: CancelledNotification =
            serde_json::from_str(r#"{"requestId": 3, "reason": "user abort"}"#).unwrap();
        assert!(matches!(parsed.request_id, RequestId::Number(3)));
        assert_eq!(parsed.reason.as_deref(), Some("user abort"));
    }
}
