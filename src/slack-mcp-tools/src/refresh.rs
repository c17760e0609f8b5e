//! `refresh_credentials` - manually rotate the user session.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::warn;

use slack_mcp_common::ErrorLogEntry;
use slack_mcp_server::ToolHandler;
use slack_mcp_types::{CallToolResult, Tool, ToolAnnotations, ToolInputSchema};

use crate::context::AppContext;
use crate::respond;

/// `refresh_credentials`.
///
/// Unlike the read tools this one always answers with a structured
/// `{success, …}` payload; a failed refresh is an expected outcome the
/// client inspects, not a protocol-level error.
pub struct RefreshCredentialsTool {
    ctx: Arc<AppContext>,
}

impl RefreshCredentialsTool {
    /// Wire the tool to a context.
    pub fn new(ctx: Arc<AppContext>) -> Self {
        Self { ctx }
    }

    fn unavailable(&self, message: &str) -> CallToolResult {
        warn!("refresh_credentials unavailable: {message}");
        self.ctx.errorlog.log(
            ErrorLogEntry::warn("refresh", "REFRESH_NOT_AVAILABLE", message)
                .with_tool("refresh_credentials")
                .with_retryable(false),
        );
        respond::success(json!({
            "success": false,
            "error": {
                "code": "REFRESH_NOT_AVAILABLE",
                "message": message,
                "retryable": false,
            }
        }))
    }
}

#[async_trait]
impl ToolHandler for RefreshCredentialsTool {
    fn tool(&self) -> Tool {
        Tool::new(
            "refresh_credentials",
            "Refresh the Slack session credentials now",
        )
        .with_schema(ToolInputSchema::object())
        .with_annotations(ToolAnnotations::idempotent_write().open_world())
    }

    async fn execute(&self, _arguments: Value) -> Result<CallToolResult> {
        if !self.ctx.auth.is_user() {
            return Ok(self.unavailable(
                "Credential refresh is only available with user authentication (xoxc token)",
            ));
        }
        let Some(scheduler) = self.ctx.scheduler.clone().filter(|_| self.ctx.is_refresh_available())
        else {
            return Ok(self.unavailable(
                "Credential refresh is not configured; ensure SLACK_WORKSPACE is set and refresh is enabled",
            ));
        };

        match scheduler.trigger_manual().await {
            Ok(outcome) => Ok(respond::success(json!({
                "success": true,
                "message": "Credentials refreshed successfully",
                "refreshedAt": outcome.refreshed_at.to_rfc3339(),
                "totalRefreshes": outcome.total_refreshes,
            }))),
            Err(e) => Ok(respond::success(json!({
                "success": false,
                "error": {
                    "code": e.code.as_str(),
                    "message": e.message,
                    "retryable": e.is_retryable(),
                }
            }))),
        }
    }
}
