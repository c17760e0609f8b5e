//! Uniform tool response shaping.
//!
//! Success: the stripped payload as both serialized text content and
//! `structuredContent`. Failure: `Error: <code> - <message>` with
//! `isError`, plus one entry in the error log.

use serde::de::DeserializeOwned;
use serde_json::Value;

use slack_mcp_api::SlackError;
use slack_mcp_api::format::{restore_message_text, strip_empty_object};
use slack_mcp_common::ErrorLogEntry;
use slack_mcp_types::CallToolResult;

use crate::context::AppContext;

/// Strip the payload and answer with it.
pub fn success(value: Value) -> CallToolResult {
    CallToolResult::structured(strip_empty_object(&value))
}

/// Strip the payload, then reinstate `text: ""` on each record under
/// `message_key` - stripping removes empty strings but message records
/// must always carry `text`.
pub fn success_with_messages(value: Value, message_key: &str) -> CallToolResult {
    let mut stripped = strip_empty_object(&value);
    if let Some(messages) = stripped.get_mut(message_key) {
        restore_message_text(messages);
    }
    CallToolResult::structured(stripped)
}

/// Fail with a stable code, logging the failure.
pub fn fail(
    ctx: &AppContext,
    tool: &str,
    code: &str,
    message: &str,
    retry_after_secs: Option<u64>,
    retryable: bool,
) -> CallToolResult {
    ctx.errorlog.log(
        ErrorLogEntry::error("tools", code, message)
            .with_tool(tool)
            .with_retryable(retryable),
    );

    let mut text = format!("Error: {code} - {message}");
    if let Some(secs) = retry_after_secs {
        text.push_str(&format!(". Please retry after {secs} seconds."));
    }
    CallToolResult::error(text)
}

/// Fail from a Slack API error.
pub fn fail_slack(ctx: &AppContext, tool: &str, err: &SlackError) -> CallToolResult {
    fail(
        ctx,
        tool,
        err.code(),
        &err.to_string(),
        err.retry_after_secs(),
        err.retryable(),
    )
}

/// Fail a schema violation.
pub fn invalid_params(ctx: &AppContext, tool: &str, message: &str) -> CallToolResult {
    fail(ctx, tool, "invalid_params", message, None, false)
}

/// Deserialize tool arguments, mapping serde failures to a schema-violation
/// message.
pub fn parse_args<T: DeserializeOwned>(arguments: Value) -> Result<T, String> {
    serde_json::from_value(arguments).map_err(|e| format!("invalid arguments: {e}"))
}
