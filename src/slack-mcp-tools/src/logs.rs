//! Error-log tools: `get_error_logs`, `clear_error_logs`.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{Value, json};

use slack_mcp_common::LogLevel;
use slack_mcp_server::ToolHandler;
use slack_mcp_types::{CallToolResult, PropertySchema, Tool, ToolAnnotations, ToolInputSchema};

use crate::context::AppContext;
use crate::respond;

/// `get_error_logs` - newest-first diagnostic entries.
pub struct GetErrorLogsTool {
    ctx: Arc<AppContext>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct GetErrorLogsArgs {
    limit: Option<u32>,
    level: Option<String>,
}

impl GetErrorLogsTool {
    /// Wire the tool to a context.
    pub fn new(ctx: Arc<AppContext>) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl ToolHandler for GetErrorLogsTool {
    fn tool(&self) -> Tool {
        Tool::new("get_error_logs", "Read recent diagnostic log entries")
            .with_schema(
                ToolInputSchema::object()
                    .property(
                        "limit",
                        PropertySchema::integer()
                            .description("Entries to return, newest first")
                            .min(1.0)
                            .max(1000.0)
                            .default_value(json!(50)),
                    )
                    .property(
                        "level",
                        PropertySchema::string()
                            .description("Only entries at this level")
                            .enum_values(vec!["error", "warn"]),
                    ),
            )
            .with_annotations(ToolAnnotations::read_only())
    }

    async fn execute(&self, arguments: Value) -> Result<CallToolResult> {
        const TOOL: &str = "get_error_logs";
        let args: GetErrorLogsArgs = match respond::parse_args(arguments) {
            Ok(args) => args,
            Err(e) => return Ok(respond::invalid_params(&self.ctx, TOOL, &e)),
        };
        let limit = args.limit.unwrap_or(50);
        if !(1..=1000).contains(&limit) {
            return Ok(respond::invalid_params(
                &self.ctx,
                TOOL,
                "limit must be between 1 and 1000",
            ));
        }
        let level = match args.level.as_deref() {
            None => None,
            Some("error") => Some(LogLevel::Error),
            Some("warn") => Some(LogLevel::Warn),
            Some(_) => {
                return Ok(respond::invalid_params(
                    &self.ctx,
                    TOOL,
                    "level must be 'error' or 'warn'",
                ));
            }
        };

        let entries: Vec<Value> = self
            .ctx
            .errorlog
            .read(limit as usize)
            .into_iter()
            .filter(|entry| level.is_none_or(|l| entry.level == l))
            .filter_map(|entry| serde_json::to_value(entry).ok())
            .collect();

        Ok(respond::success(json!({
            "entries": entries,
            "count": entries.len(),
        })))
    }
}

/// `clear_error_logs` - drop entries, optionally only those before a
/// cutoff.
pub struct ClearErrorLogsTool {
    ctx: Arc<AppContext>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct ClearErrorLogsArgs {
    before: Option<String>,
}

impl ClearErrorLogsTool {
    /// Wire the tool to a context.
    pub fn new(ctx: Arc<AppContext>) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl ToolHandler for ClearErrorLogsTool {
    fn tool(&self) -> Tool {
        Tool::new("clear_error_logs", "Clear diagnostic log entries")
            .with_schema(ToolInputSchema::object().property(
                "before",
                PropertySchema::string()
                    .description("Only clear entries before this ISO-8601 instant"),
            ))
            .with_annotations(ToolAnnotations::destructive())
    }

    async fn execute(&self, arguments: Value) -> Result<CallToolResult> {
        const TOOL: &str = "clear_error_logs";
        let args: ClearErrorLogsArgs = match respond::parse_args(arguments) {
            Ok(args) => args,
            Err(e) => return Ok(respond::invalid_params(&self.ctx, TOOL, &e)),
        };

        let cutoff = match args.before.as_deref() {
            None => None,
            Some(raw) => match DateTime::parse_from_rfc3339(raw) {
                Ok(parsed) => Some(parsed.with_timezone(&Utc)),
                Err(_) => {
                    return Ok(respond::invalid_params(
                        &self.ctx,
                        TOOL,
                        "before must be an ISO-8601 instant",
                    ));
                }
            },
        };

        let cleared = self.ctx.errorlog.clear(cutoff);
        Ok(respond::success(json!({ "cleared": cleared })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channels::tests::bot_context;
    use slack_mcp_common::ErrorLogEntry;
    use tempfile::TempDir;
    use wiremock::MockServer;

    async fn log_ctx() -> (TempDir, Arc<AppContext>) {
        let server = MockServer::start().await;
        let dir = TempDir::new().unwrap();
        let ctx = bot_context(&dir, server.uri());
        (dir, ctx)
    }

    #[tokio::test]
    async fn test_read_entries_with_level_filter() {
        let (_dir, ctx) = log_ctx().await;
        ctx.errorlog
            .log(ErrorLogEntry::error("refresh", "NETWORK_ERROR", "boom"));
        ctx.errorlog
            .log(ErrorLogEntry::warn("cache", "user_not_found", "meh"));

        let tool = GetErrorLogsTool::new(ctx.clone());
        let result = tool.execute(json!({})).await.unwrap();
        let structured = result.structured_content.unwrap();
        assert_eq!(structured["count"], 2);
        // Newest first.
        assert_eq!(structured["entries"][0]["code"], "user_not_found");

        let result = tool.execute(json!({"level": "error"})).await.unwrap();
        let structured = result.structured_content.unwrap();
        assert_eq!(structured["count"], 1);
        assert_eq!(structured["entries"][0]["code"], "NETWORK_ERROR");
    }

    #[tokio::test]
    async fn test_invalid_level_rejected() {
        let (_dir, ctx) = log_ctx().await;
        let tool = GetErrorLogsTool::new(ctx);
        let result = tool.execute(json!({"level": "fatal"})).await.unwrap();
        assert!(result.is_error());
    }

    #[tokio::test]
    async fn test_clear_all_and_with_cutoff() {
        let (_dir, ctx) = log_ctx().await;
        ctx.errorlog
            .log(ErrorLogEntry::error("tools", "unknown_error", "one"));
        ctx.errorlog
            .log(ErrorLogEntry::error("tools", "unknown_error", "two"));

        let tool = ClearErrorLogsTool::new(ctx.clone());
        let result = tool.execute(json!({})).await.unwrap();
        assert_eq!(result.structured_content.unwrap()["cleared"], 2);
        assert!(ctx.errorlog.read(10).is_empty());

        // A future cutoff clears freshly written entries too.
        ctx.errorlog
            .log(ErrorLogEntry::error("tools", "unknown_error", "three"));
        let result = tool
            .execute(json!({"before": "2099-01-01T00:00:00Z"}))
            .await
            .unwrap();
        assert_eq!(result.structured_content.unwrap()["cleared"], 1);
    }

    #[tokio::test]
    async fn test_clear_rejects_bad_cutoff() {
        let (_dir, ctx) = log_ctx().await;
        let tool = ClearErrorLogsTool::new(ctx);
        let result = tool.execute(json!({"before": "yesterday"})).await.unwrap();
        assert!(result.is_error());
    }
}
