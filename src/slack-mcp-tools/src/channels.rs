//! Channel tools: `list_channels`, `get_channel_history`,
//! `get_thread_replies`.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::Local;
use serde::Deserialize;
use serde_json::{Value, json};

use slack_mcp_server::ToolHandler;
use slack_mcp_types::{CallToolResult, PropertySchema, Tool, ToolAnnotations, ToolInputSchema};

use crate::context::AppContext;
use crate::messages::format_message;
use crate::respond;

fn channel_id_property() -> PropertySchema {
    PropertySchema::string().description("Channel id (C…/D…/G…) or name, with or without '#'")
}

/// `list_channels` - public channels in the workspace.
pub struct ListChannelsTool {
    ctx: Arc<AppContext>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct ListChannelsArgs {
    limit: Option<u32>,
    cursor: Option<String>,
}

impl ListChannelsTool {
    /// Wire the tool to a context.
    pub fn new(ctx: Arc<AppContext>) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl ToolHandler for ListChannelsTool {
    fn tool(&self) -> Tool {
        Tool::new("list_channels", "List public channels in the workspace")
            .with_schema(
                ToolInputSchema::object()
                    .property(
                        "limit",
                        PropertySchema::integer()
                            .description("Channels per page")
                            .min(1.0)
                            .max(1000.0)
                            .default_value(json!(100)),
                    )
                    .property(
                        "cursor",
                        PropertySchema::string().description("Pagination cursor"),
                    ),
            )
            .with_annotations(ToolAnnotations::read_only().open_world())
    }

    async fn execute(&self, arguments: Value) -> Result<CallToolResult> {
        const TOOL: &str = "list_channels";
        let args: ListChannelsArgs = match respond::parse_args(arguments) {
            Ok(args) => args,
            Err(e) => return Ok(respond::invalid_params(&self.ctx, TOOL, &e)),
        };
        let limit = args.limit.unwrap_or(100);
        if !(1..=1000).contains(&limit) {
            return Ok(respond::invalid_params(
                &self.ctx,
                TOOL,
                "limit must be between 1 and 1000",
            ));
        }

        let client = match self.ctx.holder.get() {
            Ok(client) => client,
            Err(e) => return Ok(respond::fail_slack(&self.ctx, TOOL, &e)),
        };
        let body = match client
            .conversations_list(limit, args.cursor.as_deref(), true)
            .await
        {
            Ok(body) => body,
            Err(e) => return Ok(respond::fail_slack(&self.ctx, TOOL, &e)),
        };

        let channels: Vec<Value> = body
            .get("channels")
            .and_then(Value::as_array)
            .map(|channels| {
                channels
                    .iter()
                    .map(|channel| {
                        json!({
                            "id": channel.get("id").cloned().unwrap_or(Value::Null),
                            "name": channel.get("name").cloned().unwrap_or(Value::Null),
                            "topic": channel
                                .get("topic")
                                .and_then(|t| t.get("value"))
                                .cloned()
                                .unwrap_or(Value::Null),
                            "numMembers": channel.get("num_members").cloned().unwrap_or(Value::Null),
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();

        let next_cursor = body
            .get("response_metadata")
            .and_then(|m| m.get("next_cursor"))
            .and_then(Value::as_str)
            .filter(|c| !c.is_empty());

        Ok(respond::success(json!({
            "channels": channels,
            "nextCursor": next_cursor,
        })))
    }
}

/// `get_channel_history` - recent messages in a channel.
pub struct ChannelHistoryTool {
    ctx: Arc<AppContext>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct ChannelHistoryArgs {
    channel_id: String,
    limit: Option<u32>,
    oldest: Option<String>,
    latest: Option<String>,
    cursor: Option<String>,
}

impl ChannelHistoryTool {
    /// Wire the tool to a context.
    pub fn new(ctx: Arc<AppContext>) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl ToolHandler for ChannelHistoryTool {
    fn tool(&self) -> Tool {
        Tool::new(
            "get_channel_history",
            "Read recent messages from a channel",
        )
        .with_schema(
            ToolInputSchema::object()
                .property("channel_id", channel_id_property())
                .property(
                    "limit",
                    PropertySchema::integer()
                        .description("Messages to return")
                        .min(1.0)
                        .max(200.0)
                        .default_value(json!(50)),
                )
                .property(
                    "oldest",
                    PropertySchema::string().description("Only messages after this Slack ts"),
                )
                .property(
                    "latest",
                    PropertySchema::string().description("Only messages before this Slack ts"),
                )
                .property(
                    "cursor",
                    PropertySchema::string().description("Pagination cursor"),
                )
                .required(vec!["channel_id"]),
        )
        .with_annotations(ToolAnnotations::read_only().open_world())
    }

    async fn execute(&self, arguments: Value) -> Result<CallToolResult> {
        const TOOL: &str = "get_channel_history";
        let args: ChannelHistoryArgs = match respond::parse_args(arguments) {
            Ok(args) => args,
            Err(e) => return Ok(respond::invalid_params(&self.ctx, TOOL, &e)),
        };
        if args.channel_id.is_empty() {
            return Ok(respond::invalid_params(&self.ctx, TOOL, "channel_id must be non-empty"));
        }
        let limit = args.limit.unwrap_or(50);
        if !(1..=200).contains(&limit) {
            return Ok(respond::invalid_params(
                &self.ctx,
                TOOL,
                "limit must be between 1 and 200",
            ));
        }

        let channel = self.ctx.channels.resolve_channel_id(&args.channel_id).await;

        let client = match self.ctx.holder.get() {
            Ok(client) => client,
            Err(e) => return Ok(respond::fail_slack(&self.ctx, TOOL, &e)),
        };
        let body = match client
            .conversations_history(
                &channel,
                limit,
                args.oldest.as_deref(),
                args.latest.as_deref(),
                args.cursor.as_deref(),
            )
            .await
        {
            Ok(body) => body,
            Err(e) => return Ok(respond::fail_slack(&self.ctx, TOOL, &e)),
        };

        let messages = format_all(&body, &self.ctx).await;
        let has_more = body.get("has_more").and_then(Value::as_bool).unwrap_or(false);
        let next_cursor = body
            .get("response_metadata")
            .and_then(|m| m.get("next_cursor"))
            .and_then(Value::as_str)
            .filter(|c| !c.is_empty());

        Ok(respond::success_with_messages(
            json!({
                "channel": channel,
                "messages": messages,
                "hasMore": has_more,
                "nextCursor": next_cursor,
            }),
            "messages",
        ))
    }
}

/// `get_thread_replies` - all messages in one thread.
pub struct ThreadRepliesTool {
    ctx: Arc<AppContext>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct ThreadRepliesArgs {
    channel_id: String,
    thread_ts: String,
    limit: Option<u32>,
    cursor: Option<String>,
}

impl ThreadRepliesTool {
    /// Wire the tool to a context.
    pub fn new(ctx: Arc<AppContext>) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl ToolHandler for ThreadRepliesTool {
    fn tool(&self) -> Tool {
        Tool::new("get_thread_replies", "Read the replies in a thread")
            .with_schema(
                ToolInputSchema::object()
                    .property("channel_id", channel_id_property())
                    .property(
                        "thread_ts",
                        PropertySchema::string()
                            .description("Slack ts of the thread's parent message"),
                    )
                    .property(
                        "limit",
                        PropertySchema::integer()
                            .description("Messages to return")
                            .min(1.0)
                            .max(200.0)
                            .default_value(json!(50)),
                    )
                    .property(
                        "cursor",
                        PropertySchema::string().description("Pagination cursor"),
                    )
                    .required(vec!["channel_id", "thread_ts"]),
            )
            .with_annotations(ToolAnnotations::read_only().open_world())
    }

    async fn execute(&self, arguments: Value) -> Result<CallToolResult> {
        const TOOL: &str = "get_thread_replies";
        let args: ThreadRepliesArgs = match respond::parse_args(arguments) {
            Ok(args) => args,
            Err(e) => return Ok(respond::invalid_params(&self.ctx, TOOL, &e)),
        };
        if args.channel_id.is_empty() || args.thread_ts.is_empty() {
            return Ok(respond::invalid_params(
                &self.ctx,
                TOOL,
                "channel_id and thread_ts must be non-empty",
            ));
        }
        let limit = args.limit.unwrap_or(50);
        if !(1..=200).contains(&limit) {
            return Ok(respond::invalid_params(
                &self.ctx,
                TOOL,
                "limit must be between 1 and 200",
            ));
        }

        let channel = self.ctx.channels.resolve_channel_id(&args.channel_id).await;

        let client = match self.ctx.holder.get() {
            Ok(client) => client,
            Err(e) => return Ok(respond::fail_slack(&self.ctx, TOOL, &e)),
        };
        let body = match client
            .conversations_replies(&channel, &args.thread_ts, limit, args.cursor.as_deref())
            .await
        {
            Ok(body) => body,
            Err(e) => return Ok(respond::fail_slack(&self.ctx, TOOL, &e)),
        };

        let messages = format_all(&body, &self.ctx).await;
        let has_more = body.get("has_more").and_then(Value::as_bool).unwrap_or(false);

        Ok(respond::success_with_messages(
            json!({
                "channel": channel,
                "threadId": args.thread_ts,
                "messages": messages,
                "hasMore": has_more,
            }),
            "messages",
        ))
    }
}

async fn format_all(body: &Value, ctx: &AppContext) -> Vec<Value> {
    let now = Local::now();
    let mut formatted = Vec::new();
    if let Some(messages) = body.get("messages").and_then(Value::as_array) {
        for message in messages {
            formatted.push(format_message(message, &ctx.users, now).await);
        }
    }
    formatted
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::context::AppContext;
    use serde_json::json;
    use slack_mcp_api::{SlackAuth, SlackClientHolder};
    use slack_mcp_auth::{AuthConfig, RefreshConfig};
    use slack_mcp_common::ErrorLog;
    use tempfile::TempDir;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    pub(crate) fn bot_context(dir: &TempDir, api_base: String) -> Arc<AppContext> {
        let holder = Arc::new(SlackClientHolder::with_api_base(api_base));
        holder.bind(SlackAuth::bot("xoxb-test"));
        Arc::new(AppContext::new(
            AuthConfig::Bot {
                token: secrecy::SecretString::from("xoxb-test"),
            },
            RefreshConfig::from_lookup(|_| None),
            holder,
            ErrorLog::new(dir.path().join("error.log")),
            dir.path().join("memory"),
        ))
    }

    async fn mount_users(server: &MockServer) {
        Mock::given(method("GET"))
            .and(path("/users.list"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ok": true,
                "members": [{"id": "U1", "profile": {"display_name": "ada"}}],
                "response_metadata": {"next_cursor": ""}
            })))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_history_resolves_name_then_formats() {
        let server = MockServer::start().await;
        // Name resolution populates the channel cache exactly once.
        Mock::given(method("GET"))
            .and(path("/conversations.list"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ok": true,
                "channels": [{"id": "C777", "name": "general"}],
                "response_metadata": {"next_cursor": ""}
            })))
            .expect(1)
            .mount(&server)
            .await;
        mount_users(&server).await;
        // The history call must receive the resolved id.
        Mock::given(method("GET"))
            .and(path("/conversations.history"))
            .and(query_param("channel", "C777"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ok": true,
                "messages": [
                    {"ts": "1718450000.000100", "user": "U1", "reactions": []}
                ],
                "has_more": false
            })))
            .expect(1)
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let ctx = bot_context(&dir, server.uri());
        let tool = ChannelHistoryTool::new(ctx);

        let result = tool
            .execute(json!({"channel_id": "general"}))
            .await
            .unwrap();
        assert!(!result.is_error());

        let structured = result.structured_content.unwrap();
        assert_eq!(structured["channel"], "C777");
        let message = &structured["messages"][0];
        // Raw ts kept as id; missing text restored as ""; empty reactions
        // stripped away entirely.
        assert_eq!(message["id"], "1718450000.000100");
        assert_eq!(message["text"], "");
        assert!(message.get("reactions").is_none());
        assert_eq!(message["user"], "ada (U1)");
    }

    #[tokio::test]
    async fn test_history_validates_limit() {
        let server = MockServer::start().await;
        let dir = TempDir::new().unwrap();
        let ctx = bot_context(&dir, server.uri());
        let tool = ChannelHistoryTool::new(ctx.clone());

        let result = tool
            .execute(json!({"channel_id": "C1", "limit": 500}))
            .await
            .unwrap();
        assert!(result.is_error());
        let text = result.content[0].as_text().unwrap();
        assert!(text.starts_with("Error: invalid_params"));

        // The failure is mirrored into the error log.
        let entries = ctx.errorlog.read(10);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].tool.as_deref(), Some("get_channel_history"));
    }

    #[tokio::test]
    async fn test_history_unknown_args_rejected() {
        let server = MockServer::start().await;
        let dir = TempDir::new().unwrap();
        let ctx = bot_context(&dir, server.uri());
        let tool = ChannelHistoryTool::new(ctx);

        let result = tool
            .execute(json!({"channel_id": "C1", "bogus": true}))
            .await
            .unwrap();
        assert!(result.is_error());
    }

    #[tokio::test]
    async fn test_history_maps_slack_error_with_retry_after() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/conversations.history"))
            .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "9"))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let ctx = bot_context(&dir, server.uri());
        let tool = ChannelHistoryTool::new(ctx);

        let result = tool.execute(json!({"channel_id": "C1"})).await.unwrap();
        assert!(result.is_error());
        let text = result.content[0].as_text().unwrap();
        assert!(text.starts_with("Error: rate_limited"));
        assert!(text.ends_with("Please retry after 9 seconds."));
    }

    #[tokio::test]
    async fn test_list_channels_shapes_response() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/conversations.list"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ok": true,
                "channels": [
                    {"id": "C1", "name": "general", "topic": {"value": "hq"}, "num_members": 12},
                    {"id": "C2", "name": "random", "topic": {"value": ""}}
                ],
                "response_metadata": {"next_cursor": "abc"}
            })))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let ctx = bot_context(&dir, server.uri());
        let tool = ListChannelsTool::new(ctx);

        let result = tool.execute(json!({})).await.unwrap();
        let structured = result.structured_content.unwrap();
        assert_eq!(structured["channels"][0]["topic"], "hq");
        // Empty topic stripped from the second channel.
        assert!(structured["channels"][1].get("topic").is_none());
        assert_eq!(structured["nextCursor"], "abc");
    }

    #[tokio::test]
    async fn test_thread_replies_requires_thread_ts() {
        let server = MockServer::start().await;
        let dir = TempDir::new().unwrap();
        let ctx = bot_context(&dir, server.uri());
        let tool = ThreadRepliesTool::new(ctx);

        let result = tool.execute(json!({"channel_id": "C1"})).await.unwrap();
        assert!(result.is_error());
    }

    #[tokio::test]
    async fn test_thread_replies_formats_messages() {
        let server = MockServer::start().await;
        mount_users(&server).await;
        Mock::given(method("GET"))
            .and(path("/conversations.replies"))
            .and(query_param("ts", "1.000100"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ok": true,
                "messages": [
                    {"ts": "1.000100", "user": "U1", "text": "parent", "reply_count": 1, "thread_ts": "1.000100"},
                    {"ts": "2.000100", "user": "U1", "text": "reply", "thread_ts": "1.000100"}
                ]
            })))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let ctx = bot_context(&dir, server.uri());
        let tool = ThreadRepliesTool::new(ctx);

        let result = tool
            .execute(json!({"channel_id": "C1", "thread_ts": "1.000100"}))
            .await
            .unwrap();
        let structured = result.structured_content.unwrap();
        assert_eq!(structured["messages"][0]["replyCount"], 1);
        assert_eq!(structured["messages"][1]["text"], "reply");
        assert_eq!(structured["messages"][1]["threadId"], "1.000100");
    }
}
