//! `search_messages` - workspace-wide message search with thread-parent
//! enrichment. User-mode only; Slack's search API rejects bot tokens.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Local};
use regex::Regex;
use serde::Deserialize;
use serde_json::{Value, json};

use slack_mcp_api::format::{clean_slack_markup, format_relative_time};
use slack_mcp_server::ToolHandler;
use slack_mcp_types::{CallToolResult, PropertySchema, Tool, ToolAnnotations, ToolInputSchema};

use crate::context::AppContext;
use crate::respond;

/// Parent text is cut to this many characters.
const PARENT_TEXT_LIMIT: usize = 200;

fn user_id_shape_regex() -> &'static Regex {
    static RE: std::sync::OnceLock<Regex> = std::sync::OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[UW][A-Z0-9]+$").expect("static regex"))
}

/// `search_messages`.
pub struct SearchMessagesTool {
    ctx: Arc<AppContext>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct SearchArgs {
    query: String,
    count: Option<u32>,
    page: Option<u32>,
    sort: Option<String>,
    sort_dir: Option<String>,
}

impl SearchMessagesTool {
    /// Wire the tool to a context.
    pub fn new(ctx: Arc<AppContext>) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl ToolHandler for SearchMessagesTool {
    fn tool(&self) -> Tool {
        Tool::new(
            "search_messages",
            "Search messages across the workspace (user auth only)",
        )
        .with_schema(
            ToolInputSchema::object()
                .property("query", PropertySchema::string().description("Search query"))
                .property(
                    "count",
                    PropertySchema::integer()
                        .description("Results per page")
                        .min(1.0)
                        .max(100.0)
                        .default_value(json!(20)),
                )
                .property(
                    "page",
                    PropertySchema::integer().description("Result page").min(1.0),
                )
                .property(
                    "sort",
                    PropertySchema::string()
                        .description("Sort order")
                        .enum_values(vec!["score", "timestamp"]),
                )
                .property(
                    "sort_dir",
                    PropertySchema::string()
                        .description("Sort direction")
                        .enum_values(vec!["asc", "desc"]),
                )
                .required(vec!["query"]),
        )
        .with_annotations(ToolAnnotations::read_only().open_world())
    }

    async fn execute(&self, arguments: Value) -> Result<CallToolResult> {
        const TOOL: &str = "search_messages";
        if !self.ctx.is_search_available() {
            return Ok(respond::fail(
                &self.ctx,
                TOOL,
                "search_requires_user_token",
                "Search requires user authentication (SLACK_USER_TOKEN + SLACK_COOKIE_D)",
                None,
                false,
            ));
        }

        let args: SearchArgs = match respond::parse_args(arguments) {
            Ok(args) => args,
            Err(e) => return Ok(respond::invalid_params(&self.ctx, TOOL, &e)),
        };
        if args.query.trim().is_empty() {
            return Ok(respond::invalid_params(&self.ctx, TOOL, "query must be non-empty"));
        }
        let count = args.count.unwrap_or(20);
        if !(1..=100).contains(&count) {
            return Ok(respond::invalid_params(
                &self.ctx,
                TOOL,
                "count must be between 1 and 100",
            ));
        }
        if let Some(sort) = args.sort.as_deref() {
            if !matches!(sort, "score" | "timestamp") {
                return Ok(respond::invalid_params(
                    &self.ctx,
                    TOOL,
                    "sort must be 'score' or 'timestamp'",
                ));
            }
        }
        if let Some(sort_dir) = args.sort_dir.as_deref() {
            if !matches!(sort_dir, "asc" | "desc") {
                return Ok(respond::invalid_params(
                    &self.ctx,
                    TOOL,
                    "sort_dir must be 'asc' or 'desc'",
                ));
            }
        }

        let client = match self.ctx.holder.get() {
            Ok(client) => client,
            Err(e) => return Ok(respond::fail_slack(&self.ctx, TOOL, &e)),
        };
        let body = match client
            .search_messages(
                &args.query,
                count,
                args.page,
                args.sort.as_deref(),
                args.sort_dir.as_deref(),
            )
            .await
        {
            Ok(body) => body,
            Err(e) => return Ok(respond::fail_slack(&self.ctx, TOOL, &e)),
        };

        let now = Local::now();
        let empty = Vec::new();
        let matches = body
            .get("messages")
            .and_then(|m| m.get("matches"))
            .and_then(Value::as_array)
            .unwrap_or(&empty);

        let mut results = Vec::new();
        for item in matches {
            results.push(self.format_result(item, now).await);
        }

        let parents = self.fetch_thread_parents(&results, now).await;
        for result in &mut results {
            if let Some(Value::String(thread_id)) = result.get("threadId").cloned() {
                let channel_id = result
                    .get("channelId")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                if let Some(parent) = parents.get(&(channel_id, thread_id)) {
                    result["threadParent"] = parent.clone();
                }
            }
            // channelId was only needed to key the parent lookup.
            if let Some(fields) = result.as_object_mut() {
                fields.remove("channelId");
            }
        }

        let total = body
            .get("messages")
            .and_then(|m| m.get("total"))
            .cloned()
            .unwrap_or(Value::Null);

        Ok(respond::success_with_messages(
            json!({
                "query": args.query,
                "total": total,
                "results": results,
            }),
            "results",
        ))
    }
}

impl SearchMessagesTool {
    async fn format_result(&self, item: &Value, now: DateTime<Local>) -> Value {
        let ts = item.get("ts").and_then(Value::as_str).unwrap_or_default();
        let text = item.get("text").and_then(Value::as_str).unwrap_or_default();

        let channel_id = item
            .get("channel")
            .and_then(|c| c.get("id"))
            .and_then(Value::as_str)
            .unwrap_or_default();
        let channel_name = item
            .get("channel")
            .and_then(|c| c.get("name"))
            .and_then(Value::as_str)
            .unwrap_or_default();

        // DMs surface with the peer's user id as the "name".
        let channel = if user_id_shape_regex().is_match(channel_name) {
            format!("DM: {channel_name} ({channel_id})")
        } else {
            format!("#{channel_name} ({channel_id})")
        };

        let user = match item.get("user").and_then(Value::as_str) {
            Some(id) => self.ctx.users.resolve(id).await,
            None => item
                .get("username")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
        };

        let mut result = json!({
            "id": ts,
            "channel": channel,
            "channelId": channel_id,
            "user": user,
            "time": format_relative_time(ts, now),
            "text": clean_slack_markup(text, &self.ctx.users).await,
        });

        if let Some(thread_ts) = item
            .get("permalink")
            .and_then(Value::as_str)
            .and_then(thread_ts_from_permalink)
        {
            result["threadId"] = Value::from(thread_ts);
        }
        result
    }

    /// Fetch each referenced thread's parent message once.
    ///
    /// Deduped by `(channel, threadTs)`; only the parent is fetched
    /// (limit 1); text is truncated; any failure just omits the parent.
    async fn fetch_thread_parents(
        &self,
        results: &[Value],
        now: DateTime<Local>,
    ) -> HashMap<(String, String), Value> {
        let mut keys = HashSet::new();
        for result in results {
            let (Some(channel_id), Some(thread_id)) = (
                result.get("channelId").and_then(Value::as_str),
                result.get("threadId").and_then(Value::as_str),
            ) else {
                continue;
            };
            keys.insert((channel_id.to_string(), thread_id.to_string()));
        }

        let mut parents = HashMap::new();
        let Ok(client) = self.ctx.holder.get() else {
            return parents;
        };
        for (channel_id, thread_id) in keys {
            let Ok(body) = client
                .conversations_replies(&channel_id, &thread_id, 1, None)
                .await
            else {
                continue;
            };
            let Some(parent) = body
                .get("messages")
                .and_then(Value::as_array)
                .and_then(|m| m.first())
            else {
                continue;
            };

            let user = match parent.get("user").and_then(Value::as_str) {
                Some(id) => self.ctx.users.resolve(id).await,
                None => String::new(),
            };
            let ts = parent.get("ts").and_then(Value::as_str).unwrap_or_default();
            let text = parent.get("text").and_then(Value::as_str).unwrap_or_default();
            let cleaned = clean_slack_markup(text, &self.ctx.users).await;

            parents.insert(
                (channel_id, thread_id),
                json!({
                    "user": user,
                    "time": format_relative_time(ts, now),
                    "text": truncate_chars(&cleaned, PARENT_TEXT_LIMIT),
                }),
            );
        }
        parents
    }
}

/// Pull `thread_ts` out of a permalink query string.
fn thread_ts_from_permalink(permalink: &str) -> Option<String> {
    let (_, query) = permalink.split_once('?')?;
    query
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(key, _)| *key == "thread_ts")
        .map(|(_, value)| value.to_string())
        .filter(|v| !v.is_empty())
}

/// Cut to `limit` characters with a trailing ellipsis.
fn truncate_chars(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(limit).collect();
    cut.push('…');
    cut
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::AppContext;
    use secrecy::SecretString;
    use slack_mcp_api::{SlackAuth, SlackClientHolder};
    use slack_mcp_auth::{AuthConfig, RefreshConfig};
    use slack_mcp_common::ErrorLog;
    use tempfile::TempDir;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn user_context(dir: &TempDir, api_base: String) -> Arc<AppContext> {
        let holder = Arc::new(SlackClientHolder::with_api_base(api_base));
        holder.bind(SlackAuth::user("xoxc-test", "xoxd-test"));
        Arc::new(AppContext::new(
            AuthConfig::User {
                token: SecretString::from("xoxc-test"),
                cookie: SecretString::from("xoxd-test"),
            },
            RefreshConfig::from_lookup(|_| None),
            holder,
            ErrorLog::new(dir.path().join("error.log")),
            dir.path().join("memory"),
        ))
    }

    #[test]
    fn test_thread_ts_from_permalink() {
        assert_eq!(
            thread_ts_from_permalink(
                "https://acme.slack.com/archives/C1/p123?thread_ts=1.0001&cid=C1"
            ),
            Some("1.0001".to_string())
        );
        assert_eq!(
            thread_ts_from_permalink("https://acme.slack.com/archives/C1/p123"),
            None
        );
        assert_eq!(
            thread_ts_from_permalink("https://a/p?thread_ts="),
            None
        );
    }

    #[test]
    fn test_truncate_chars() {
        assert_eq!(truncate_chars("short", 200), "short");
        let long = "x".repeat(250);
        let cut = truncate_chars(&long, 200);
        assert_eq!(cut.chars().count(), 201);
        assert!(cut.ends_with('…'));
    }

    #[tokio::test]
    async fn test_search_requires_user_auth() {
        let server = MockServer::start().await;
        let dir = TempDir::new().unwrap();
        let ctx = crate::channels::tests::bot_context(&dir, server.uri());
        let tool = SearchMessagesTool::new(ctx);

        let result = tool.execute(json!({"query": "deploy"})).await.unwrap();
        assert!(result.is_error());
        let text = result.content[0].as_text().unwrap();
        assert!(text.starts_with("Error: search_requires_user_token"));
    }

    #[tokio::test]
    async fn test_search_formats_results_and_thread_parent() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/users.list"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ok": true,
                "members": [{"id": "U1", "profile": {"display_name": "ada"}}],
                "response_metadata": {"next_cursor": ""}
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/search.messages"))
            .and(query_param("query", "deploy"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ok": true,
                "messages": {
                    "total": 2,
                    "matches": [
                        {
                            "ts": "2.000100",
                            "text": "deploy finished",
                            "user": "U1",
                            "channel": {"id": "C1", "name": "general"},
                            "permalink": "https://acme.slack.com/archives/C1/p2?thread_ts=1.000100&cid=C1"
                        },
                        {
                            "ts": "3.000100",
                            "text": "dm about deploy",
                            "user": "U1",
                            "channel": {"id": "D9", "name": "U7PEER"},
                            "permalink": "https://acme.slack.com/archives/D9/p3"
                        }
                    ]
                }
            })))
            .mount(&server)
            .await;
        // Parent fetch: limit 1, deduped to one call.
        Mock::given(method("GET"))
            .and(path("/conversations.replies"))
            .and(query_param("ts", "1.000100"))
            .and(query_param("limit", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ok": true,
                "messages": [{"ts": "1.000100", "user": "U1", "text": "kicking off the deploy"}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let tool = SearchMessagesTool::new(user_context(&dir, server.uri()));

        let result = tool.execute(json!({"query": "deploy"})).await.unwrap();
        assert!(!result.is_error());
        let structured = result.structured_content.unwrap();

        let first = &structured["results"][0];
        assert_eq!(first["channel"], "#general (C1)");
        assert_eq!(first["user"], "ada (U1)");
        assert_eq!(first["threadId"], "1.000100");
        assert_eq!(first["threadParent"]["text"], "kicking off the deploy");
        assert_eq!(first["threadParent"]["user"], "ada (U1)");
        assert!(first.get("channelId").is_none());

        let second = &structured["results"][1];
        assert_eq!(second["channel"], "DM: U7PEER (D9)");
        assert!(second.get("threadId").is_none());
        assert!(second.get("threadParent").is_none());

        assert_eq!(structured["total"], 2);
    }

    #[tokio::test]
    async fn test_search_parent_failure_is_silent() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/users.list"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ok": true, "members": [], "response_metadata": {"next_cursor": ""}
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/search.messages"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ok": true,
                "messages": {
                    "total": 1,
                    "matches": [{
                        "ts": "2.000100",
                        "text": "hello",
                        "user": "U1",
                        "channel": {"id": "C1", "name": "general"},
                        "permalink": "https://acme.slack.com/archives/C1/p2?thread_ts=1.000100"
                    }]
                }
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/conversations.replies"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"ok": false, "error": "thread_not_found"})),
            )
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let tool = SearchMessagesTool::new(user_context(&dir, server.uri()));

        let result = tool.execute(json!({"query": "hello"})).await.unwrap();
        assert!(!result.is_error());
        let structured = result.structured_content.unwrap();
        assert_eq!(structured["results"][0]["threadId"], "1.000100");
        assert!(structured["results"][0].get("threadParent").is_none());
    }

    #[tokio::test]
    async fn test_search_validates_sort() {
        let server = MockServer::start().await;
        let dir = TempDir::new().unwrap();
        let tool = SearchMessagesTool::new(user_context(&dir, server.uri()));

        let result = tool
            .execute(json!({"query": "x", "sort": "relevance"}))
            .await
            .unwrap();
        assert!(result.is_error());
        assert!(
            result.content[0]
                .as_text()
                .unwrap()
                .starts_with("Error: invalid_params")
        );
    }
}
