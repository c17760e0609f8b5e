//! User tools: `list_users`, `get_user_profile`.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};

use slack_mcp_server::ToolHandler;
use slack_mcp_types::{CallToolResult, PropertySchema, Tool, ToolAnnotations, ToolInputSchema};

use crate::context::AppContext;
use crate::respond;

/// `list_users` - workspace members.
pub struct ListUsersTool {
    ctx: Arc<AppContext>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct ListUsersArgs {
    limit: Option<u32>,
    cursor: Option<String>,
}

impl ListUsersTool {
    /// Wire the tool to a context.
    pub fn new(ctx: Arc<AppContext>) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl ToolHandler for ListUsersTool {
    fn tool(&self) -> Tool {
        Tool::new("list_users", "List members of the workspace")
            .with_schema(
                ToolInputSchema::object()
                    .property(
                        "limit",
                        PropertySchema::integer()
                            .description("Users per page")
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
        const TOOL: &str = "list_users";
        let args: ListUsersArgs = match respond::parse_args(arguments) {
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
        let body = match client.users_list(limit, args.cursor.as_deref()).await {
            Ok(body) => body,
            Err(e) => return Ok(respond::fail_slack(&self.ctx, TOOL, &e)),
        };

        let users: Vec<Value> = body
            .get("members")
            .and_then(Value::as_array)
            .map(|members| members.iter().map(user_summary).collect())
            .unwrap_or_default();

        let next_cursor = body
            .get("response_metadata")
            .and_then(|m| m.get("next_cursor"))
            .and_then(Value::as_str)
            .filter(|c| !c.is_empty());

        Ok(respond::success(json!({
            "users": users,
            "nextCursor": next_cursor,
        })))
    }
}

/// `get_user_profile` - one member in detail.
pub struct UserProfileTool {
    ctx: Arc<AppContext>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct UserProfileArgs {
    user_id: String,
}

impl UserProfileTool {
    /// Wire the tool to a context.
    pub fn new(ctx: Arc<AppContext>) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl ToolHandler for UserProfileTool {
    fn tool(&self) -> Tool {
        Tool::new("get_user_profile", "Read one user's profile")
            .with_schema(
                ToolInputSchema::object()
                    .property(
                        "user_id",
                        PropertySchema::string().description("User id (U…)"),
                    )
                    .required(vec!["user_id"]),
            )
            .with_annotations(ToolAnnotations::read_only().open_world())
    }

    async fn execute(&self, arguments: Value) -> Result<CallToolResult> {
        const TOOL: &str = "get_user_profile";
        let args: UserProfileArgs = match respond::parse_args(arguments) {
            Ok(args) => args,
            Err(e) => return Ok(respond::invalid_params(&self.ctx, TOOL, &e)),
        };
        if args.user_id.is_empty() {
            return Ok(respond::invalid_params(&self.ctx, TOOL, "user_id must be non-empty"));
        }

        let client = match self.ctx.holder.get() {
            Ok(client) => client,
            Err(e) => return Ok(respond::fail_slack(&self.ctx, TOOL, &e)),
        };
        let body = match client.users_info(&args.user_id).await {
            Ok(body) => body,
            Err(e) => return Ok(respond::fail_slack(&self.ctx, TOOL, &e)),
        };

        let empty = json!({});
        let user = body.get("user").unwrap_or(&empty);
        let profile = user.get("profile").cloned().unwrap_or_else(|| json!({}));

        Ok(respond::success(json!({
            "user": {
                "id": user.get("id").cloned().unwrap_or(Value::Null),
                "name": user.get("name").cloned().unwrap_or(Value::Null),
                "realName": user.get("real_name").cloned().unwrap_or(Value::Null),
                "displayName": profile.get("display_name").cloned().unwrap_or(Value::Null),
                "email": profile.get("email").cloned().unwrap_or(Value::Null),
                "title": profile.get("title").cloned().unwrap_or(Value::Null),
                "timezone": user.get("tz").cloned().unwrap_or(Value::Null),
                "isBot": user.get("is_bot").cloned().unwrap_or(Value::Null),
                "deleted": user.get("deleted").cloned().unwrap_or(Value::Null),
            }
        })))
    }
}

fn user_summary(member: &Value) -> Value {
    let profile = member.get("profile");
    json!({
        "id": member.get("id").cloned().unwrap_or(Value::Null),
        "name": member.get("name").cloned().unwrap_or(Value::Null),
        "realName": member.get("real_name").cloned().unwrap_or(Value::Null),
        "displayName": profile
            .and_then(|p| p.get("display_name"))
            .cloned()
            .unwrap_or(Value::Null),
        "isBot": member.get("is_bot").cloned().unwrap_or(Value::Null),
        "deleted": member.get("deleted").cloned().unwrap_or(Value::Null),
    })
}
