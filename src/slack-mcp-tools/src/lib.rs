//! Tool handlers for slack-mcp.
//!
//! Each read tool follows the same pipeline: validate input against its
//! schema, resolve references through the name caches, call Slack, format
//! through the pure pipeline, strip empty fields, and answer in the
//! uniform response shape. Every failure is mapped onto a stable code and
//! mirrored into the error log.

pub mod channels;
pub mod context;
pub mod logs;
pub mod memory;
pub mod messages;
pub mod refresh;
pub mod respond;
pub mod search;
pub mod users;

use std::sync::Arc;

use slack_mcp_server::ToolHandler;

pub use context::AppContext;

/// The full tool catalog wired to one context.
pub fn all_tools(ctx: Arc<AppContext>) -> Vec<Arc<dyn ToolHandler>> {
    vec![
        Arc::new(channels::ListChannelsTool::new(ctx.clone())),
        Arc::new(channels::ChannelHistoryTool::new(ctx.clone())),
        Arc::new(channels::ThreadRepliesTool::new(ctx.clone())),
        Arc::new(users::ListUsersTool::new(ctx.clone())),
        Arc::new(users::UserProfileTool::new(ctx.clone())),
        Arc::new(search::SearchMessagesTool::new(ctx.clone())),
        Arc::new(refresh::RefreshCredentialsTool::new(ctx.clone())),
        Arc::new(memory::MemoryListTool::new(ctx.clone())),
        Arc::new(memory::MemoryReadTool::new(ctx.clone())),
        Arc::new(memory::MemoryWriteTool::new(ctx.clone())),
        Arc::new(memory::MemorySearchTool::new(ctx.clone())),
        Arc::new(logs::GetErrorLogsTool::new(ctx.clone())),
        Arc::new(logs::ClearErrorLogsTool::new(ctx)),
    ]
}
