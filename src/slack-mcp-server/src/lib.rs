//! MCP server host for slack-mcp.
//!
//! Owns the tool registry, JSON-RPC dispatch, and the stdio transport.
//! Standard output carries protocol frames exclusively; all diagnostics go
//! through `tracing` (stderr) so a single stray print cannot corrupt the
//! stream.

mod builder;
mod handlers;
mod server;

pub use builder::McpServerBuilder;
pub use handlers::ToolHandler;
pub use server::{McpServer, ServerState};

pub use slack_mcp_types;
