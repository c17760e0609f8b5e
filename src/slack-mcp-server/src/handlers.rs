//! Tool handler trait.

use anyhow::Result;
use serde_json::Value;
use slack_mcp_types::{CallToolResult, Tool};

/// A registered tool.
///
/// `execute` returns `Ok` even for tool-level failures - those are encoded
/// in the result's `isError` flag. An `Err` here means the handler itself
/// broke and is mapped to a generic error result by the dispatcher.
#[async_trait::async_trait]
pub trait ToolHandler: Send + Sync {
    /// The tool descriptor advertised through `tools/list`.
    fn tool(&self) -> Tool;

    /// Execute the tool with the given arguments.
    async fn execute(&self, arguments: Value) -> Result<CallToolResult>;
}
