//! Server builder.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use tokio::sync::RwLock;
use tracing::debug;

use slack_mcp_types::{Implementation, LogLevel, ServerCapabilities};

use crate::handlers::ToolHandler;
use crate::server::{McpServer, ServerState};

/// Builder for [`McpServer`].
///
/// Tools are registered into the map before the server is handed out, so
/// `tools/list` can never observe a partially-registered catalog.
pub struct McpServerBuilder {
    name: String,
    version: String,
    instructions: Option<String>,
    tools: Vec<Arc<dyn ToolHandler>>,
}

impl McpServerBuilder {
    /// Create a new builder.
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            instructions: None,
            tools: Vec::new(),
        }
    }

    /// Set client-facing instructions.
    pub fn instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = Some(instructions.into());
        self
    }

    /// Add a tool handler.
    pub fn tool_handler(mut self, handler: Arc<dyn ToolHandler>) -> Self {
        self.tools.push(handler);
        self
    }

    /// Add several tool handlers.
    pub fn tool_handlers(
        mut self,
        handlers: impl IntoIterator<Item = Arc<dyn ToolHandler>>,
    ) -> Self {
        self.tools.extend(handlers);
        self
    }

    /// Build the server.
    pub fn build(self) -> Arc<McpServer> {
        let mut tools = HashMap::new();
        for handler in self.tools {
            let name = handler.tool().name;
            debug!(tool = %name, "registered tool");
            tools.insert(name, handler);
        }

        Arc::new(McpServer {
            info: Implementation::new(self.name, self.version),
            capabilities: ServerCapabilities::tools_and_logging(),
            instructions: self.instructions,
            tools: RwLock::new(tools),
            log_level: RwLock::new(LogLevel::Info),
            state: RwLock::new(ServerState::Uninitialized),
            running: AtomicBool::new(false),
            pending_requests: RwLock::new(HashMap::new()),
            client_info: RwLock::new(None),
        })
    }
}
