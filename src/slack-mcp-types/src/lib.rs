//! Model Context Protocol type definitions for slack-mcp.
//!
//! JSON-RPC 2.0 framing, tool descriptors with annotation hints, and the
//! initialization/capability handshake. Every type serializes with serde;
//! schemars derives keep the shapes machine-describable.

mod capabilities;
mod content;
mod initialization;
mod jsonrpc;
mod logging;
mod notifications;
mod tools;

/// MCP method name constants.
pub mod methods;

/// Protocol version this server speaks.
pub const PROTOCOL_VERSION: &str = "2024-11-05";

pub use capabilities::{ClientCapabilities, LoggingCapability, ServerCapabilities, ToolsCapability};
pub use content::Content;
pub use initialization::{Implementation, InitializeParams, InitializeResult};
pub use jsonrpc::{
    ErrorCode, JSONRPC_VERSION, JsonRpcError, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse,
    RequestId,
};
pub use logging::{LogLevel, SetLogLevelParams};
pub use notifications::CancelledNotification;
pub use tools::{
    CallToolParams, CallToolResult, ListToolsResult, PropertySchema, Tool, ToolAnnotations,
    ToolInputSchema,
};
