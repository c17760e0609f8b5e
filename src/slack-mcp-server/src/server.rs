//! MCP server core: dispatch and stdio transport.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result};
use serde_json::{Value, json};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::{RwLock, oneshot};
use tracing::{debug, error, info, warn};

use slack_mcp_types::{
    CallToolParams, CallToolResult, CancelledNotification, Implementation, InitializeParams,
    InitializeResult, JsonRpcError, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, LogLevel,
    RequestId, ServerCapabilities, SetLogLevelParams, Tool, methods,
};

use crate::handlers::ToolHandler;

/// Server lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    /// No `initialize` seen yet.
    Uninitialized,
    /// `initialize` handled, waiting for the initialized notification.
    Initializing,
    /// Serving requests.
    Ready,
    /// Transport closed.
    Stopped,
}

/// The MCP server.
pub struct McpServer {
    pub(crate) info: Implementation,
    pub(crate) capabilities: ServerCapabilities,
    pub(crate) instructions: Option<String>,
    /// Registered tools, keyed by name. Populated before the transport
    /// starts; the lock exists for shared access, not for registration
    /// races.
    pub(crate) tools: RwLock<HashMap<String, Arc<dyn ToolHandler>>>,
    pub(crate) log_level: RwLock<LogLevel>,
    pub(crate) state: RwLock<ServerState>,
    pub(crate) running: AtomicBool,
    /// In-flight requests that can be cancelled by notification.
    pub(crate) pending_requests: RwLock<HashMap<String, oneshot::Sender<()>>>,
    pub(crate) client_info: RwLock<Option<Implementation>>,
}

impl McpServer {
    /// Server info.
    pub fn info(&self) -> &Implementation {
        &self.info
    }

    /// Current state.
    pub async fn state(&self) -> ServerState {
        *self.state.read().await
    }

    /// All registered tool descriptors.
    pub async fn tools(&self) -> Vec<Tool> {
        self.tools.read().await.values().map(|h| h.tool()).collect()
    }

    /// Dispatch one JSON-RPC request.
    pub async fn handle_request(&self, request: JsonRpcRequest) -> JsonRpcResponse {
        debug!(method = %request.method, id = %request.id, "handling request");

        let id = request.id.clone();
        let result = match request.method.as_str() {
            methods::INITIALIZE => self.handle_initialize(request.params).await,
            methods::PING => Ok(json!({})),
            methods::TOOLS_LIST => self.handle_list_tools().await,
            methods::TOOLS_CALL => self.handle_call_tool(request.id, request.params).await,
            methods::LOGGING_SET_LEVEL => self.handle_set_log_level(request.params).await,
            _ => Err(JsonRpcError::method_not_found(&request.method)),
        };

        match result {
            Ok(value) => JsonRpcResponse::success(id, value),
            Err(error) => JsonRpcResponse::error(id, error),
        }
    }

    /// Dispatch one JSON-RPC notification.
    pub async fn handle_notification(&self, notification: JsonRpcNotification) {
        debug!(method = %notification.method, "handling notification");

        match notification.method.as_str() {
            methods::INITIALIZED => {
                *self.state.write().await = ServerState::Ready;
                info!("server initialized and ready");
            }
            methods::CANCELLED => {
                if let Some(params) = notification.params
                    && let Ok(cancelled) = serde_json::from_value::<CancelledNotification>(params)
                {
                    self.handle_cancellation(cancelled).await;
                }
            }
            _ => {
                warn!(method = %notification.method, "unknown notification");
            }
        }
    }

    async fn handle_initialize(&self, params: Option<Value>) -> Result<Value, JsonRpcError> {
        // Check-and-transition under one write lock so concurrent
        // initialize requests cannot both pass the state check.
        {
            let mut state = self.state.write().await;
            if *state != ServerState::Uninitialized {
                return Err(JsonRpcError::invalid_request("Server already initialized"));
            }
            *state = ServerState::Initializing;
        }

        let init_params: InitializeParams = params
            .map(serde_json::from_value)
            .transpose()
            .map_err(|e| JsonRpcError::invalid_params(format!("Invalid params: {e}")))?
            .unwrap_or_default();

        info!(
            client = %init_params.client_info.name,
            version = %init_params.client_info.version,
            protocol = %init_params.protocol_version,
            "client connected"
        );
        *self.client_info.write().await = Some(init_params.client_info);

        let result = InitializeResult {
            protocol_version: slack_mcp_types::PROTOCOL_VERSION.to_string(),
            capabilities: self.capabilities.clone(),
            server_info: self.info.clone(),
            instructions: self.instructions.clone(),
        };
        serde_json::to_value(result).map_err(|e| JsonRpcError::internal_error(e.to_string()))
    }

    async fn handle_list_tools(&self) -> Result<Value, JsonRpcError> {
        let result = slack_mcp_types::ListToolsResult::new(self.tools().await);
        serde_json::to_value(result).map_err(|e| JsonRpcError::internal_error(e.to_string()))
    }

    async fn handle_call_tool(
        &self,
        id: RequestId,
        params: Option<Value>,
    ) -> Result<Value, JsonRpcError> {
        let call_params: CallToolParams = serde_json::from_value(
            params.ok_or_else(|| JsonRpcError::invalid_params("Missing params"))?,
        )
        .map_err(|e| JsonRpcError::invalid_params(format!("Invalid params: {e}")))?;

        debug!(tool = %call_params.name, "calling tool");

        let handler = {
            let handlers = self.tools.read().await;
            handlers.get(&call_params.name).cloned().ok_or_else(|| {
                JsonRpcError::invalid_params(format!("Unknown tool: {}", call_params.name))
            })?
        };

        let arguments = call_params.arguments.unwrap_or(json!({}));

        // Register a cancellation slot for the duration of the call.
        let (cancel_tx, cancel_rx) = oneshot::channel();
        let key = id.to_string();
        self.pending_requests
            .write()
            .await
            .insert(key.clone(), cancel_tx);

        let result = tokio::select! {
            result = handler.execute(arguments) => result,
            _ = cancel_rx => {
                debug!(tool = %call_params.name, "tool call cancelled");
                Ok(CallToolResult::error(format!(
                    "Tool call cancelled: {}",
                    call_params.name
                )))
            }
        };
        self.pending_requests.write().await.remove(&key);

        let call_result = match result {
            Ok(call_result) => call_result,
            Err(e) => {
                error!(tool = %call_params.name, error = %e, "tool handler failed");
                CallToolResult::error(format!("Error: internal_error - {e}"))
            }
        };
        serde_json::to_value(call_result).map_err(|e| JsonRpcError::internal_error(e.to_string()))
    }

    async fn handle_set_log_level(&self, params: Option<Value>) -> Result<Value, JsonRpcError> {
        let level_params: SetLogLevelParams = serde_json::from_value(
            params.ok_or_else(|| JsonRpcError::invalid_params("Missing params"))?,
        )
        .map_err(|e| JsonRpcError::invalid_params(format!("Invalid params: {e}")))?;

        *self.log_level.write().await = level_params.level;
        debug!(level = %level_params.level, "log level changed");
        Ok(json!({}))
    }

    async fn handle_cancellation(&self, cancelled: CancelledNotification) {
        let key = cancelled.request_id.to_string();
        if let Some(sender) = self.pending_requests.write().await.remove(&key) {
            let _ = sender.send(());
            debug!(request_id = %key, reason = ?cancelled.reason, "request cancelled");
        }
    }

    /// Run the server over stdio until EOF.
    ///
    /// Requests are dispatched onto their own tasks so slow tool calls do
    /// not block the read loop (and cancellation notifications can reach
    /// a call that is still running). A single writer task owns stdout;
    /// frames cross it whole, one per line, so concurrent completions can
    /// never interleave bytes.
    pub async fn run_stdio(self: Arc<Self>) -> Result<()> {
        info!(server = %self.info.name, version = %self.info.version, "starting stdio transport");
        self.running.store(true, Ordering::SeqCst);

        let (frame_tx, mut frame_rx) = tokio::sync::mpsc::unbounded_channel::<String>();
        let writer = tokio::spawn(async move {
            let mut stdout = tokio::io::stdout();
            while let Some(frame) = frame_rx.recv().await {
                if stdout.write_all(frame.as_bytes()).await.is_err()
                    || stdout.write_all(b"\n").await.is_err()
                    || stdout.flush().await.is_err()
                {
                    error!("failed to write response frame");
                    break;
                }
            }
        });

        let mut reader = BufReader::new(tokio::io::stdin());
        let mut line = String::new();

        while self.running.load(Ordering::SeqCst) {
            line.clear();
            match reader.read_line(&mut line).await {
                Ok(0) => {
                    debug!("EOF on stdin, shutting down");
                    break;
                }
                Ok(_) => {
                    let trimmed = line.trim();
                    if trimmed.is_empty() {
                        continue;
                    }

                    if let Ok(request) = serde_json::from_str::<JsonRpcRequest>(trimmed) {
                        let server = self.clone();
                        let frame_tx = frame_tx.clone();
                        tokio::spawn(async move {
                            let response = server.handle_request(request).await;
                            match serde_json::to_string(&response) {
                                Ok(frame) => {
                                    let _ = frame_tx.send(frame);
                                }
                                Err(e) => error!(error = %e, "failed to serialize response"),
                            }
                        });
                    } else if let Ok(notification) =
                        serde_json::from_str::<JsonRpcNotification>(trimmed)
                    {
                        self.handle_notification(notification).await;
                    } else {
                        warn!("invalid JSON-RPC frame on stdin");
                        let response = JsonRpcResponse::error(
                            RequestId::Number(0),
                            JsonRpcError::parse_error("Invalid JSON"),
                        );
                        let frame = serde_json::to_string(&response)
                            .context("failed to serialize parse-error response")?;
                        let _ = frame_tx.send(frame);
                    }
                }
                Err(e) => {
                    error!(error = %e, "error reading stdin");
                    break;
                }
            }
        }

        // Let in-flight responses drain before the writer exits.
        drop(frame_tx);
        let _ = writer.await;

        *self.state.write().await = ServerState::Stopped;
        self.running.store(false, Ordering::SeqCst);
        info!("stdio transport stopped");
        Ok(())
    }

    /// Stop the transport loop.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }
}
