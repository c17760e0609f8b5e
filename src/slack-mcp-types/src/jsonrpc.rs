//! JSON-RPC 2.0 framing.
//!
//! One line on the wire is one frame: a request (has `id`), a
//! notification (no `id`), or a response. The `jsonrpc` field is pinned
//! to "2.0" on everything we emit.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The only protocol version that exists.
pub const JSONRPC_VERSION: &str = "2.0";

fn version_field() -> String {
    JSONRPC_VERSION.to_string()
}

/// Request identifier. Clients choose numbers or strings; we echo back
/// whatever arrived.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum RequestId {
    /// Numeric id.
    Number(i64),
    /// String id.
    String(String),
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Number(n) => n.fmt(f),
            Self::String(s) => s.fmt(f),
        }
    }
}

impl From<i64> for RequestId {
    fn from(id: i64) -> Self {
        Self::Number(id)
    }
}

impl From<i32> for RequestId {
    fn from(id: i32) -> Self {
        Self::Number(id.into())
    }
}

impl From<&str> for RequestId {
    fn from(id: &str) -> Self {
        Self::String(id.to_owned())
    }
}

/// An incoming (or outgoing) method call.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct JsonRpcRequest {
    /// Pinned protocol version.
    pub jsonrpc: String,
    /// Echoed in the response.
    pub id: RequestId,
    /// Method to invoke.
    pub method: String,
    /// Method parameters, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcRequest {
    /// Build a request without parameters.
    pub fn new(id: impl Into<RequestId>, method: impl Into<String>) -> Self {
        Self {
            jsonrpc: version_field(),
            id: id.into(),
            method: method.into(),
            params: None,
        }
    }

    /// Attach parameters.
    pub fn with_params(mut self, params: Value) -> Self {
        self.params = Some(params);
        self
    }
}

/// A fire-and-forget method call; no response will ever be sent.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct JsonRpcNotification {
    /// Pinned protocol version.
    pub jsonrpc: String,
    /// Method to invoke.
    pub method: String,
    /// Method parameters, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcNotification {
    /// Build a notification without parameters.
    pub fn new(method: impl Into<String>) -> Self {
        Self {
            jsonrpc: version_field(),
            method: method.into(),
            params: None,
        }
    }

    /// Attach parameters.
    pub fn with_params(mut self, params: Value) -> Self {
        self.params = Some(params);
        self
    }
}

/// The answer to one request. Exactly one of `result` and `error` is
/// present.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct JsonRpcResponse {
    /// Pinned protocol version.
    pub jsonrpc: String,
    /// Which request this answers.
    pub id: RequestId,
    /// Present on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Present on failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    /// Answer a request with a result.
    pub fn success(id: impl Into<RequestId>, result: Value) -> Self {
        Self {
            jsonrpc: version_field(),
            id: id.into(),
            result: Some(result),
            error: None,
        }
    }

    /// Answer a request with an error.
    pub fn error(id: impl Into<RequestId>, error: JsonRpcError) -> Self {
        Self {
            jsonrpc: version_field(),
            id: id.into(),
            result: None,
            error: Some(error),
        }
    }

    /// True when `error` is absent.
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// A protocol-level failure.
///
/// Tool-level failures never use this shape - they ride inside a
/// successful response as a result with `isError` set.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct JsonRpcError {
    /// One of the [`ErrorCode`] values.
    pub code: i32,
    /// What went wrong.
    pub message: String,
    /// Optional machine-readable detail.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcError {
    /// An error with an explicit code.
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    /// The line was not valid JSON.
    pub fn parse_error(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::PARSE_ERROR, message)
    }

    /// The frame was JSON but not a valid request.
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::INVALID_REQUEST, message)
    }

    /// No such method.
    pub fn method_not_found(method: &str) -> Self {
        Self::new(
            ErrorCode::METHOD_NOT_FOUND,
            format!("Method not found: {method}"),
        )
    }

    /// The parameters did not match the method.
    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::INVALID_PARAMS, message)
    }

    /// Something broke on our side.
    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::INTERNAL_ERROR, message)
    }
}

impl std::fmt::Display for JsonRpcError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for JsonRpcError {}

/// The standard JSON-RPC 2.0 error codes.
pub struct ErrorCode;

impl ErrorCode {
    /// Invalid JSON received.
    pub const PARSE_ERROR: i32 = -32700;
    /// Not a valid request object.
    pub const INVALID_REQUEST: i32 = -32600;
    /// Unknown method.
    pub const METHOD_NOT_FOUND: i32 = -32601;
    /// Parameters don't match the method.
    pub const INVALID_PARAMS: i32 = -32602;
    /// Internal failure.
    pub const INTERNAL_ERROR: i32 = -32603;
}
