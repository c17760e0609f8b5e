//! Protocol logging level types.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Log level a client may request via `logging/setLevel`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Debug level.
    Debug,
    /// Info level.
    Info,
    /// Notice level.
    Notice,
    /// Warning level.
    Warning,
    /// Error level.
    Error,
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Notice => "notice",
            Self::Warning => "warning",
            Self::Error => "error",
        };
        write!(f, "{s}")
    }
}

/// `logging/setLevel` parameters.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SetLogLevelParams {
    /// Requested level.
    pub level: LogLevel,
}
