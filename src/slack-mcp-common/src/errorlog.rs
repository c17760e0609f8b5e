//! Append-only JSONL diagnostic log.
//!
//! Every failure path in the server funnels through here. The log is a
//! plain file of one JSON object per line; writes append, reads return
//! newest-first, and the file is rewritten to its most recent half once it
//! grows past a line cap. A logging failure is never propagated: losing
//! a diagnostic line must not take the process down with it.

use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::file_permissions::{create_private_dir_all, open_for_append};

/// Rotate once the file exceeds this many lines.
const MAX_LINES: usize = 1000;

/// Lines retained after rotation.
const KEEP_LINES: usize = 500;

/// Severity of a log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Unrecoverable failure of an operation.
    Error,
    /// Degraded but continuing.
    Warn,
}

/// One line of the diagnostic log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorLogEntry {
    /// ISO-8601 timestamp.
    pub ts: DateTime<Utc>,
    /// Entry severity.
    pub level: LogLevel,
    /// Subsystem that produced the entry.
    pub component: String,
    /// Stable error code.
    pub code: String,
    /// Human-readable message.
    pub message: String,
    /// Tool that was executing, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool: Option<String>,
    /// Free-form context.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<serde_json::Map<String, serde_json::Value>>,
    /// Attempt number for retried operations.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attempt: Option<u32>,
    /// Whether the failure was classified retryable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retryable: Option<bool>,
}

impl ErrorLogEntry {
    /// Create an error-level entry.
    pub fn error(
        component: impl Into<String>,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::new(LogLevel::Error, component, code, message)
    }

    /// Create a warn-level entry.
    pub fn warn(
        component: impl Into<String>,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::new(LogLevel::Warn, component, code, message)
    }

    fn new(
        level: LogLevel,
        component: impl Into<String>,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            ts: Utc::now(),
            level,
            component: component.into(),
            code: code.into(),
            message: message.into(),
            tool: None,
            context: None,
            attempt: None,
            retryable: None,
        }
    }

    /// Attach the tool name.
    pub fn with_tool(mut self, tool: impl Into<String>) -> Self {
        self.tool = Some(tool.into());
        self
    }

    /// Attach one context key.
    pub fn with_context(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.context
            .get_or_insert_with(serde_json::Map::new)
            .insert(key.into(), value);
        self
    }

    /// Attach the attempt number.
    pub fn with_attempt(mut self, attempt: u32) -> Self {
        self.attempt = Some(attempt);
        self
    }

    /// Attach the retryable classification.
    pub fn with_retryable(mut self, retryable: bool) -> Self {
        self.retryable = Some(retryable);
        self
    }
}

/// Handle on the diagnostic log file.
///
/// Cloneable; appends are serialized by the file append itself.
#[derive(Debug, Clone)]
pub struct ErrorLog {
    path: PathBuf,
}

impl ErrorLog {
    /// Open a log at an explicit path.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Resolve the log path from `SLACK_ERROR_LOG_PATH`, falling back to
    /// `<HOME>/.slack-mcp-server/error.log`.
    pub fn from_env() -> Self {
        let path = std::env::var("SLACK_ERROR_LOG_PATH")
            .ok()
            .filter(|p| !p.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(default_log_path);
        Self::new(path)
    }

    /// The log file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one entry. Failures are swallowed.
    pub fn log(&self, entry: ErrorLogEntry) {
        if let Err(e) = self.try_log(&entry) {
            tracing::debug!(error = %e, path = %self.path.display(), "error log write failed");
        }
    }

    fn try_log(&self, entry: &ErrorLogEntry) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            create_private_dir_all(parent)?;
        }
        let line = serde_json::to_string(entry)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        {
            let mut file = open_for_append(&self.path)?;
            file.write_all(line.as_bytes())?;
            file.write_all(b"\n")?;
        }
        self.rotate_if_needed()
    }

    /// Rewrite the file with its last `KEEP_LINES` lines once it exceeds
    /// `MAX_LINES`.
    fn rotate_if_needed(&self) -> std::io::Result<()> {
        let content = std::fs::read_to_string(&self.path)?;
        let lines: Vec<&str> = content.lines().collect();
        if lines.len() <= MAX_LINES {
            return Ok(());
        }
        let keep = &lines[lines.len() - KEEP_LINES..];
        let mut rewritten = keep.join("\n");
        rewritten.push('\n');
        std::fs::write(&self.path, rewritten)?;
        tracing::debug!(
            kept = KEEP_LINES,
            dropped = lines.len() - KEEP_LINES,
            "rotated error log"
        );
        Ok(())
    }

    /// Read entries newest-first, up to `limit`. Malformed lines are
    /// skipped. A missing file reads as empty.
    pub fn read(&self, limit: usize) -> Vec<ErrorLogEntry> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(_) => return Vec::new(),
        };
        content
            .lines()
            .rev()
            .filter_map(|line| serde_json::from_str::<ErrorLogEntry>(line).ok())
            .take(limit)
            .collect()
    }

    /// Remove entries strictly before `cutoff`; with no cutoff, remove
    /// everything. Returns the number of entries removed. Failures are
    /// swallowed and report zero removed.
    pub fn clear(&self, cutoff: Option<DateTime<Utc>>) -> usize {
        match self.try_clear(cutoff) {
            Ok(removed) => removed,
            Err(e) => {
                tracing::debug!(error = %e, "error log clear failed");
                0
            }
        }
    }

    fn try_clear(&self, cutoff: Option<DateTime<Utc>>) -> std::io::Result<usize> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e),
        };

        let Some(cutoff) = cutoff else {
            let removed = content.lines().count();
            std::fs::write(&self.path, "")?;
            return Ok(removed);
        };

        let mut kept = String::new();
        let mut removed = 0;
        for line in content.lines() {
            let drop = serde_json::from_str::<ErrorLogEntry>(line)
                .map(|entry| entry.ts < cutoff)
                .unwrap_or(true);
            if drop {
                removed += 1;
            } else {
                kept.push_str(line);
                kept.push('\n');
            }
        }
        std::fs::write(&self.path, kept)?;
        Ok(removed)
    }
}

fn default_log_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".slack-mcp-server")
        .join("error.log")
}
