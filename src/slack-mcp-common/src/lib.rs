//! Shared utilities for the slack-mcp workspace.
//!
//! This crate hosts the concerns every other crate leans on:
//! - `file_permissions` - owner-only file and directory creation
//! - `http_client` - centralized HTTP client factory
//! - `redact` - credential masking for logs and user-visible messages
//! - `errorlog` - append-only JSONL diagnostic log with rotation

pub mod errorlog;
pub mod file_permissions;
pub mod http_client;
pub mod redact;

pub use errorlog::{ErrorLog, ErrorLogEntry, LogLevel};
pub use redact::mask_secret;
