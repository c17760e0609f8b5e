//! Markdown memory tools over a flat local directory.
//!
//! Memories are plain `.md` files under the configured directory. Names
//! are restricted to a safe character set; there is no nesting and no way
//! to address anything outside the directory.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{Value, json};

use slack_mcp_server::ToolHandler;
use slack_mcp_types::{CallToolResult, PropertySchema, Tool, ToolAnnotations, ToolInputSchema};

use crate::context::AppContext;
use crate::respond;

/// Cap on search hits across all files.
const MAX_SEARCH_HITS: usize = 100;

/// A memory name is a bare file stem: letters, digits, dash, underscore.
fn valid_memory_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= 100
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

fn memory_path(ctx: &AppContext, name: &str) -> PathBuf {
    ctx.memory_dir.join(format!("{name}.md"))
}

/// `memory_list` - all stored memories, newest first.
pub struct MemoryListTool {
    ctx: Arc<AppContext>,
}

impl MemoryListTool {
    /// Wire the tool to a context.
    pub fn new(ctx: Arc<AppContext>) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl ToolHandler for MemoryListTool {
    fn tool(&self) -> Tool {
        Tool::new("memory_list", "List stored Markdown memories")
            .with_schema(ToolInputSchema::object())
            .with_annotations(ToolAnnotations::read_only())
    }

    async fn execute(&self, _arguments: Value) -> Result<CallToolResult> {
        let mut memories: Vec<(DateTime<Utc>, Value)> = Vec::new();
        if let Ok(entries) = std::fs::read_dir(&self.ctx.memory_dir) {
            for entry in entries.flatten() {
                let path = entry.path();
                if path.extension().and_then(|e| e.to_str()) != Some("md") {
                    continue;
                }
                let Some(name) = path.file_stem().and_then(|s| s.to_str()) else {
                    continue;
                };
                let Ok(metadata) = entry.metadata() else {
                    continue;
                };
                let modified: DateTime<Utc> = metadata
                    .modified()
                    .map(DateTime::from)
                    .unwrap_or_else(|_| Utc::now());
                memories.push((
                    modified,
                    json!({
                        "name": name,
                        "size": metadata.len(),
                        "modified": modified.to_rfc3339(),
                    }),
                ));
            }
        }
        memories.sort_by(|a, b| b.0.cmp(&a.0));

        let memories: Vec<Value> = memories.into_iter().map(|(_, v)| v).collect();
        Ok(respond::success(json!({
            "memories": memories,
            "count": memories.len(),
        })))
    }
}

/// `memory_read` - one memory's content.
pub struct MemoryReadTool {
    ctx: Arc<AppContext>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct MemoryNameArgs {
    name: String,
}

impl MemoryReadTool {
    /// Wire the tool to a context.
    pub fn new(ctx: Arc<AppContext>) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl ToolHandler for MemoryReadTool {
    fn tool(&self) -> Tool {
        Tool::new("memory_read", "Read one stored memory")
            .with_schema(
                ToolInputSchema::object()
                    .property(
                        "name",
                        PropertySchema::string().description("Memory name (no extension)"),
                    )
                    .required(vec!["name"]),
            )
            .with_annotations(ToolAnnotations::read_only())
    }

    async fn execute(&self, arguments: Value) -> Result<CallToolResult> {
        const TOOL: &str = "memory_read";
        let args: MemoryNameArgs = match respond::parse_args(arguments) {
            Ok(args) => args,
            Err(e) => return Ok(respond::invalid_params(&self.ctx, TOOL, &e)),
        };
        if !valid_memory_name(&args.name) {
            return Ok(respond::invalid_params(
                &self.ctx,
                TOOL,
                "name must be letters, digits, '-' or '_'",
            ));
        }

        match std::fs::read_to_string(memory_path(&self.ctx, &args.name)) {
            Ok(content) => Ok(respond::success(json!({
                "name": args.name,
                "content": content,
            }))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(respond::fail(
                &self.ctx,
                TOOL,
                "memory_not_found",
                &format!("No memory named '{}'", args.name),
                None,
                false,
            )),
            Err(e) => Ok(respond::fail(
                &self.ctx,
                TOOL,
                "memory_io_error",
                &e.to_string(),
                None,
                false,
            )),
        }
    }
}

/// `memory_write` - create or overwrite a memory.
pub struct MemoryWriteTool {
    ctx: Arc<AppContext>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct MemoryWriteArgs {
    name: String,
    content: String,
}

impl MemoryWriteTool {
    /// Wire the tool to a context.
    pub fn new(ctx: Arc<AppContext>) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl ToolHandler for MemoryWriteTool {
    fn tool(&self) -> Tool {
        // No annotation hints on the write tool.
        Tool::new("memory_write", "Create or overwrite a Markdown memory").with_schema(
            ToolInputSchema::object()
                .property(
                    "name",
                    PropertySchema::string().description("Memory name (no extension)"),
                )
                .property("content", PropertySchema::string().description("Markdown body"))
                .required(vec!["name", "content"]),
        )
    }

    async fn execute(&self, arguments: Value) -> Result<CallToolResult> {
        const TOOL: &str = "memory_write";
        let args: MemoryWriteArgs = match respond::parse_args(arguments) {
            Ok(args) => args,
            Err(e) => return Ok(respond::invalid_params(&self.ctx, TOOL, &e)),
        };
        if !valid_memory_name(&args.name) {
            return Ok(respond::invalid_params(
                &self.ctx,
                TOOL,
                "name must be letters, digits, '-' or '_'",
            ));
        }

        let write = (|| -> std::io::Result<()> {
            std::fs::create_dir_all(&self.ctx.memory_dir)?;
            std::fs::write(memory_path(&self.ctx, &args.name), &args.content)
        })();

        match write {
            Ok(()) => Ok(respond::success(json!({
                "name": args.name,
                "bytesWritten": args.content.len(),
            }))),
            Err(e) => Ok(respond::fail(
                &self.ctx,
                TOOL,
                "memory_io_error",
                &e.to_string(),
                None,
                false,
            )),
        }
    }
}

/// `memory_search` - case-insensitive substring search over all memories.
pub struct MemorySearchTool {
    ctx: Arc<AppContext>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct MemorySearchArgs {
    query: String,
}

impl MemorySearchTool {
    /// Wire the tool to a context.
    pub fn new(ctx: Arc<AppContext>) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl ToolHandler for MemorySearchTool {
    fn tool(&self) -> Tool {
        Tool::new("memory_search", "Search stored memories by substring")
            .with_schema(
                ToolInputSchema::object()
                    .property("query", PropertySchema::string().description("Search text"))
                    .required(vec!["query"]),
            )
            .with_annotations(ToolAnnotations::read_only())
    }

    async fn execute(&self, arguments: Value) -> Result<CallToolResult> {
        const TOOL: &str = "memory_search";
        let args: MemorySearchArgs = match respond::parse_args(arguments) {
            Ok(args) => args,
            Err(e) => return Ok(respond::invalid_params(&self.ctx, TOOL, &e)),
        };
        if args.query.trim().is_empty() {
            return Ok(respond::invalid_params(&self.ctx, TOOL, "query must be non-empty"));
        }
        let needle = args.query.to_lowercase();

        let mut matches = Vec::new();
        if let Ok(entries) = std::fs::read_dir(&self.ctx.memory_dir) {
            'files: for entry in entries.flatten() {
                let path = entry.path();
                if path.extension().and_then(|e| e.to_str()) != Some("md") {
                    continue;
                }
                let Some(name) = path.file_stem().and_then(|s| s.to_str()).map(str::to_string)
                else {
                    continue;
                };
                let Ok(content) = std::fs::read_to_string(&path) else {
                    continue;
                };
                for (line_number, line) in content.lines().enumerate() {
                    if line.to_lowercase().contains(&needle) {
                        matches.push(json!({
                            "name": name,
                            "line": line_number + 1,
                            "snippet": line.trim(),
                        }));
                        if matches.len() >= MAX_SEARCH_HITS {
                            break 'files;
                        }
                    }
                }
            }
        }

        Ok(respond::success(json!({
            "query": args.query,
            "matches": matches,
            "count": matches.len(),
        })))
    }
}
