//! slack-mcp-server - read-only Slack bridge over MCP stdio.
//!
//! Standard output belongs to the protocol. All diagnostics - the startup
//! banner, refresh events, everything - go to standard error and the JSONL
//! error log. A single stray println here would corrupt the frame stream.

use anyhow::Result;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use slack_mcp_cli::build_context;
use slack_mcp_server::McpServerBuilder;
use slack_mcp_tools::all_tools;

#[derive(Parser)]
#[command(
    name = "slack-mcp-server",
    version,
    about = "Read-only Slack bridge over the Model Context Protocol"
)]
struct Cli {
    /// Log filter (overrides RUST_LOG), e.g. "info" or "slack_mcp_auth=debug".
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_level.as_deref());

    let bootstrap = build_context()?;
    info!(
        version = env!("CARGO_PKG_VERSION"),
        search_available = bootstrap.ctx.is_search_available(),
        refresh_available = bootstrap.ctx.is_refresh_available(),
        "slack-mcp-server starting"
    );

    let server = McpServerBuilder::new("slack-mcp-server", env!("CARGO_PKG_VERSION"))
        .instructions(
            "Read-only Slack access. Channel references accept ids (C…) or names (#general).",
        )
        .tool_handlers(all_tools(bootstrap.ctx.clone()))
        .build();

    let result = server.run_stdio().await;

    // Transport closed: stop background work so retry sleeps end promptly.
    bootstrap.shutdown.cancel();
    if let Some(scheduler) = &bootstrap.ctx.scheduler {
        scheduler.stop();
    }
    result
}

/// All tracing output is pinned to stderr; stdout carries protocol frames
/// exclusively.
fn init_tracing(log_level: Option<&str>) {
    let filter = match log_level {
        Some(level) => EnvFilter::new(level),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();
}
