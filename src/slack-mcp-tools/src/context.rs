//! The process-wide dependency graph.
//!
//! All singletons live here: the resolved auth, the client holder, both
//! name caches, the scheduler, and the error log. Built once at bootstrap
//! and shared via `Arc`; tests mint a fresh context per test instead of
//! resetting globals.

use std::path::PathBuf;
use std::sync::Arc;

use slack_mcp_api::{ChannelCache, SlackClientHolder, UserCache};
use slack_mcp_auth::{AuthConfig, RefreshConfig, RefreshScheduler};
use slack_mcp_common::ErrorLog;

/// Everything the tool handlers depend on.
pub struct AppContext {
    /// The resolved auth mode.
    pub auth: AuthConfig,
    /// Refresh settings from the environment.
    pub refresh_config: RefreshConfig,
    /// The current Slack client; resolved per call, never cached by
    /// handlers, so a refresh rebind is visible immediately.
    pub holder: Arc<SlackClientHolder>,
    /// Channel name → id cache.
    pub channels: ChannelCache,
    /// User id → display name cache.
    pub users: UserCache,
    /// The refresh scheduler; absent in bot mode or without a workspace.
    pub scheduler: Option<Arc<RefreshScheduler>>,
    /// The diagnostic log.
    pub errorlog: ErrorLog,
    /// Markdown memory directory.
    pub memory_dir: PathBuf,
}

impl AppContext {
    /// Build a context without a scheduler.
    pub fn new(
        auth: AuthConfig,
        refresh_config: RefreshConfig,
        holder: Arc<SlackClientHolder>,
        errorlog: ErrorLog,
        memory_dir: PathBuf,
    ) -> Self {
        let channels = ChannelCache::new(holder.clone(), errorlog.clone());
        let users = UserCache::new(holder.clone(), errorlog.clone());
        Self {
            auth,
            refresh_config,
            holder,
            channels,
            users,
            scheduler: None,
            errorlog,
            memory_dir,
        }
    }

    /// Attach the refresh scheduler.
    pub fn with_scheduler(mut self, scheduler: Arc<RefreshScheduler>) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    /// Search is user-auth-only.
    pub fn is_search_available(&self) -> bool {
        slack_mcp_auth::is_search_available(&self.auth)
    }

    /// Refresh needs user auth, a workspace, and the enable flag.
    pub fn is_refresh_available(&self) -> bool {
        slack_mcp_auth::is_refresh_available(&self.auth, &self.refresh_config)
    }
}
