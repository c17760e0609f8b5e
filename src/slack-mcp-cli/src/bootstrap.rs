//! Startup sequence.
//!
//! Resolve auth → bind the client → (user mode) reconcile the persisted
//! credentials with the environment → build the context → start the
//! scheduler when refresh is possible. Configuration problems in bot mode
//! never stop user-mode startup and vice versa; only "no auth at all" is
//! fatal.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use slack_mcp_api::{SlackAuth, SlackClientHolder};
use slack_mcp_auth::{
    AuthConfig, AuthResolver, CredentialStore, RefreshConfig, RefreshManager, RefreshSchedule,
    RefreshScheduler, is_refresh_available,
};
use slack_mcp_common::{ErrorLog, ErrorLogEntry};
use slack_mcp_tools::AppContext;

/// What bootstrap produced.
pub struct Bootstrap {
    /// The shared dependency graph.
    pub ctx: Arc<AppContext>,
    /// Cancelled on shutdown; stops retry sleeps mid-backoff.
    pub shutdown: CancellationToken,
}

/// Run the full startup sequence.
pub fn build_context() -> Result<Bootstrap> {
    let resolver = AuthResolver::new();
    let auth = resolver.resolve().context("resolving Slack authentication")?;
    let refresh_config = RefreshConfig::from_env();
    let errorlog = ErrorLog::from_env();
    let shutdown = CancellationToken::new();

    let holder = Arc::new(SlackClientHolder::new());
    let store = CredentialStore::new(refresh_config.credentials_path.clone());

    match &auth {
        AuthConfig::Bot { .. } => {
            info!("bot authentication resolved");
            holder.bind(auth.to_slack_auth());
        }
        AuthConfig::User { .. } => {
            info!("user authentication resolved");
            bind_user_credentials(&auth, &store, &refresh_config, &holder, &errorlog);
        }
    }

    let mut ctx = AppContext::new(
        auth,
        refresh_config,
        holder,
        errorlog,
        memory_dir_from_env(),
    );

    if is_refresh_available(&ctx.auth, &ctx.refresh_config) {
        let manager = RefreshManager::new(
            store,
            ctx.holder.clone(),
            &ctx.refresh_config,
            ctx.errorlog.clone(),
            shutdown.child_token(),
        )
        .context("building refresh manager")?;
        let schedule = RefreshSchedule::new(ctx.refresh_config.interval_days, true);
        let scheduler = Arc::new(RefreshScheduler::new(Arc::new(manager), schedule));
        scheduler.start();
        ctx = ctx.with_scheduler(scheduler);
    } else {
        info!("credential refresh not available in this configuration");
    }

    Ok(Bootstrap {
        ctx: Arc::new(ctx),
        shutdown,
    })
}

/// Bind the freshest user credentials we have.
///
/// Persisted credentials win over the environment - they are the product
/// of previous refreshes. A load failure degrades to the environment pair
/// (and is logged); a missing file gets seeded from the environment when a
/// workspace is configured.
fn bind_user_credentials(
    auth: &AuthConfig,
    store: &CredentialStore,
    refresh_config: &RefreshConfig,
    holder: &SlackClientHolder,
    errorlog: &ErrorLog,
) {
    if store.exists() {
        match store.load() {
            Ok(stored) => {
                info!(
                    refresh_count = stored.metadata.refresh_count,
                    "using persisted credentials"
                );
                holder.bind(SlackAuth::user(
                    stored.credentials.token,
                    stored.credentials.cookie,
                ));
                return;
            }
            Err(e) => {
                warn!(error = %e, "persisted credentials unreadable, using environment");
                errorlog.log(ErrorLogEntry::warn("bootstrap", e.code(), e.to_string()));
            }
        }
    } else if let Some(workspace) = &refresh_config.workspace {
        let token = auth.token();
        let cookie = auth.cookie().unwrap_or_default();
        match store.create_initial(token, cookie, workspace) {
            Ok(_) => info!(path = %store.path().display(), "seeded credentials from environment"),
            Err(e) => {
                warn!(error = %e, "could not seed credentials file");
                errorlog.log(ErrorLogEntry::warn("bootstrap", e.code(), e.to_string()));
            }
        }
    }

    holder.bind(auth.to_slack_auth());
}

fn memory_dir_from_env() -> PathBuf {
    std::env::var("SLACK_MEMORY_DIR")
        .ok()
        .filter(|dir| !dir.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".slack-mcp-server")
                .join("memory")
        })
}
